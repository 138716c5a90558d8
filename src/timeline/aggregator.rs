use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::Result;
use chrono::{Duration, Local};
use futures::{stream, StreamExt};
use tracing::{debug, info, instrument};

use crate::{
    anonymize::AnonymizationPipeline,
    config::Config,
    daemon::storage::{entities::ActivityRecord, record_storage::ActivityStore},
    utils::clock::Clock,
};

use super::{format::format_timeline, Timeline, TimelineEntry, TimelineRange};

/// Answers timeline queries. Holds the anonymization pipeline, so every title is sent to the
/// model at most once for as long as the aggregator lives.
pub struct TimelineAggregator<S: ActivityStore> {
    store: S,
    pipeline: AnonymizationPipeline,
    retention: Duration,
    /// How recent the last record has to be for its entry to count as ongoing.
    ongoing_grace: Duration,
    max_concurrency: usize,
    time_provider: Box<dyn Clock>,
}

impl<S: ActivityStore> TimelineAggregator<S> {
    pub fn new(
        store: S,
        pipeline: AnonymizationPipeline,
        retention: Duration,
        ongoing_grace: Duration,
        max_concurrency: usize,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            store,
            pipeline,
            retention,
            ongoing_grace,
            max_concurrency: max_concurrency.max(1),
            time_provider,
        }
    }

    pub fn from_config(store: S, config: &Config, time_provider: Box<dyn Clock>) -> Result<Self> {
        let pipeline = AnonymizationPipeline::from_config(config)?;
        let ongoing_grace = Duration::from_std(config.capture.log_interval() * 2)?;
        Ok(Self::new(
            store,
            pipeline,
            config.storage.retention(),
            ongoing_grace,
            config.llm.max_concurrency,
            time_provider,
        ))
    }

    /// Reads the range and merges consecutive records with the same anonymized title. The
    /// start is clamped to the retention horizon, an open end means now.
    #[instrument(skip(self))]
    pub async fn aggregate(&self, range: TimelineRange) -> Result<Timeline> {
        let now = self.time_provider.time();
        let since = range.since.max(now - self.retention);
        let until = range.until.unwrap_or(now);

        let records = self.store.query(since, until).await?;
        let titles = self.anonymize_titles(&records).await;
        let mut entries = merge_records(&records, &titles);

        if range.until.is_none() {
            if let Some(last) = entries.last_mut() {
                if now - last.end <= self.ongoing_grace {
                    last.ongoing = true;
                    last.end = now;
                }
            }
        }

        info!(
            "Built timeline of {} entries from {} records",
            entries.len(),
            records.len()
        );
        Ok(Timeline {
            since,
            until,
            entries,
        })
    }

    /// The query tool: a formatted timeline in local time.
    pub async fn get_activity_timeline(&self, range: TimelineRange) -> Result<String> {
        let timeline = self.aggregate(range).await?;
        Ok(format_timeline(&timeline, &Local))
    }

    /// Anonymizes every distinct non-AFK title, at most `max_concurrency` at a time.
    async fn anonymize_titles(&self, records: &[ActivityRecord]) -> HashMap<Arc<str>, Arc<str>> {
        let mut seen = HashSet::new();
        let unique: Vec<Arc<str>> = records
            .iter()
            .filter(|record| !record.afk)
            .map(|record| &record.title)
            .filter(|title| seen.insert(Arc::clone(title)))
            .cloned()
            .collect();
        debug!("Anonymizing {} unique titles", unique.len());

        stream::iter(unique)
            .map(|title| async move {
                let anonymized = self.pipeline.anonymize(&title).await;
                (title, anonymized)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await
    }
}

struct OpenEntry {
    entry: TimelineEntry,
    apm_sum: u64,
    records: u64,
}

impl OpenEntry {
    fn new(record: &ActivityRecord, title: Arc<str>, afk: bool) -> Self {
        Self {
            entry: TimelineEntry {
                start: record.timestamp,
                end: record.timestamp,
                title,
                avg_apm: 0,
                afk,
                ongoing: false,
            },
            apm_sum: record.apm as u64,
            records: 1,
        }
    }

    fn extend(&mut self, record: &ActivityRecord) {
        self.entry.end = record.timestamp;
        self.apm_sum += record.apm as u64;
        self.records += 1;
    }

    fn finish(mut self) -> TimelineEntry {
        self.entry.avg_apm = (self.apm_sum / self.records) as u32;
        self.entry
    }
}

/// Walks `records` in order and merges runs with equal anonymized titles. Away records only
/// merge with away records. Titles missing from `titles` are used as stored.
pub fn merge_records(
    records: &[ActivityRecord],
    titles: &HashMap<Arc<str>, Arc<str>>,
) -> Vec<TimelineEntry> {
    let mut entries = Vec::new();
    let mut open: Option<OpenEntry> = None;

    for record in records {
        let afk = record.afk;
        let title = match titles.get(&record.title) {
            Some(anonymized) if !afk => anonymized.clone(),
            _ => record.title.clone(),
        };

        match open.as_mut() {
            Some(current) if current.entry.afk == afk && current.entry.title == title => {
                current.extend(record)
            }
            _ => {
                if let Some(done) = open.take() {
                    entries.push(done.finish());
                }
                open = Some(OpenEntry::new(record, title, afk));
            }
        }
    }

    if let Some(done) = open {
        entries.push(done.finish());
    }
    entries
}
