//! Turns stored records into a readable timeline.
//!
//! [aggregator::TimelineAggregator] reads a range from the store, anonymizes every distinct
//! title once and merges consecutive records with the same anonymized title into a
//! [TimelineEntry]. [format] renders the result.

pub mod aggregator;
pub mod format;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

/// Requested range. An open end means "up to now", which also lets the last entry be reported
/// as ongoing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineRange {
    pub since: DateTime<Utc>,
    pub until: Option<DateTime<Utc>>,
}

impl TimelineRange {
    pub fn new(since: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Self {
        Self { since, until }
    }

    /// The last `duration` up to now.
    pub fn last(duration: Duration, now: DateTime<Utc>) -> Self {
        Self {
            since: now - duration,
            until: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub start: DateTime<Utc>,
    /// Timestamp of the last merged record, or the query time for an ongoing entry.
    pub end: DateTime<Utc>,
    pub title: Arc<str>,
    /// Integer mean of the merged records' APM.
    pub avg_apm: u32,
    pub afk: bool,
    pub ongoing: bool,
}

impl TimelineEntry {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    /// Range after clamping to the retention horizon.
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub entries: Vec<TimelineEntry>,
}
