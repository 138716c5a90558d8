use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::{
    daemon::storage::{entities::ActivityRecord, record_storage::ActivityStore},
    utils::clock::Clock,
};

use super::module::EventProcessor;

/// Represents saving module. Saving module main goal is to bridge
/// [ProcessingModule](super::ProcessingModule) and [ActivityStore].
/// It also owns retention: the store is pruned on the first record and then every
/// `prune_interval`.
pub struct LocalSaver<S: ActivityStore> {
    store: S,
    retention: Duration,
    prune_interval: Duration,
    last_prune: Option<DateTime<Utc>>,
    date_provider: Box<dyn Clock>,
}

impl<S: ActivityStore> LocalSaver<S> {
    pub fn new(
        store: S,
        retention: Duration,
        prune_interval: Duration,
        date_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            store,
            retention,
            prune_interval,
            last_prune: None,
            date_provider,
        }
    }

    async fn prune_if_due(&mut self) -> Result<()> {
        let now = self.date_provider.time();
        let due = self
            .last_prune
            .map_or(true, |last| now - last >= self.prune_interval);
        if !due {
            return Ok(());
        }

        // A failed prune is retried with the next record.
        let removed = self.store.prune(now - self.retention).await?;
        self.last_prune = Some(now);
        debug!("Retention pass removed {removed} records");
        Ok(())
    }
}

impl<S: ActivityStore> EventProcessor for LocalSaver<S> {
    async fn process_next(&mut self, message: ActivityRecord) -> anyhow::Result<()> {
        self.store.append(message).await?;
        self.prune_if_due().await
    }

    async fn finalize(&mut self) -> Result<()> {
        info!("Record saving finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
    use tempfile::tempdir;

    use super::*;
    use crate::{
        daemon::storage::record_storage::ActivityStoreImpl, utils::clock::tests::TestClock,
    };

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn start() -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    #[tokio::test(start_paused = true)]
    async fn prunes_on_first_record_and_then_every_interval() -> Result<()> {
        let dir = tempdir()?;
        let store = std::sync::Arc::new(ActivityStoreImpl::new(dir.path().to_owned())?);
        store
            .append(ActivityRecord::new(start() - Duration::hours(25), "expired", 0))
            .await?;
        store
            .append(ActivityRecord::new(start() - Duration::hours(1), "recent", 0))
            .await?;

        let mut saver = LocalSaver::new(
            store.clone(),
            Duration::hours(24),
            Duration::minutes(60),
            Box::new(TestClock::new(start())),
        );

        saver.process_next(ActivityRecord::new(start(), "now", 0)).await?;
        let everything = || store.query(start() - Duration::days(3), start() + Duration::days(1));
        let titles = |records: Vec<ActivityRecord>| {
            records.into_iter().map(|r| r.title.to_string()).collect::<Vec<_>>()
        };
        assert_eq!(titles(everything().await?), vec!["recent", "now"]);

        store
            .append(ActivityRecord::new(start() - Duration::minutes(23 * 60 + 30), "aging", 0))
            .await?;

        // Not due yet.
        tokio::time::advance(std::time::Duration::from_secs(30 * 60)).await;
        saver.process_next(ActivityRecord::new(start() + Duration::minutes(30), "a", 0)).await?;
        assert_eq!(titles(everything().await?), vec!["aging", "recent", "now", "a"]);

        tokio::time::advance(std::time::Duration::from_secs(31 * 60)).await;
        saver.process_next(ActivityRecord::new(start() + Duration::minutes(61), "b", 0)).await?;
        assert_eq!(titles(everything().await?), vec!["recent", "now", "a", "b"]);
        Ok(())
    }
}
