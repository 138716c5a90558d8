use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    anonymize::redactor::KeywordRedactor, daemon::storage::entities::ActivityRecord,
    utils::clock::Clock, window_api::pooled::PooledWindowManager,
};

use super::{
    afk::{AfkEvaluator, AFK_LOCKED_TITLE, AFK_TITLE},
    apm::ApmTracker,
    sanitizer::{TitleSanitizer, UNKNOWN_TITLE},
};

/// Samples the focused window every interval and hands an [ActivityRecord] to the processing
/// module.
pub struct ActivityLogger {
    next: mpsc::Sender<ActivityRecord>,
    producer: PooledWindowManager,
    sanitizer: TitleSanitizer,
    redactor: Arc<KeywordRedactor>,
    tracker: ApmTracker,
    shutdown: CancellationToken,
    afk_evaluator: AfkEvaluator,
    log_interval: Duration,
    time_provider: Box<dyn Clock>,
}

impl ActivityLogger {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        next: mpsc::Sender<ActivityRecord>,
        producer: PooledWindowManager,
        sanitizer: TitleSanitizer,
        redactor: Arc<KeywordRedactor>,
        tracker: ApmTracker,
        shutdown: CancellationToken,
        afk_evaluator: AfkEvaluator,
        log_interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            producer,
            sanitizer,
            redactor,
            tracker,
            shutdown,
            afk_evaluator,
            log_interval,
            time_provider,
        }
    }

    /// Never fails. Provider errors turn into sentinel values.
    async fn collect_record(&self) -> ActivityRecord {
        let timestamp = self.time_provider.time();

        let locked = match self.producer.is_screen_locked().await {
            Ok(locked) => locked,
            Err(e) => {
                debug!("Couldn't read the screen lock state {e:?}");
                false
            }
        };
        if locked {
            return ActivityRecord::afk(timestamp, AFK_LOCKED_TITLE);
        }

        let raw_title = match self.producer.get_active_window_title().await {
            Ok(title) => title,
            Err(e) => {
                warn!("Couldn't read the active window title {e:?}");
                UNKNOWN_TITLE.to_string()
            }
        };

        let afk = match self.producer.get_idle_time().await {
            Ok(idle_ms) => self.afk_evaluator.is_afk(idle_ms),
            Err(e) => {
                debug!("Couldn't read idle time {e:?}");
                false
            }
        };

        if afk {
            return ActivityRecord::afk(timestamp, AFK_TITLE);
        }

        let title = self.redactor.redact(&self.sanitizer.sanitize(&raw_title));
        let apm = self.tracker.current_apm(timestamp);
        ActivityRecord::new(timestamp, title, apm)
    }

    /// Executes the collector event loop.
    pub async fn run(self) -> Result<()> {
        info!("Activity logger started");
        let mut collection_point = self.time_provider.instant();
        loop {
            collection_point += self.log_interval;

            let record = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Activity logger stopped");
                    return Ok(())
                }
                record = self.collect_record() => record,
            };
            let span = info_span!("Processing collected data");
            debug!("Sending record {:?}", record);
            self.next
                .send(record)
                .instrument(span)
                .await
                .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;

            tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // the sender channel and consequently stop processing module.
                _ = self.shutdown.cancelled() => {
                    info!("Activity logger stopped");
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(collection_point) => ()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use super::*;
    use crate::{
        config::{test_config, DEFAULT_PLACEHOLDER},
        utils::clock::tests::TestClock,
        window_api::{pooled::PooledWindowManager, MockWindowManager},
    };

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn start() -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    fn logger(
        manager: MockWindowManager,
        sender: mpsc::Sender<ActivityRecord>,
        tracker: ApmTracker,
        shutdown: &CancellationToken,
    ) -> ActivityLogger {
        let config = test_config(&["alice"]);
        let redactor = KeywordRedactor::new(config.forbidden_keywords(), DEFAULT_PLACEHOLDER).unwrap();
        ActivityLogger::new(
            sender,
            PooledWindowManager::new(manager, Duration::from_secs(1)),
            TitleSanitizer::new(&config.titles),
            Arc::new(redactor),
            tracker,
            shutdown.clone(),
            AfkEvaluator::from_seconds(120),
            Duration::from_secs(1),
            Box::new(TestClock::new(start())),
        )
    }

    async fn run_for(logger: ActivityLogger, shutdown: &CancellationToken, millis: u64) -> Result<()> {
        let (result, _) = tokio::join!(logger.run(), async {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            shutdown.cancel();
        });
        result
    }

    async fn drain(mut receiver: mpsc::Receiver<ActivityRecord>) -> Vec<ActivityRecord> {
        let mut records = vec![];
        while let Some(record) = receiver.recv().await {
            records.push(record);
        }
        records
    }

    #[tokio::test(start_paused = true)]
    async fn logs_sanitized_and_redacted_titles() -> Result<()> {
        let mut manager = MockWindowManager::new();
        manager.expect_is_screen_locked().returning(|| Ok(false));
        let mut titles = [
            "alice's document - Editor".to_string(),
            "  ".to_string(),
            "x".repeat(200),
        ]
        .into_iter();
        manager
            .expect_get_active_window_title()
            .returning(move || Ok(titles.next().unwrap()))
            .times(3);
        manager.expect_get_idle_time().returning(|| Ok(0));

        let tracker = ApmTracker::new(Duration::from_secs(60));
        for i in (0..5).rev() {
            tracker.record_tick(start() - ChronoDuration::seconds(i));
        }

        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(10);
        run_for(logger(manager, sender, tracker, &shutdown), &shutdown, 2500).await?;

        let records = drain(receiver).await;
        assert_eq!(records.len(), 3);
        assert_eq!(&*records[0].title, "[redacted]'s document - Editor");
        assert_eq!(&*records[1].title, UNKNOWN_TITLE);
        assert!(records[2].title.chars().count() <= 123);
        assert!(records.iter().all(|r| r.apm == 5));
        assert_eq!(records[0].timestamp, start());
        assert_eq!(records[2].timestamp, start() + ChronoDuration::seconds(2));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn provider_failures_do_not_stop_the_loop() -> Result<()> {
        let mut manager = MockWindowManager::new();
        manager.expect_is_screen_locked().returning(|| Ok(false));
        manager
            .expect_get_active_window_title()
            .returning(|| Err(anyhow!("display went away")));
        manager
            .expect_get_idle_time()
            .returning(|| Err(anyhow!("display went away")));

        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(10);
        let tracker = ApmTracker::new(Duration::from_secs(60));
        run_for(logger(manager, sender, tracker, &shutdown), &shutdown, 3500).await?;

        let records = drain(receiver).await;
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| &*r.title == UNKNOWN_TITLE && r.apm == 0));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn afk_is_recorded_without_apm() -> Result<()> {
        let mut manager = MockWindowManager::new();
        manager.expect_is_screen_locked().returning(|| Ok(false));
        manager
            .expect_get_active_window_title()
            .returning(|| Ok("alice - Mail".into()));
        manager.expect_get_idle_time().returning(|| Ok(300_000));

        let tracker = ApmTracker::new(Duration::from_secs(60));
        tracker.record_tick(start());

        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(10);
        run_for(logger(manager, sender, tracker, &shutdown), &shutdown, 500).await?;

        let records = drain(receiver).await;
        assert_eq!(records, vec![ActivityRecord::afk(start(), AFK_TITLE)]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn locked_screen_is_recorded_as_away() -> Result<()> {
        let mut manager = MockWindowManager::new();
        let mut locked = [true, false].into_iter();
        manager
            .expect_is_screen_locked()
            .returning(move || Ok(locked.next().unwrap_or(false)));
        manager
            .expect_get_active_window_title()
            .returning(|| Ok("alice - Mail".into()))
            .times(1);
        manager.expect_get_idle_time().returning(|| Ok(0));

        let tracker = ApmTracker::new(Duration::from_secs(60));
        tracker.record_tick(start());

        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(10);
        run_for(logger(manager, sender, tracker, &shutdown), &shutdown, 1500).await?;

        let records = drain(receiver).await;
        assert_eq!(
            records,
            vec![
                ActivityRecord::afk(start(), AFK_LOCKED_TITLE),
                ActivityRecord::new(start() + ChronoDuration::seconds(1), "[redacted] - Mail", 1),
            ]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn lock_state_failure_counts_as_unlocked() -> Result<()> {
        let mut manager = MockWindowManager::new();
        manager
            .expect_is_screen_locked()
            .returning(|| Err(anyhow!("no session bus")));
        manager
            .expect_get_active_window_title()
            .returning(|| Ok("Editor".into()));
        manager.expect_get_idle_time().returning(|| Ok(0));

        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(10);
        let tracker = ApmTracker::new(Duration::from_secs(60));
        run_for(logger(manager, sender, tracker, &shutdown), &shutdown, 500).await?;

        let records = drain(receiver).await;
        assert_eq!(records, vec![ActivityRecord::new(start(), "Editor", 0)]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_receiver_is_gone() {
        let mut manager = MockWindowManager::new();
        manager.expect_is_screen_locked().returning(|| Ok(false));
        manager
            .expect_get_active_window_title()
            .returning(|| Ok("Editor".into()));
        manager.expect_get_idle_time().returning(|| Ok(0));

        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(10);
        drop(receiver);
        let tracker = ApmTracker::new(Duration::from_secs(60));
        let result = logger(manager, sender, tracker, &shutdown).run().await;
        assert!(result.is_err());
    }
}
