use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::{utils::clock::Clock, window_api::pooled::PooledWindowManager};

/// Ticks of user input seen during the last `window`.
///
/// Cloning shares the same window. The sensor is the only writer, the logger only reads.
#[derive(Clone)]
pub struct ApmTracker {
    window: chrono::Duration,
    ticks: Arc<Mutex<VecDeque<DateTime<Utc>>>>,
}

impl ApmTracker {
    pub fn new(window: Duration) -> Self {
        let window = chrono::Duration::from_std(window)
            .unwrap_or(chrono::Duration::seconds(60))
            .max(chrono::Duration::seconds(1));
        Self {
            window,
            ticks: Arc::default(),
        }
    }

    fn evict(ticks: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
        while ticks.front().is_some_and(|tick| *tick < cutoff) {
            ticks.pop_front();
        }
    }

    pub fn record_tick(&self, at: DateTime<Utc>) {
        let mut ticks = self.ticks.lock().unwrap_or_else(|e| e.into_inner());
        // Keeps the window ordered even if the wall clock steps back.
        let at = ticks.back().map_or(at, |last| at.max(*last));
        ticks.push_back(at);
        Self::evict(&mut ticks, at - self.window);
    }

    /// Ticks left in the window scaled to a minute.
    ///
    /// Nothing is extrapolated from a partially filled window: right after start up, 10 ticks
    /// in a 60 second window are 10 APM, regardless of how long the sensor has been running.
    pub fn current_apm(&self, now: DateTime<Utc>) -> u32 {
        let mut ticks = self.ticks.lock().unwrap_or_else(|e| e.into_inner());
        Self::evict(&mut ticks, now - self.window);
        let in_window = ticks.iter().filter(|tick| **tick <= now).count() as u64;
        let window_seconds = self.window.num_seconds().max(1) as u64;
        (in_window * 60 / window_seconds) as u32
    }

    pub fn tick_count(&self) -> usize {
        self.ticks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Turns the idle-time counter into "was there input since the last poll". Idle time only grows
/// while the user does nothing, any drop below the expected growth means input happened.
pub struct IdleActivityDetector {
    poll_interval_ms: u64,
    last_idle_ms: Option<u64>,
}

impl IdleActivityDetector {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval_ms: poll_interval.as_millis() as u64,
            last_idle_ms: None,
        }
    }

    pub fn observe(&mut self, idle_ms: u32) -> bool {
        let idle_ms = idle_ms as u64;
        let active = match self.last_idle_ms {
            Some(last) => idle_ms < last + self.poll_interval_ms,
            // First observation only establishes the baseline.
            None => false,
        };
        self.last_idle_ms = Some(idle_ms);
        active
    }
}

/// Background loop that polls the idle provider and feeds the [ApmTracker].
pub struct ApmSensor {
    producer: PooledWindowManager,
    tracker: ApmTracker,
    detector: IdleActivityDetector,
    shutdown: CancellationToken,
    poll_interval: Duration,
    time_provider: Box<dyn Clock>,
}

impl ApmSensor {
    pub fn new(
        producer: PooledWindowManager,
        tracker: ApmTracker,
        shutdown: CancellationToken,
        poll_interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            producer,
            tracker,
            detector: IdleActivityDetector::new(poll_interval),
            shutdown,
            poll_interval,
            time_provider,
        }
    }

    async fn poll(&mut self) {
        match self.producer.get_idle_time().await {
            Ok(idle_ms) => {
                if self.detector.observe(idle_ms) {
                    let now = self.time_provider.time();
                    trace!("Input tick at {now}");
                    self.tracker.record_tick(now);
                }
            }
            // Skipped polls don't reset the baseline.
            Err(e) => debug!("Couldn't read idle time {e:?}"),
        }
    }

    /// Executes the sensor loop until shutdown.
    pub async fn run(mut self) -> Result<()> {
        info!("APM sensor started");
        let shutdown = self.shutdown.clone();
        let mut poll_point = self.time_provider.instant();
        loop {
            poll_point += self.poll_interval;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("APM sensor stopped");
                    return Ok(())
                }
                _ = self.poll() => ()
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("APM sensor stopped");
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(poll_point) => ()
            }
        }
    }
}
