use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use collection::{
    afk::AfkEvaluator,
    apm::{ApmSensor, ApmTracker},
    collector::ActivityLogger,
    sanitizer::TitleSanitizer,
};
use processing::{local_save::LocalSaver, ProcessingModule};
use query::{socket_path, QueryServer};
use storage::{entities::ActivityRecord, record_storage::ActivityStoreImpl};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    anonymize::redactor::KeywordRedactor,
    config::Config,
    timeline::aggregator::TimelineAggregator,
    utils::clock::{Clock, DefaultClock},
    window_api::{pooled::PooledWindowManager, GenericWindowManager, WindowManager, PROVIDER_TIMEOUT},
};

pub mod args;
pub mod collection;
pub mod processing;
pub mod query;
pub mod shutdown;
pub mod storage;

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf, config: Config) -> Result<()> {
    let dir = std::path::absolute(dir)?;
    std::env::set_current_dir("/")?;
    info!("Starting daemon in {dir:?}");

    let (sender, receiver) = mpsc::channel::<ActivityRecord>(10);
    let shutdown_token = CancellationToken::new();

    let redactor = Arc::new(KeywordRedactor::new(
        config.forbidden_keywords(),
        &config.privacy.placeholder,
    )?);
    if redactor.is_empty() {
        warn!("No forbidden keywords configured, titles are stored as sanitized");
    }
    let tracker = ApmTracker::new(config.capture.apm_window());
    let store = Arc::new(ActivityStoreImpl::new(dir.join("records"))?);

    let aggregator =
        TimelineAggregator::from_config(Arc::clone(&store), &config, Box::new(DefaultClock))?;
    let query_server = QueryServer::bind(socket_path(&dir), aggregator, shutdown_token.clone())?;

    // The sensor and the logger poll independently, so each gets its own provider.
    let sensor = create_sensor(
        GenericWindowManager::new()?,
        tracker.clone(),
        &config,
        &shutdown_token,
        DefaultClock,
    );
    let collector = create_collector(
        sender,
        GenericWindowManager::new()?,
        redactor,
        tracker,
        &config,
        &shutdown_token,
        DefaultClock,
    );
    let processor = create_processor(store, receiver, &config, DefaultClock);

    let (_, sensor_result, collection_result, processing_result, query_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        sensor.run(),
        stop_all_on_exit(collector.run(), &shutdown_token),
        processor.run(),
        query_server.run(),
    );

    if let Err(sensor_result) = sensor_result {
        error!("APM sensor got an error {:?}", sensor_result);
    }

    if let Err(collection_result) = collection_result {
        error!("Collection module got an error {:?}", collection_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    if let Err(query_result) = query_result {
        error!("Query server got an error {:?}", query_result);
    }

    info!("Daemon stopped");
    Ok(())
}

/// The logger can only stop on its own when the processing side is gone. Nothing is recorded
/// after that, so the rest of the daemon goes down with it.
async fn stop_all_on_exit(
    task: impl std::future::Future<Output = Result<()>>,
    shutdown_token: &CancellationToken,
) -> Result<()> {
    let result = task.await;
    shutdown_token.cancel();
    result
}

fn create_sensor(
    manager: impl WindowManager + Send + 'static,
    tracker: ApmTracker,
    config: &Config,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> ApmSensor {
    let poll_interval = config.capture.apm_poll_interval();
    ApmSensor::new(
        PooledWindowManager::new(manager, poll_interval.min(PROVIDER_TIMEOUT)),
        tracker,
        shutdown_token.clone(),
        poll_interval,
        Box::new(clock),
    )
}

fn create_collector(
    sender: mpsc::Sender<ActivityRecord>,
    manager: impl WindowManager + Send + 'static,
    redactor: Arc<KeywordRedactor>,
    tracker: ApmTracker,
    config: &Config,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> ActivityLogger {
    let log_interval = config.capture.log_interval();
    ActivityLogger::new(
        sender,
        PooledWindowManager::new(manager, log_interval.min(PROVIDER_TIMEOUT)),
        TitleSanitizer::new(&config.titles),
        redactor,
        tracker,
        shutdown_token.clone(),
        AfkEvaluator::from_seconds(config.capture.afk_threshold_seconds),
        log_interval,
        Box::new(clock),
    )
}

fn create_processor(
    store: Arc<ActivityStoreImpl>,
    receiver: mpsc::Receiver<ActivityRecord>,
    config: &Config,
    clock: impl Clock,
) -> ProcessingModule<LocalSaver<Arc<ActivityStoreImpl>>> {
    let saver = LocalSaver::new(
        store,
        config.storage.retention(),
        config.storage.prune_interval(),
        Box::new(clock),
    );
    ProcessingModule::new(receiver, saver)
}
