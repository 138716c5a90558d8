use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Detects signals sent to the process and cancels `cancelation`. Returns early if something
/// else cancels it first.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c, shutting down");
            cancelation.cancel();
        },
        _ = terminate() => {
            info!("Received SIGTERM, shutting down");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            warn!("Couldn't listen for SIGTERM {e:?}");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}
