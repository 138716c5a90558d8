//! Local query endpoint of the daemon. A client writes one JSON request per line to a unix socket
//! in the state directory and reads one JSON response line back. Every query is answered by the
//! daemon's single [TimelineAggregator], so a title reaches the model once per daemon lifetime.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use futures::{stream::FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{UnixListener, UnixStream},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::timeline::{aggregator::TimelineAggregator, TimelineRange};

use super::storage::record_storage::ActivityStore;

const SOCKET_NAME: &str = "focuslog.sock";

pub fn socket_path(state_dir: &Path) -> PathBuf {
    state_dir.join(SOCKET_NAME)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum QueryRequest {
    Timeline {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        since: DateTime<Utc>,
        #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
        until: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryResponse {
    Timeline { text: String },
    Error { message: String },
}

pub struct QueryServer<S: ActivityStore> {
    path: PathBuf,
    listener: UnixListener,
    aggregator: TimelineAggregator<S>,
    shutdown: CancellationToken,
}

impl<S: ActivityStore> QueryServer<S> {
    /// Binds the socket at `path`. A socket file nobody listens on is left over from a daemon
    /// that didn't exit cleanly and gets replaced.
    pub fn bind(
        path: PathBuf,
        aggregator: TimelineAggregator<S>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        if std::os::unix::net::UnixStream::connect(&path).is_ok() {
            return Err(anyhow!("another daemon is already listening on {path:?}"));
        }
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale socket {path:?}"),
            Err(e) if e.kind() == ErrorKind::NotFound => (),
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&path)?;
        info!("Query server listening on {path:?}");
        Ok(Self {
            path,
            listener,
            aggregator,
            shutdown,
        })
    }

    /// Accepts clients until shutdown. Clients are served concurrently on the same task.
    pub async fn run(self) -> Result<()> {
        let mut clients = FuturesUnordered::new();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Query server stopped");
                    return Ok(())
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => clients.push(self.serve_client(stream)),
                    Err(e) => error!("Failed to accept query connection {e:?}"),
                },
                Some(()) = clients.next(), if !clients.is_empty() => (),
            }
        }
    }

    async fn serve_client(&self, stream: UnixStream) {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return,
                Err(e) => {
                    warn!("Query connection failed {e:?}");
                    return;
                }
            };

            let response = self.answer(&line).await;
            let mut payload = match serde_json::to_vec(&response) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to serialize query response {e:?}");
                    return;
                }
            };
            payload.push(b'\n');
            if let Err(e) = writer.write_all(&payload).await {
                warn!("Failed to write query response {e:?}");
                return;
            }
        }
    }

    async fn answer(&self, line: &str) -> QueryResponse {
        let request = match serde_json::from_str::<QueryRequest>(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Invalid query request: {e}");
                return QueryResponse::Error {
                    message: format!("invalid request: {e}"),
                };
            }
        };

        match request {
            QueryRequest::Timeline { since, until } => match self
                .aggregator
                .get_activity_timeline(TimelineRange::new(since, until))
                .await
            {
                Ok(text) => QueryResponse::Timeline { text },
                Err(e) => {
                    error!("Timeline query failed {e:?}");
                    QueryResponse::Error {
                        message: format!("{e:#}"),
                    }
                }
            },
        }
    }
}

impl<S: ActivityStore> Drop for QueryServer<S> {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Asks the daemon listening on `path` for a formatted timeline. `Ok(None)` means no daemon is
/// listening.
pub async fn request_timeline(path: &Path, range: TimelineRange) -> Result<Option<String>> {
    let stream = match UnixStream::connect(path).await {
        Ok(stream) => stream,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
            return Ok(None)
        }
        Err(e) => return Err(e.into()),
    };

    let (reader, mut writer) = stream.into_split();
    let mut payload = serde_json::to_vec(&QueryRequest::Timeline {
        since: range.since,
        until: range.until,
    })?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;

    let line = BufReader::new(reader)
        .lines()
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("daemon closed the connection without answering"))?;
    match serde_json::from_str::<QueryResponse>(&line)? {
        QueryResponse::Timeline { text } => Ok(Some(text)),
        QueryResponse::Error { message } => Err(anyhow!("daemon couldn't build the timeline: {message}")),
    }
}
