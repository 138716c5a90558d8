use std::{
    sync::{Arc, Mutex, TryLockError},
    time::Duration,
};

use anyhow::{anyhow, Result};
use tracing::warn;

use crate::error::Error;

use super::WindowManager;

/// Runs every call of a [WindowManager] on tokio's blocking pool and stops waiting after
/// `timeout`, so a slow desktop never stalls the loops sharing the runtime.
///
/// A call that timed out keeps running in the background and holds the backend until it
/// returns. Calls made meanwhile fail right away instead of queueing behind it.
#[derive(Clone)]
pub struct PooledWindowManager {
    inner: Arc<Mutex<Box<dyn WindowManager + Send>>>,
    timeout: Duration,
}

impl PooledWindowManager {
    pub fn new(manager: impl WindowManager + Send + 'static, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(manager))),
            timeout,
        }
    }

    async fn call<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn WindowManager) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let task = tokio::task::spawn_blocking(move || {
            let mut manager = match inner.try_lock() {
                Ok(manager) => manager,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    return Err(Error::ProviderUnavailable(format!(
                        "{operation}: previous call is still running"
                    ))
                    .into())
                }
            };
            f(&mut **manager)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(anyhow!("{operation} panicked: {e}")),
            Err(_) => {
                warn!("Reading {operation} took longer than {:?}", self.timeout);
                Err(Error::ProviderUnavailable(format!(
                    "{operation} timed out after {:?}",
                    self.timeout
                ))
                .into())
            }
        }
    }

    pub async fn get_active_window_title(&self) -> Result<String> {
        self.call("window title", |manager| manager.get_active_window_title())
            .await
    }

    pub async fn get_idle_time(&self) -> Result<u32> {
        self.call("idle time", |manager| manager.get_idle_time()).await
    }

    pub async fn is_screen_locked(&self) -> Result<bool> {
        self.call("screen lock state", |manager| manager.is_screen_locked())
            .await
    }
}
