//! Contains logic for reading the focused window, the idle counter and the screen lock state
//! from the desktop. [GenericWindowManager] is the main artifact of this module that abstracts
//! the operations, [pooled::PooledWindowManager] is how the async loops call it.

pub mod command;
pub mod pooled;
pub mod screen_lock;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "x11")]
extern crate xcb;

use std::time::Duration;

use anyhow::Result;
#[cfg(test)]
use mockall::automock;
use screen_lock::ScreenLockDetector;

/// Upper bound for a single desktop call.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(2);

/// Contract every desktop backend implements. Failures are reported as
/// [Error::ProviderUnavailable](crate::error::Error::ProviderUnavailable). Calls may block.
#[cfg_attr(test, automock)]
pub trait WindowManager {
    /// Title of the focused window. For example 'bash in hello' or 'Document 1' or 'Vibing in
    /// YouTube - Mozilla Firefox'
    fn get_active_window_title(&mut self) -> Result<String>;

    /// Retrieve amount of time user has been inactive in milliseconds
    fn get_idle_time(&mut self) -> Result<u32>;

    /// Whether a lock screen or screen saver is active. Backends that can't tell report
    /// unlocked.
    fn is_screen_locked(&mut self) -> Result<bool> {
        Ok(false)
    }
}

/// Picks the backend chosen at compile time. The lock state always comes from the session bus.
pub struct GenericWindowManager {
    inner: Box<dyn WindowManager + Send>,
    screen_lock: ScreenLockDetector,
}

impl GenericWindowManager {
    pub fn new() -> Result<Self> {
        Ok(Self {
            inner: backend()?,
            screen_lock: ScreenLockDetector::new(),
        })
    }
}

fn backend() -> Result<Box<dyn WindowManager + Send>> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "x11")] {
            use x11::LinuxWindowManager;
            Ok(Box::new(LinuxWindowManager::new()?))
        }
        else {
            use command::CommandWindowManager;
            Ok(Box::new(CommandWindowManager::new()?))
        }
    }
}

impl WindowManager for GenericWindowManager {
    fn get_active_window_title(&mut self) -> Result<String> {
        self.inner.get_active_window_title()
    }

    fn get_idle_time(&mut self) -> Result<u32> {
        self.inner.get_idle_time()
    }

    fn is_screen_locked(&mut self) -> Result<bool> {
        self.screen_lock.is_locked()
    }
}
