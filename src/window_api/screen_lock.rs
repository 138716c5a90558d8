use anyhow::Result;
use tracing::{debug, instrument};
use zbus::blocking::Connection;

use crate::error::Error;

/// Screen saver services of the common desktops. The first one that answers decides.
const SCREEN_SAVERS: [(&str, &str); 4] = [
    ("org.freedesktop.ScreenSaver", "/org/freedesktop/ScreenSaver"),
    ("org.gnome.ScreenSaver", "/org/gnome/ScreenSaver"),
    ("org.cinnamon.ScreenSaver", "/org/cinnamon/ScreenSaver"),
    ("org.mate.ScreenSaver", "/org/mate/ScreenSaver"),
];

/// Asks the session bus whether the screen is locked. The connection is opened on first use
/// and kept afterwards.
#[derive(Default)]
pub struct ScreenLockDetector {
    connection: Option<Connection>,
}

impl ScreenLockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection(&mut self) -> Result<Connection> {
        if let Some(connection) = &self.connection {
            return Ok(connection.clone());
        }
        let connection = Connection::session()
            .map_err(|e| Error::ProviderUnavailable(format!("no session bus: {e}")))?;
        self.connection = Some(connection.clone());
        Ok(connection)
    }

    #[instrument(skip(self))]
    pub fn is_locked(&mut self) -> Result<bool> {
        let connection = self.connection()?;
        for (service, path) in SCREEN_SAVERS {
            match get_active(&connection, service, path) {
                Ok(active) => return Ok(active),
                Err(e) => debug!("{service} didn't answer: {e}"),
            }
        }
        Err(Error::ProviderUnavailable("no screen saver service answered".into()).into())
    }
}

fn get_active(connection: &Connection, service: &str, path: &str) -> zbus::Result<bool> {
    let reply = connection.call_method(Some(service), path, Some(service), "GetActive", &())?;
    reply.body().deserialize::<bool>()
}
