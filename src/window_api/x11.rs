use anyhow::{anyhow, Result};
use tracing::instrument;
use xcb::{
    screensaver::{QueryInfo, QueryInfoReply},
    x::{self, Atom, Drawable, GetProperty, InternAtom, Window, ATOM_ANY},
    Connection,
};

use crate::error::Error;

use super::WindowManager;

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_active_window(conn: &Connection, root: &Window, active_window_atom: Atom) -> Result<Window> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: *root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    result
        .value::<Window>()
        .first()
        .copied()
        .ok_or_else(|| Error::ProviderUnavailable("no active window".into()).into())
}

pub fn get_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value::<u8>()).into_owned())
}

/// Reads `_NET_ACTIVE_WINDOW`/`_NET_WM_NAME` and the screensaver idle counter over xcb.
pub struct LinuxWindowManager {
    connection: Connection,
    preferred_screen: i32,
    active_window_atom: Atom,
    window_name_atom: Atom,
}

impl LinuxWindowManager {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)
            .map_err(|e| Error::ProviderUnavailable(format!("can't connect to X server: {e}")))?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        Ok(Self {
            connection,
            preferred_screen,
            active_window_atom,
            window_name_atom,
        })
    }

    // Currently the application only supports 1 x11 screen.
    fn root(&self) -> Result<Window> {
        self.connection
            .get_setup()
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .map(|screen| screen.root())
            .ok_or_else(|| anyhow!("screen {} doesn't exist", self.preferred_screen))
    }
}

impl WindowManager for LinuxWindowManager {
    #[instrument(skip(self))]
    fn get_active_window_title(&mut self) -> Result<String> {
        let root = self.root()?;
        let active_window = get_active_window(&self.connection, &root, self.active_window_atom)?;
        get_name(&self.connection, active_window, self.window_name_atom)
    }

    #[instrument(skip(self))]
    fn get_idle_time(&mut self) -> Result<u32> {
        let root = self.root()?;
        let idle = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(root),
        });
        let reply: QueryInfoReply = self.connection.wait_for_reply(idle)?;
        Ok(reply.ms_since_user_input())
    }
}
