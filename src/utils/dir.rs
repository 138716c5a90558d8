use std::{env, io, path::PathBuf};

use anyhow::{anyhow, Result};

const APPLICATION_NAME: &str = "focuslog";

/// `$XDG_STATE_HOME/focuslog` or `$HOME/.local/state/focuslog`. Created if missing.
pub fn create_application_default_path() -> Result<PathBuf> {
    let mut path = xdg_dir("XDG_STATE_HOME", ".local/state")?;
    path.push(APPLICATION_NAME);

    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}

/// `$XDG_CONFIG_HOME/focuslog/config.toml` or `$HOME/.config/focuslog/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    let mut path = xdg_dir("XDG_CONFIG_HOME", ".config")?;
    path.push(APPLICATION_NAME);
    path.push("config.toml");
    Ok(path)
}

fn xdg_dir(variable: &str, home_fallback: &str) -> Result<PathBuf> {
    env::var(variable)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var("HOME").ok().map(|home| PathBuf::from(home).join(home_fallback)))
        .ok_or_else(|| anyhow!("Couldn't find neither {variable} nor HOME"))
}
