use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "focuslog-daemon", version, about = "Records desktop activity in the background")]
pub struct DaemonArgs {
    /// Stay attached to the terminal instead of detaching.
    #[arg(long)]
    pub force: bool,
    /// State directory. By default $XDG_STATE_HOME/focuslog or $HOME/.local/state/focuslog
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Configuration file. By default $XDG_CONFIG_HOME/focuslog/config.toml
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
