pub mod config;
pub mod timeline;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::{process_config_command, ConfigCommand};
use timeline::{process_timeline_command, TimelineCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    config::Config,
    daemon::start_daemon,
    utils::{
        dir::{create_application_default_path, default_config_path},
        logging::{enable_logging, CLI_PREFIX, DAEMON_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "focuslog", version, long_about = None)]
#[command(about = "Privacy preserving desktop activity log", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

/// Locations shared by every command that touches the record store.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Locations {
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    pub dir: Option<PathBuf>,
    #[arg(
        long,
        help = "Configuration file. By default $XDG_CONFIG_HOME/focuslog/config.toml"
    )]
    pub config: Option<PathBuf>,
}

impl Locations {
    pub fn state_dir(&self) -> Result<PathBuf> {
        self.dir
            .clone()
            .map_or_else(create_application_default_path, Ok)
    }

    pub fn config_path(&self) -> Result<PathBuf> {
        self.config.clone().map_or_else(default_config_path, Ok)
    }

    pub fn load_config(&self) -> Result<Config> {
        Ok(Config::load(&self.config_path()?)?)
    }
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(
        about = "Run a daemon directly in current console. Used for debugging and for running under a supervisor"
    )]
    Serve {
        #[command(flatten)]
        locations: Locations,
    },
    #[command(about = "Display a timeline of user activity")]
    Timeline {
        #[command(flatten)]
        command: TimelineCommand,
    },
    #[command(about = "Create or check the configuration file")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };

    match args.commands {
        Commands::Serve { locations } => {
            let dir = locations.state_dir()?;
            enable_logging(DAEMON_PREFIX, &dir, logging_level, true)?;
            let config = locations.load_config()?;
            start_daemon(dir, config).await
        }
        Commands::Timeline { command } => {
            enable_logging(CLI_PREFIX, &command.locations.state_dir()?, logging_level, args.log)?;
            process_timeline_command(command).await
        }
        Commands::Config { command } => process_config_command(command),
    }
}
