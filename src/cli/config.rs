use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Subcommand;

use crate::{
    config::{Config, CONFIG_TEMPLATE},
    error::Error,
    utils::dir::default_config_path,
};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    #[command(about = "Write a commented configuration template")]
    Init {
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
        #[arg(long, help = "Where to write. By default $XDG_CONFIG_HOME/focuslog/config.toml")]
        config: Option<PathBuf>,
    },
    #[command(about = "Load and validate the configuration")]
    Check {
        #[arg(long, help = "File to check. By default $XDG_CONFIG_HOME/focuslog/config.toml")]
        config: Option<PathBuf>,
    },
}

pub fn process_config_command(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Init { force, config } => {
            let path = config.map_or_else(default_config_path, Ok)?;
            init_config(&path, force)?;
            println!("Wrote {}", path.display());
            println!("List the words that must never be recorded in forbidden_keywords.");
        }
        ConfigCommand::Check { config } => {
            let path = config.map_or_else(default_config_path, Ok)?;
            let config = Config::load(&path)?;
            println!("{} is valid", path.display());
            println!("{}", describe(&config));
        }
    }
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        ))
        .into());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, CONFIG_TEMPLATE)?;
    Ok(())
}

fn describe(config: &Config) -> String {
    let llm = if config.llm.enabled {
        format!("{} at {}", config.llm.model, config.llm.endpoint)
    } else {
        "disabled".to_string()
    };
    format!(
        "forbidden keywords: {}\n\
         log interval: {}s, APM window: {}s\n\
         retention: {}h\n\
         language model: {llm}",
        config.forbidden_keywords().len(),
        config.capture.log_interval_seconds,
        config.capture.apm_window_seconds,
        config.storage.retention_hours,
    )
}
