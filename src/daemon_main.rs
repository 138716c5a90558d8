use std::{env::args, path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Result;
use clap::Parser;
use focuslog::{
    config::Config,
    daemon::{args::DaemonArgs, start_daemon},
    utils::{
        dir::{create_application_default_path, default_config_path},
        logging::{enable_logging, DAEMON_PREFIX},
        runtime::single_thread_runtime,
    },
};

fn main() -> ExitCode {
    match run_service(args().collect::<Vec<_>>()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("focuslog-daemon: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_service(command_args: Vec<String>) -> Result<()> {
    let args = DaemonArgs::parse_from(&command_args);

    // Configuration problems are reported before detaching, while there still is a terminal.
    let config_path = args.config.clone().map_or_else(default_config_path, Ok)?;
    let config = Config::load(&config_path)?;
    // Daemonizing moves the process to `/`.
    let app_dir = std::path::absolute(args.dir.clone().map_or_else(create_application_default_path, Ok)?)?;

    if !args.force {
        #[cfg(unix)]
        {
            use daemonize::Daemonize;
            use tracing::error;

            let daemonize = Daemonize::new()
                .stdout(daemonize::Stdio::devnull())
                .stderr(daemonize::Stdio::devnull())
                .execute();
            match daemonize {
                daemonize::Outcome::Parent(parent) => {
                    parent
                        .inspect_err(|e| error!("Failed to create daemon on parent side {e:?}"))?;
                    println!("Created daemon");
                    return Ok(());
                }
                daemonize::Outcome::Child(_) => (),
            }
        }
    }

    run(args, app_dir, config)
}

fn run(args: DaemonArgs, app_dir: PathBuf, config: Config) -> Result<()> {
    enable_logging(DAEMON_PREFIX, &app_dir, args.log, args.log_console)?;
    let runtime = single_thread_runtime()?;
    let result = runtime.block_on(async move { start_daemon(app_dir, config).await });
    // A desktop call stuck past its timeout must not keep the process alive.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}
