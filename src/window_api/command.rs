use std::{
    io::Read,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use anyhow::Result;
use tracing::instrument;

use crate::error::Error;

use super::WindowManager;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const TOOLS: [&str; 2] = ["xdotool", "xprintidle"];

/// Reads the desktop state through `xdotool` and `xprintidle`.
pub struct CommandWindowManager {
    timeout: Duration,
}

impl CommandWindowManager {
    /// Fails when one of the tools isn't on `PATH`.
    pub fn new() -> Result<Self> {
        for tool in TOOLS {
            if find_in_path(tool).is_none() {
                return Err(Error::ProviderUnavailable(format!(
                    "required tool '{tool}' was not found in PATH"
                ))
                .into());
            }
        }
        Ok(Self {
            timeout: COMMAND_TIMEOUT,
        })
    }
}

fn find_in_path(tool: &str) -> Option<std::path::PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(tool))
        .find(|candidate| candidate.is_file())
}

/// Runs a command and returns its trimmed stdout. The child is killed when it outlives
/// `timeout`.
fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<String, Error> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::ProviderUnavailable(format!("failed to start {program}: {e}")))?;

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::ProviderUnavailable(format!(
                "{program} timed out after {timeout:?}"
            )));
        }
        thread::sleep(Duration::from_millis(5));
    };

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_string(&mut stdout)?;
    }

    if !status.success() {
        let mut stderr = String::new();
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr);
        }
        return Err(Error::ProviderUnavailable(format!(
            "{program} exited with {status}: {}",
            stderr.trim()
        )));
    }

    Ok(stdout.trim().to_string())
}

fn parse_idle(output: &str) -> Result<u32, Error> {
    output
        .trim()
        .parse::<u64>()
        .map(|ms| ms.min(u32::MAX as u64) as u32)
        .map_err(|e| Error::ProviderUnavailable(format!("unexpected xprintidle output {output:?}: {e}")))
}

impl WindowManager for CommandWindowManager {
    #[instrument(skip(self))]
    fn get_active_window_title(&mut self) -> Result<String> {
        Ok(run_command(
            "xdotool",
            &["getactivewindow", "getwindowname"],
            self.timeout,
        )?)
    }

    #[instrument(skip(self))]
    fn get_idle_time(&mut self) -> Result<u32> {
        let output = run_command("xprintidle", &[], self.timeout)?;
        Ok(parse_idle(&output)?)
    }
}
