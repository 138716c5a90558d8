//! Configuration is read from `$XDG_CONFIG_HOME/focuslog/config.toml` (or
//! `$HOME/.config/focuslog/config.toml`). The file must declare `forbidden_keywords`, even if
//! the list is empty. Everything else has defaults.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_PLACEHOLDER: &str = "[redacted]";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Substrings removed from every title before it is stored, sent to the LLM or returned.
    /// Kept optional here only so that a missing key can be reported instead of defaulted.
    #[serde(default)]
    pub forbidden_keywords: Option<Vec<String>>,

    #[serde(default)]
    pub privacy: PrivacyConfig,

    #[serde(default)]
    pub titles: TitleConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrivacyConfig {
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            placeholder: default_placeholder(),
        }
    }
}

/// A title containing `pattern` is replaced as a whole by `replacement`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CleanupRule {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TitleConfig {
    #[serde(default = "default_max_title_length")]
    pub max_title_length: usize,
    #[serde(default = "default_known_browsers")]
    pub known_browsers: Vec<String>,
    /// Order matters, the first matching rule wins.
    #[serde(default)]
    pub cleanup_rules: Vec<CleanupRule>,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            max_title_length: default_max_title_length(),
            known_browsers: default_known_browsers(),
            cleanup_rules: vec![],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default = "default_log_interval")]
    pub log_interval_seconds: u64,
    #[serde(default = "default_apm_poll_interval")]
    pub apm_poll_interval_ms: u64,
    #[serde(default = "default_apm_window")]
    pub apm_window_seconds: u64,
    #[serde(default = "default_afk_threshold")]
    pub afk_threshold_seconds: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            log_interval_seconds: default_log_interval(),
            apm_poll_interval_ms: default_apm_poll_interval(),
            apm_window_seconds: default_apm_window(),
            afk_threshold_seconds: default_afk_threshold(),
        }
    }
}

impl CaptureConfig {
    pub fn log_interval(&self) -> Duration {
        Duration::from_secs(self.log_interval_seconds)
    }

    pub fn apm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.apm_poll_interval_ms)
    }

    pub fn apm_window(&self) -> Duration {
        Duration::from_secs(self.apm_window_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    #[serde(default = "default_prune_interval")]
    pub prune_interval_minutes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            prune_interval_minutes: default_prune_interval(),
        }
    }
}

impl StorageConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours as i64)
    }

    /// Never longer than the retention horizon.
    pub fn prune_interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.prune_interval_minutes as i64).min(self.retention())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_model(),
            endpoint: default_endpoint(),
            timeout_seconds: default_llm_timeout(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

fn default_max_title_length() -> usize {
    120
}

fn default_known_browsers() -> Vec<String> {
    ["Mozilla Firefox", "Google Chrome", "Chromium", "Brave"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_log_interval() -> u64 {
    10
}

fn default_apm_poll_interval() -> u64 {
    1000
}

fn default_apm_window() -> u64 {
    60
}

fn default_afk_threshold() -> u32 {
    120
}

fn default_retention_hours() -> u64 {
    24
}

fn default_prune_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_llm_timeout() -> u64 {
    20
}

fn default_max_concurrency() -> usize {
    4
}

/// Written by `focuslog config init`.
pub const CONFIG_TEMPLATE: &str = r#"# Every title is stripped of these keywords (case-insensitive) before it is stored,
# sent to the language model or shown. The key is required; an empty list is allowed.
forbidden_keywords = []

[privacy]
placeholder = "[redacted]"

[titles]
max_title_length = 120
known_browsers = ["Mozilla Firefox", "Google Chrome", "Chromium", "Brave"]

# [[titles.cleanup_rules]]
# pattern = "YouTube"
# replacement = "YouTube"

[capture]
log_interval_seconds = 10
apm_poll_interval_ms = 1000
apm_window_seconds = 60
afk_threshold_seconds = 120

[storage]
retention_hours = 24
prune_interval_minutes = 60

[llm]
enabled = true
model = "llama3.2"
endpoint = "http://localhost:11434"
timeout_seconds = 20
max_concurrency = 4
"#;

/// One day. Longer capture intervals make no sense for an activity log.
const MAX_CAPTURE_SECONDS: u64 = 24 * 60 * 60;
/// Ten years.
const MAX_RETENTION_HOURS: u64 = 10 * 365 * 24;
const MAX_LLM_TIMEOUT_SECONDS: u64 = 60 * 60;

fn check_at_most(name: &str, value: u64, max: u64) -> Result<()> {
    if value > max {
        return Err(Error::Config(format!("{name} must be at most {max}, got {value}")));
    }
    Ok(())
}

impl Config {
    /// Loads and validates the configuration file. A missing file is an error: running without
    /// an explicit keyword list would silently disable redaction.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Config(format!(
                    "no configuration at {}, create one with `focuslog config init`",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let Some(keywords) = &self.forbidden_keywords else {
            return Err(Error::Config(
                "forbidden_keywords must be declared (use [] for none)".into(),
            ));
        };
        if keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(Error::Config("forbidden_keywords contains a blank entry".into()));
        }
        if self.privacy.placeholder.is_empty() {
            return Err(Error::Config("privacy.placeholder can't be empty".into()));
        }
        if self.titles.max_title_length == 0 {
            return Err(Error::Config("titles.max_title_length must be positive".into()));
        }
        let capture = &self.capture;
        if capture.log_interval_seconds == 0
            || capture.apm_poll_interval_ms == 0
            || capture.apm_window_seconds == 0
        {
            return Err(Error::Config("capture intervals must be positive".into()));
        }
        check_at_most("capture.log_interval_seconds", capture.log_interval_seconds, MAX_CAPTURE_SECONDS)?;
        check_at_most("capture.apm_poll_interval_ms", capture.apm_poll_interval_ms, MAX_CAPTURE_SECONDS * 1000)?;
        check_at_most("capture.apm_window_seconds", capture.apm_window_seconds, MAX_CAPTURE_SECONDS)?;
        check_at_most(
            "capture.afk_threshold_seconds",
            capture.afk_threshold_seconds as u64,
            MAX_CAPTURE_SECONDS,
        )?;

        let storage = &self.storage;
        if storage.retention_hours == 0 || storage.prune_interval_minutes == 0 {
            return Err(Error::Config("storage horizons must be positive".into()));
        }
        check_at_most("storage.retention_hours", storage.retention_hours, MAX_RETENTION_HOURS)?;
        check_at_most(
            "storage.prune_interval_minutes",
            storage.prune_interval_minutes,
            MAX_RETENTION_HOURS * 60,
        )?;

        if self.llm.timeout_seconds == 0 || self.llm.max_concurrency == 0 {
            return Err(Error::Config(
                "llm.timeout_seconds and llm.max_concurrency must be positive".into(),
            ));
        }
        check_at_most("llm.timeout_seconds", self.llm.timeout_seconds, MAX_LLM_TIMEOUT_SECONDS)?;
        Ok(())
    }

    /// Valid only after [Config::validate] succeeded.
    pub fn forbidden_keywords(&self) -> &[String] {
        self.forbidden_keywords.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) fn test_config(keywords: &[&str]) -> Config {
    let mut config = Config::from_toml(CONFIG_TEMPLATE).expect("template should be valid");
    config.forbidden_keywords = Some(keywords.iter().map(|k| k.to_string()).collect());
    config
}
