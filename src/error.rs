use std::time::Duration;

use thiserror::Error;

/// Errors shared by the capture pipeline and the timeline query path.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    /// Window title or idle time couldn't be read from the desktop.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM call timed out after {0:?}")]
    LlmTimeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
