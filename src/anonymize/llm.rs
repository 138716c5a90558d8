use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument};

use crate::{
    config::LlmConfig,
    error::{Error, Result},
};

/// Second anonymization stage. Implementations receive an already keyword-redacted title and
/// return the model's cleaned version of it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Talks to a local Ollama instance through its `/api/generate` endpoint.
pub struct OllamaClient {
    model: String,
    endpoint: String,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Llm(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.endpoint);
        let response = self
            .http
            .post(url)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Llm("ollama request timed out".into())
                } else {
                    Error::Llm(format!("ollama request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Llm(format!("ollama read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Llm(format!(
                "ollama returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let json: serde_json::Value = serde_json::from_str(&body)?;
        debug!("Ollama answered with {} bytes", body.len());
        json.get("response")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| Error::Llm("ollama response missing string field `response`".into()))
    }
}

/// Used when the model stage is disabled. Every call fails, so the pipeline always falls back
/// to keyword redaction.
pub struct UnavailableClient;

#[async_trait]
impl LlmClient for UnavailableClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::Llm("language model stage is disabled".into()))
    }
}

pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    if config.enabled {
        Ok(Box::new(OllamaClient::new(config)?))
    } else {
        Ok(Box::new(UnavailableClient))
    }
}

pub fn build_prompt(redacted_title: &str) -> String {
    format!(
        r#"You are a text sanitization filter. Your only task is to analyze the following window title and remove any Personally Identifiable Information (PII) like email addresses, real names, or usernames/nicknames. Keep all other information intact. You must only output the sanitized title.
Examples:
- Input: "@some_user - General - My Discord Server"
- Output: "General - My Discord Server"
- Input: "main.py - MySecretProject - Visual Studio Code"
- Output: "main.py - MySecretProject - Visual Studio Code"
Now, sanitize this window title:
Input: "{redacted_title}"
Output:
"#
    )
}

/// Models like to wrap answers in quotes or add commentary on later lines.
pub fn clean_response(response: &str) -> Option<String> {
    let line = response.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("Output:")
        .map(str::trim)
        .unwrap_or(line);
    let line = line
        .strip_prefix('"')
        .and_then(|l| l.strip_suffix('"'))
        .unwrap_or(line)
        .trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Applies a hard upper bound to a single model call.
pub async fn complete_with_timeout(
    client: &dyn LlmClient,
    prompt: &str,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, client.complete(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(Error::LlmTimeout(timeout)),
    }
}

/// Test double that counts calls and answers through a plain function.
#[cfg(test)]
pub(crate) struct CountingClient {
    pub calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    pub answer: fn(&str) -> String,
}

#[cfg(test)]
#[async_trait]
impl LlmClient for CountingClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok((self.answer)(prompt))
    }
}

/// Pulls the title back out of a prompt made by [build_prompt].
#[cfg(test)]
pub(crate) fn prompt_title(prompt: &str) -> String {
    let marker = "Input: \"";
    let start = prompt.rfind(marker).map(|i| i + marker.len()).unwrap_or(0);
    let end = prompt[start..].find('"').map(|i| i + start).unwrap_or(prompt.len());
    prompt[start..end].to_string()
}
