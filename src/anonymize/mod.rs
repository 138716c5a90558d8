//! Two stage anonymization of window titles.
//!
//! 1. [redactor::KeywordRedactor] removes configured keywords. It always runs and its output is
//!    the only thing the model ever sees.
//! 2. [llm::LlmClient] asks a language model to scrub whatever else looks personal. Its answer is
//!    redacted again, and any failure falls back to the stage 1 output.
//!
//! Results are memoized per title in [cache::AnonymizationCache].

pub mod cache;
pub mod llm;
pub mod redactor;

use std::{sync::Arc, time::Duration};

use cache::AnonymizationCache;
use llm::{build_prompt, clean_response, complete_with_timeout, LlmClient};
use redactor::KeywordRedactor;
use tracing::{debug, warn};

use crate::{config::Config, error::Result};

pub struct AnonymizationPipeline {
    redactor: Arc<KeywordRedactor>,
    client: Box<dyn LlmClient>,
    timeout: Duration,
    cache: AnonymizationCache,
}

impl AnonymizationPipeline {
    pub fn new(redactor: Arc<KeywordRedactor>, client: Box<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            redactor,
            client,
            timeout,
            cache: AnonymizationCache::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let redactor = KeywordRedactor::new(config.forbidden_keywords(), &config.privacy.placeholder)?;
        let client = llm::create_llm_client(&config.llm)?;
        Ok(Self::new(Arc::new(redactor), client, config.llm.timeout()))
    }

    /// Anonymized form of `raw_title`, computed at most once per process.
    pub async fn anonymize(&self, raw_title: &str) -> Arc<str> {
        self.cache
            .get_or_compute(raw_title, || self.compute(raw_title))
            .await
    }

    async fn compute(&self, raw_title: &str) -> String {
        let redacted = self.redactor.redact(raw_title);
        let prompt = build_prompt(&redacted);

        match complete_with_timeout(self.client.as_ref(), &prompt, self.timeout).await {
            Ok(response) => match clean_response(&response) {
                Some(cleaned) => {
                    let anonymized = self.redactor.redact(&cleaned);
                    debug!("Anonymized {redacted:?} into {anonymized:?}");
                    anonymized
                }
                None => {
                    warn!("Model returned nothing for {redacted:?}, keeping keyword redaction");
                    redacted
                }
            },
            Err(e) => {
                warn!("Model anonymization failed for {redacted:?}: {e}. Keeping keyword redaction");
                redacted
            }
        }
    }
}
