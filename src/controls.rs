//! Enrichment throttle and endpoint controls shared across binaries.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::config::{EnrichmentConfig, ResponseMode, DEFAULT_MODEL};
use crate::dispatcher::Pacer;
use crate::enricher::OpenAiEnricher;
use crate::error::{Error, Result};

/// Command-line flags for binaries that talk to the enrichment service.
#[derive(Args, Debug, Clone)]
pub struct EnrichmentArgs {
    /// OpenAI API key used for enrichment calls
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Chat model identifier
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Optional OpenAI organization id
    #[arg(long, env = "OPENAI_ORG_ID")]
    pub organization: Option<String>,

    /// Base URL for the OpenAI-compatible API
    #[arg(
        long,
        env = "WORDSIFT_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub base_url: String,

    /// Max seconds to wait for each enrichment request
    #[arg(long, env = "WORDSIFT_OPENAI_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Token ceiling for each reply
    #[arg(long, env = "WORDSIFT_OPENAI_MAX_TOKENS", default_value_t = 4000)]
    pub max_tokens: u32,

    /// Sampling temperature for enrichment replies
    #[arg(long, env = "WORDSIFT_OPENAI_TEMPERATURE", default_value_t = 0.3)]
    pub temperature: f32,

    /// Milliseconds between batch dispatches
    #[arg(long, env = "WORDSIFT_DELAY_MS", default_value_t = 500)]
    pub delay_ms: u64,

    /// Retries for a failed batch after the first attempt
    #[arg(long, env = "WORDSIFT_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: usize,

    /// Milliseconds between attempts of one batch
    #[arg(long, env = "WORDSIFT_RETRY_DELAY_MS", default_value_t = 2000)]
    pub retry_delay_ms: u64,

    /// Number of batches allowed in flight at once
    #[arg(
        long = "enrich-threads",
        env = "WORDSIFT_ENRICH_THREADS",
        default_value_t = 1
    )]
    pub concurrency: usize,

    /// Replaces the built-in prompt for analysis passes
    #[arg(long, env = "WORDSIFT_ANALYSIS_PROMPT")]
    pub analysis_prompt: Option<String>,

    /// Replaces the built-in prompt for lemmatize passes
    #[arg(long, env = "WORDSIFT_LEMMATIZE_PROMPT")]
    pub lemmatize_prompt: Option<String>,
}

impl EnrichmentArgs {
    /// Converts the parsed flags into an [`EnrichmentConfig`] for `mode`.
    pub fn build_config(&self, mode: ResponseMode, batch_size: usize) -> EnrichmentConfig {
        let config = EnrichmentConfig::new(self.model.clone(), mode)
            .with_batch_size(batch_size)
            .with_delay(Duration::from_millis(self.delay_ms))
            .with_max_retries(self.max_retries)
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms))
            .with_concurrency(self.concurrency.max(1));
        let prompt = match mode {
            ResponseMode::Analyze => &self.analysis_prompt,
            ResponseMode::Lemmatize => &self.lemmatize_prompt,
        };
        match prompt {
            Some(prompt) => config.with_system_prompt(prompt.clone()),
            None => config,
        }
    }

    /// One pacer for every dispatcher of a run, spaced by `--delay-ms`.
    pub fn build_pacer(&self) -> Arc<Pacer> {
        Arc::new(Pacer::new(Duration::from_millis(self.delay_ms)))
    }

    /// Builds the HTTP enricher; fails when no API key was supplied.
    pub fn build_enricher(&self) -> Result<OpenAiEnricher> {
        let api_key = self.openai_api_key.clone().ok_or_else(|| {
            Error::Configuration("missing OpenAI API key; set OPENAI_API_KEY".into())
        })?;
        OpenAiEnricher::new(
            api_key,
            self.base_url.clone(),
            self.model.clone(),
            self.organization.clone(),
            Duration::from_secs(self.timeout_secs.max(1)),
            self.max_tokens,
        )
        .map(|enricher| enricher.with_temperature(self.temperature))
    }
}
