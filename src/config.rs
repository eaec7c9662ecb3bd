//! Per-run enrichment configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default number of items per analysis batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Default number of words per lemmatize batch.
pub const DEFAULT_DEDUPE_BATCH_SIZE: usize = 200;

/// System prompt for per-item analysis.
pub const ANALYSIS_PROMPT: &str = "You are a Korean language tutor. You receive a JSON array of \
Korean vocabulary words or grammar patterns with example sentences. For every element, in the \
same order, write a short learner-oriented explanation: meaning, part of speech or usage, and one \
natural example sentence with its English translation. Respond with only a JSON array of objects \
of the form {\"item\": <input>, \"analysis\": <explanation>}, one object per input element.";

/// System prompt for the lemmatize/dedupe pass.
pub const LEMMATIZE_PROMPT: &str = "You are a Korean morphology assistant. You receive a JSON \
array of Korean words. Reduce each word to its dictionary form, dropping particles and verb \
endings, and remove duplicates. Respond with only a JSON array of strings.";

/// Shape the enrichment service is asked to answer with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseMode {
    /// A JSON array of canonical words; each becomes its own record.
    Lemmatize,
    /// One analysis per input item, in input order.
    Analyze,
}

impl ResponseMode {
    /// Prompt used when none is configured.
    pub fn default_prompt(self) -> &'static str {
        match self {
            Self::Lemmatize => LEMMATIZE_PROMPT,
            Self::Analyze => ANALYSIS_PROMPT,
        }
    }
}

/// Immutable knobs owned by a [`crate::BatchDispatcher`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrichmentConfig {
    model: String,
    system_prompt: String,
    batch_size: usize,
    delay: Duration,
    max_retries: usize,
    retry_delay: Duration,
    mode: ResponseMode,
    concurrency: usize,
}

impl EnrichmentConfig {
    /// Defaults for `mode`, labelled with `model`.
    pub fn new(model: impl Into<String>, mode: ResponseMode) -> Self {
        Self {
            model: model.into(),
            system_prompt: mode.default_prompt().to_string(),
            batch_size: match mode {
                ResponseMode::Lemmatize => DEFAULT_DEDUPE_BATCH_SIZE,
                ResponseMode::Analyze => DEFAULT_BATCH_SIZE,
            },
            delay: Duration::from_millis(500),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            mode,
            concurrency: 1,
        }
    }

    /// Overrides the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Overrides the maximum items per batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Overrides the pause between batch dispatches.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Overrides how many times a failed batch is retried.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Overrides the pause between attempts of one batch.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Overrides the number of batches allowed in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Model identifier stamped on records.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// System prompt sent with every batch.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Maximum items per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Minimum spacing between batch dispatches.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Retries after the first attempt.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Pause between attempts of one batch.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Expected response shape.
    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    /// Batches allowed in flight at once.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Rejects configurations no batch could run under.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Configuration("batch size must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(Error::Configuration("concurrency must be at least 1".into()));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Configuration("missing model identifier".into()));
        }
        if self.system_prompt.trim().is_empty() {
            return Err(Error::Configuration("system prompt is empty".into()));
        }
        Ok(())
    }
}
