//! Enrichment capability consumed by the dispatcher.

use std::sync::Arc;

use crate::error::{Error, Result};

pub mod openai;

pub use openai::OpenAiEnricher;

/// Sends one batch to an external analysis service.
///
/// Implementations return the raw response text; shape checking belongs to
/// [`crate::ResponseValidator`]. Transport problems map to [`Error::Transport`].
pub trait Enricher: Send + Sync {
    /// Submits `batch` under `system_prompt` and returns the raw reply.
    fn submit(&self, batch: &[String], system_prompt: &str) -> Result<String>;
}

impl<T: Enricher + ?Sized> Enricher for Arc<T> {
    fn submit(&self, batch: &[String], system_prompt: &str) -> Result<String> {
        (**self).submit(batch, system_prompt)
    }
}

impl<T: Enricher + ?Sized> Enricher for &T {
    fn submit(&self, batch: &[String], system_prompt: &str) -> Result<String> {
        (**self).submit(batch, system_prompt)
    }
}

/// Wire encoding of a batch: a JSON array of strings.
pub fn encode_batch(batch: &[String]) -> Result<String> {
    serde_json::to_string(batch)
        .map_err(|err| Error::Transport(format!("failed to encode batch: {err}")))
}
