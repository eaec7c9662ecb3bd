//! Error taxonomy shared by the normalization and enrichment stages.

use thiserror::Error;

use crate::tagger::TaggingUnavailable;

/// Convenience alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by the library.
///
/// Only [`Error::Configuration`] and [`Error::Grammar`] abort a run; every other
/// variant is recovered from inside the pipeline and ends up either in a retry
/// or as an error-flagged record.
#[derive(Debug, Error)]
pub enum Error {
    /// The tagging capability is missing or failed for this input.
    #[error(transparent)]
    TaggingUnavailable(#[from] TaggingUnavailable),

    /// The enrichment response could not be decoded into the expected shape.
    #[error("malformed enrichment response: {reason}")]
    MalformedResponse {
        /// What was wrong with the payload.
        reason: String,
    },

    /// Network, timeout or HTTP-level failure talking to the enrichment service.
    #[error("enrichment transport error: {0}")]
    Transport(String),

    /// A batch exhausted its attempts.
    #[error("enrichment failed after {attempts} attempt(s): {last_error}")]
    EnrichmentFailed {
        /// Attempts made, including the first.
        attempts: usize,
        /// Description of the final failure.
        last_error: String,
    },

    /// Missing or invalid configuration; raised before any batch work starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A custom grammar rule failed to compile.
    #[error(transparent)]
    Grammar(#[from] hangul_text::GrammarError),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
        }
    }

    /// Whether the dispatcher should try the batch again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::MalformedResponse { .. })
    }
}
