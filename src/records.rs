//! Output records handed to exporters.

use serde::{Deserialize, Serialize};

/// Model label written on records that never went through enrichment.
pub const UNENRICHED_MODEL: &str = "none";

/// One exported row: an input item and what enrichment made of it.
///
/// Every item fed to the dispatcher yields exactly one record, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    /// Input item (vocabulary word or grammar prompt).
    pub item: String,
    /// Analysis text, or `"Error: <reason>"` on fallback.
    pub analysis: String,
    /// Model identifier that produced the analysis.
    pub model: String,
    /// True when the record is a fallback for a failed batch.
    pub error: bool,
}

impl EnrichmentRecord {
    /// Successful enrichment result.
    pub fn enriched(
        item: impl Into<String>,
        analysis: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            item: item.into(),
            analysis: analysis.into(),
            model: model.into(),
            error: false,
        }
    }

    /// Fallback for an item whose batch could not be enriched.
    pub fn failed(item: impl Into<String>, model: impl Into<String>, reason: &str) -> Self {
        Self {
            item: item.into(),
            analysis: format!("Error: {reason}"),
            model: model.into(),
            error: true,
        }
    }

    /// Item passed through without enrichment.
    pub fn unenriched(item: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            analysis: String::new(),
            model: model.into(),
            error: false,
        }
    }
}
