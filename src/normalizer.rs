//! Canonical-key derivation for inflected Korean surface forms.

use std::sync::Arc;

use tracing::debug;

use crate::tagger::{Tagger, TaggingUnavailable};

/// Particles and endings stripped by the fallback normalizer.
///
/// Order does not matter here; [`SuffixNormalizer`] sorts longest first.
pub const DEFAULT_SUFFIXES: &[&str] = &[
    "으로", "에서", "에게", "부터", "까지", "처럼", "마다", "보다", "이나", "이랑", "과", "와",
    "은", "는", "이", "가", "을", "를", "에", "의", "도", "로", "나", "랑", "만",
];

/// Derives the canonical key used to group surface variants.
///
/// Implementations never fail: whatever goes wrong internally, the caller
/// still receives a key (at worst the token itself).
pub trait Normalizer: Send + Sync {
    /// Canonical key for `token`.
    fn normalize(&self, token: &str) -> String;

    /// Short label describing the strategy, recorded as the model of
    /// unenriched output.
    fn label(&self) -> &'static str;
}

/// Pattern-stripping fallback: removes the longest matching particle/ending.
#[derive(Debug, Clone)]
pub struct SuffixNormalizer {
    suffixes: Vec<String>,
}

impl SuffixNormalizer {
    /// Normalizer over [`DEFAULT_SUFFIXES`].
    pub fn new() -> Self {
        Self::with_suffixes(DEFAULT_SUFFIXES.iter().copied())
    }

    /// Normalizer over a custom suffix list.
    pub fn with_suffixes<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut suffixes: Vec<String> = suffixes
            .into_iter()
            .map(Into::into)
            .filter(|suffix| !suffix.is_empty())
            .collect();
        // stable: equal-length suffixes keep their declared order
        suffixes.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
        Self { suffixes }
    }

    /// Suffixes in the order they are tried.
    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }
}

impl Default for SuffixNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer for SuffixNormalizer {
    fn normalize(&self, token: &str) -> String {
        for suffix in &self.suffixes {
            if let Some(stem) = token.strip_suffix(suffix.as_str()) {
                if !stem.is_empty() {
                    return stem.to_string();
                }
            }
        }
        token.to_string()
    }

    fn label(&self) -> &'static str {
        "Regex Deduplication"
    }
}

/// Lemma-aware normalizer backed by a [`Tagger`], falling back to suffix
/// stripping whenever the tagger cannot answer.
pub struct LemmaNormalizer {
    tagger: Arc<dyn Tagger>,
    fallback: SuffixNormalizer,
}

impl LemmaNormalizer {
    /// Wraps `tagger` with the default suffix fallback.
    pub fn new(tagger: Arc<dyn Tagger>) -> Self {
        Self {
            tagger,
            fallback: SuffixNormalizer::new(),
        }
    }

    fn lemma(&self, token: &str) -> Result<String, TaggingUnavailable> {
        let normalized = self.tagger.normalize(token)?;
        let tagged = self.tagger.tag(token)?;
        let key = match tagged.first() {
            Some(first) if first.tag.is_predicate() => first.surface.clone(),
            _ => normalized,
        };
        if key.trim().is_empty() {
            return Err(TaggingUnavailable::new(format!(
                "tagger produced an empty key for {token:?}"
            )));
        }
        Ok(key)
    }
}

impl Normalizer for LemmaNormalizer {
    fn normalize(&self, token: &str) -> String {
        match self.lemma(token) {
            Ok(key) => key,
            Err(err) => {
                debug!(token, reason = err.reason(), "tagger fallback to suffix stripping");
                self.fallback.normalize(token)
            }
        }
    }

    fn label(&self) -> &'static str {
        "Tagger Normalization"
    }
}

/// Picks the normalizer once, based on whether a tagger is available.
pub fn normalizer_for(tagger: Option<Arc<dyn Tagger>>) -> Box<dyn Normalizer> {
    match tagger {
        Some(tagger) => Box::new(LemmaNormalizer::new(tagger)),
        None => Box::new(SuffixNormalizer::new()),
    }
}
