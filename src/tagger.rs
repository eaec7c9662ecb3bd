//! Tokenizer / part-of-speech tagging capability.
//!
//! No tagger ships with this crate: morphological analyzers live outside the
//! process. Callers that have one implement [`Tagger`] and hand it to the
//! normalizer and pipeline; everyone else gets the suffix-stripping fallback.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// Coarse grammatical class reported by a tagger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum PosTag {
    /// Common, proper and bound nouns, pronouns, numerals.
    Noun,
    /// Verbs and auxiliary verbs.
    Verb,
    /// Adjectives and copulas.
    Adjective,
    /// Adverbs.
    Adverb,
    /// Case and auxiliary particles.
    Particle,
    /// Verbal endings.
    Ending,
    /// Anything else, with the tagger's raw label.
    Other(String),
}

impl PosTag {
    /// Maps a raw tag label onto a [`PosTag`].
    ///
    /// Understands both word-style labels (`Noun`, `Verb`, `Adjective`, `Josa`)
    /// and Sejong-style codes (`NNG`, `VV`, `VA`, `JKS`, `EF`, ...).
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw {
            "Noun" => Self::Noun,
            "Verb" => Self::Verb,
            "Adjective" => Self::Adjective,
            "Adverb" => Self::Adverb,
            "Josa" => Self::Particle,
            "Eomi" | "PreEomi" => Self::Ending,
            _ if raw.starts_with("VA") || raw.starts_with("VC") => Self::Adjective,
            _ if raw.starts_with('V') && raw.len() <= 3 => Self::Verb,
            _ if raw.starts_with('N') && raw.len() <= 3 => Self::Noun,
            _ if raw.starts_with("MA") => Self::Adverb,
            _ if raw.starts_with('J') && raw.len() <= 3 => Self::Particle,
            _ if raw.starts_with('E') && raw.len() <= 3 => Self::Ending,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// Verb or adjective: classes whose lemma is the canonical form.
    pub fn is_predicate(&self) -> bool {
        matches!(self, Self::Verb | Self::Adjective)
    }

    /// Classes worth keeping as vocabulary.
    pub fn is_content(&self) -> bool {
        matches!(self, Self::Noun | Self::Verb | Self::Adjective | Self::Adverb)
    }
}

impl From<&str> for PosTag {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for PosTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Noun => f.write_str("Noun"),
            Self::Verb => f.write_str("Verb"),
            Self::Adjective => f.write_str("Adjective"),
            Self::Adverb => f.write_str("Adverb"),
            Self::Particle => f.write_str("Particle"),
            Self::Ending => f.write_str("Ending"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// One `(surface, tag)` pair produced by a tagger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedToken {
    /// Surface (or stemmed) form as reported by the tagger.
    pub surface: String,
    /// Grammatical class.
    pub tag: PosTag,
}

impl TaggedToken {
    /// Builds a tagged token from a [`PosTag`] or a raw tagger label.
    pub fn new(surface: impl Into<String>, tag: impl Into<PosTag>) -> Self {
        Self {
            surface: surface.into(),
            tag: tag.into(),
        }
    }
}

/// The tagging capability is missing or failed for a given input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tagging unavailable: {reason}")]
pub struct TaggingUnavailable {
    reason: String,
}

impl TaggingUnavailable {
    /// Creates the error with a human-readable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The failure reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Maps text onto tagged tokens and lemmas.
pub trait Tagger: Send + Sync {
    /// Tags `text`, returning `(surface, tag)` pairs in reading order.
    fn tag(&self, text: &str) -> Result<Vec<TaggedToken>, TaggingUnavailable>;

    /// Returns the tagger's generic normalized form of a single word.
    fn normalize(&self, word: &str) -> Result<String, TaggingUnavailable> {
        Ok(word.to_string())
    }
}

impl<T: Tagger + ?Sized> Tagger for Arc<T> {
    fn tag(&self, text: &str) -> Result<Vec<TaggedToken>, TaggingUnavailable> {
        (**self).tag(text)
    }

    fn normalize(&self, word: &str) -> Result<String, TaggingUnavailable> {
        (**self).normalize(word)
    }
}
