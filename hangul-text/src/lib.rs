//! Hangul text cleanup, sentence segmentation and grammar pattern matching.
//!
//! This crate holds the pure text passes that run before any tagging or
//! enrichment: stripping everything outside the Hangul script, splitting the
//! remainder into sentences, pulling candidate vocabulary runs, and tagging
//! sentences with the first grammar rule they match.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;

mod grammar;

pub use grammar::{GrammarError, GrammarExample, GrammarMatcher, DEFAULT_RULES};

/// Minimum number of characters a Hangul run needs to count as a word.
pub const MIN_WORD_CHARS: usize = 2;

const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?'];

fn disallowed_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[^\s가-힣.,?!:;()"]"#).expect("valid cleanup pattern"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

fn sentence_breaks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s+").expect("valid sentence pattern"))
}

fn hangul_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[가-힣]+").expect("valid hangul pattern"))
}

/// Replaces everything outside Hangul syllables, basic punctuation and
/// whitespace with a space, then collapses whitespace runs.
///
/// ```
/// assert_eq!(hangul_text::clean_text("2024년 Seoul  여행!"), "년 여행!");
/// ```
pub fn clean_text(text: &str) -> String {
    let stripped = disallowed_chars().replace_all(text, " ");
    let collapsed = whitespace_runs().replace_all(&stripped, " ");
    collapsed.trim().to_string()
}

/// Splits text on sentence-final punctuation followed by whitespace.
///
/// Every returned sentence is trimmed and ends with exactly one period.
pub fn split_sentences(text: &str) -> Vec<String> {
    sentence_breaks()
        .split(text)
        .filter_map(|segment| {
            let body = segment.trim().trim_end_matches(SENTENCE_TERMINATORS).trim_end();
            if body.is_empty() {
                None
            } else {
                Some(format!("{body}."))
            }
        })
        .collect()
}

/// Extracts Hangul runs of at least [`MIN_WORD_CHARS`] characters from each
/// whitespace-delimited chunk, in reading order.
pub fn hangul_runs(text: &str) -> Vec<String> {
    let cleaned = clean_text(text);
    let mut runs = Vec::new();
    for chunk in cleaned.split_whitespace() {
        for found in hangul_run().find_iter(chunk) {
            if found.as_str().chars().count() >= MIN_WORD_CHARS {
                runs.push(found.as_str().to_string());
            }
        }
    }
    runs
}

/// Summary of a single text pass, as printed by the `hangul_text` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextReport {
    /// Number of sentences found after cleanup.
    pub sentences: usize,
    /// Distinct Hangul runs, sorted.
    pub vocabulary: Vec<String>,
    /// Grammar examples in sentence order.
    pub examples: Vec<GrammarExample>,
}

/// Runs cleanup, segmentation, run extraction and grammar matching over `text`.
pub fn analyze(text: &str, matcher: &GrammarMatcher) -> TextReport {
    let cleaned = clean_text(text);
    let sentences = split_sentences(&cleaned);
    let vocabulary: BTreeSet<String> = hangul_runs(&cleaned).into_iter().collect();
    let examples = matcher.extract_sentences(&sentences);
    TextReport {
        sentences: sentences.len(),
        vocabulary: vocabulary.into_iter().collect(),
        examples,
    }
}
