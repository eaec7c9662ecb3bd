//! Ordered grammar rules with first-match-wins sentence tagging.

use crate::{clean_text, split_sentences};
use regex::Regex;
use serde::Serialize;
use std::error::Error;
use std::fmt;

/// Intermediate-level (TOPIK 3-4) grammar patterns, in priority order.
pub const DEFAULT_RULES: &[&str] = &[
    r"(은|는|을|를) 것 같다",
    r"(으)?ㄹ 수 있다",
    r"(으)?ㄹ 것이다",
    r"(아|어|여) 보다",
    r"(아|어|여) 주다",
    r"기 때문에",
    r"(으)?려고 하다",
    r"(으)?면 안 되다",
    r"(으)?면서",
    r"(아|어|여)도 되다",
    r"(아|어|여)야 하다",
    r"(으)?ㄴ 적이 있다",
    r"(으)?ㄹ 때",
    r"(으)?니까",
    r"(으)?ㄴ/는데",
    r"지만",
    r"아/어/여서",
    r"(으)?ㄹ까요",
    r"(으)?ㄹ래요",
    r"(는)군요",
    r"거든요",
    r"(으)ㄹ게요",
    r"(아|어|여)야겠다",
    r"(아|어|여)도",
    r"(으)?ㄹ까 하다",
    r"(으)?면 좋겠다",
    r"(으)?려면",
    r"(으)?ㄴ/는 것 같다",
    r"(으)?ㄴ 덕분에",
    r"(으)?ㄹ 텐데",
];

/// A sentence paired with the grammar rule it illustrates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrammarExample {
    /// Index of the matching rule in the matcher's rule order.
    pub rule: usize,
    /// Source pattern of the matching rule.
    pub pattern: String,
    /// The sentence, period-terminated.
    pub sentence: String,
}

impl GrammarExample {
    /// Renders the example as a single enrichment item.
    pub fn prompt_item(&self) -> String {
        format!("문법: {}\n예문: {}", self.pattern, self.sentence)
    }
}

/// Raised when a custom rule does not compile.
#[derive(Debug)]
pub struct GrammarError {
    pattern: String,
    source: regex::Error,
}

impl GrammarError {
    /// The rule text that failed to compile.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grammar rule `{}` does not compile: {}", self.pattern, self.source)
    }
}

impl Error for GrammarError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: String,
    regex: Regex,
}

/// Stateless matcher over a fixed, ordered rule list.
///
/// Rules compile once at construction; the matcher can be shared and reused
/// across any number of texts.
#[derive(Debug, Clone)]
pub struct GrammarMatcher {
    rules: Vec<CompiledRule>,
}

impl GrammarMatcher {
    /// Compiles `patterns` in the given order.
    pub fn new<I, S>(patterns: I) -> Result<Self, GrammarError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rules = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.into();
                match Regex::new(&pattern) {
                    Ok(regex) => Ok(CompiledRule { pattern, regex }),
                    Err(source) => Err(GrammarError { pattern, source }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Matcher over [`DEFAULT_RULES`].
    pub fn with_default_rules() -> Self {
        Self::new(DEFAULT_RULES.iter().copied()).expect("default grammar rules compile")
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when the matcher has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule patterns in priority order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.pattern.as_str())
    }

    /// Returns the index and pattern of the first rule matching `sentence`.
    pub fn first_match(&self, sentence: &str) -> Option<(usize, &str)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.regex.is_match(sentence))
            .map(|(idx, rule)| (idx, rule.pattern.as_str()))
    }

    /// Cleans and segments `text`, then tags each sentence with its first
    /// matching rule. Sentences matching no rule are skipped.
    pub fn extract(&self, text: &str) -> Vec<GrammarExample> {
        let sentences = split_sentences(&clean_text(text));
        self.extract_sentences(&sentences)
    }

    /// Tags already-segmented sentences.
    pub fn extract_sentences<S: AsRef<str>>(&self, sentences: &[S]) -> Vec<GrammarExample> {
        sentences
            .iter()
            .filter_map(|sentence| {
                let sentence = sentence.as_ref();
                self.first_match(sentence).map(|(rule, pattern)| GrammarExample {
                    rule,
                    pattern: pattern.to_string(),
                    sentence: sentence.to_string(),
                })
            })
            .collect()
    }
}

impl Default for GrammarMatcher {
    fn default() -> Self {
        Self::with_default_rules()
    }
}
