//! Page text to canonical vocabulary and grammar examples.

use std::sync::Arc;

use hangul_text::{clean_text, hangul_runs, GrammarExample, GrammarMatcher};
use tracing::{debug, info};

use crate::cluster::{ClusterBuilder, Clusters, Token, VocabularyItem};
use crate::normalizer::{normalizer_for, Normalizer};
use crate::tagger::Tagger;

/// Pulls candidate vocabulary tokens out of raw page text.
///
/// With a tagger, keeps content words longer than one character; without one
/// (or when tagging fails) falls back to Hangul runs.
pub fn extract_tokens(text: &str, tagger: Option<&dyn Tagger>) -> Vec<Token> {
    let cleaned = clean_text(text);
    if let Some(tagger) = tagger {
        match tagger.tag(&cleaned) {
            Ok(tagged) => {
                return tagged
                    .into_iter()
                    .filter(|token| token.tag.is_content() && token.surface.chars().count() > 1)
                    .map(|token| Token::tagged(token.surface, token.tag))
                    .collect();
            }
            Err(err) => debug!(reason = err.reason(), "tagging failed; using hangul runs"),
        }
    }
    hangul_runs(&cleaned).into_iter().map(Token::new).collect()
}

/// Output of one extraction pass over a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Deduplicated vocabulary across all pages, sorted.
    pub vocabulary: Vec<VocabularyItem>,
    /// Grammar examples in page order.
    pub grammar: Vec<GrammarExample>,
}

/// Tokenizer, normalizer and grammar matcher wired together.
pub struct Pipeline {
    tagger: Option<Arc<dyn Tagger>>,
    normalizer: Box<dyn Normalizer>,
    grammar: GrammarMatcher,
}

impl Pipeline {
    /// Pipeline with the default grammar rules; the normalizer is picked once
    /// from `tagger`.
    pub fn new(tagger: Option<Arc<dyn Tagger>>) -> Self {
        Self {
            normalizer: normalizer_for(tagger.clone()),
            tagger,
            grammar: GrammarMatcher::with_default_rules(),
        }
    }

    /// Replaces the grammar rule set.
    pub fn with_grammar(mut self, grammar: GrammarMatcher) -> Self {
        self.grammar = grammar;
        self
    }

    /// Active normalizer.
    pub fn normalizer(&self) -> &dyn Normalizer {
        self.normalizer.as_ref()
    }

    /// Label of the active normalizer.
    pub fn normalizer_label(&self) -> &'static str {
        self.normalizer.label()
    }

    /// Clusters arbitrary tokens with the active normalizer.
    pub fn cluster<I, T>(&self, tokens: I) -> Clusters
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        ClusterBuilder::new(self.normalizer.as_ref()).cluster(tokens)
    }

    /// Extracts vocabulary (clustered once across every page) and grammar
    /// examples (concatenated in page order).
    pub fn extract_pages<S: AsRef<str>>(&self, pages: &[S]) -> Extraction {
        let mut tokens = Vec::new();
        let mut grammar = Vec::new();
        for (idx, page) in pages.iter().enumerate() {
            let page = page.as_ref();
            let page_tokens = extract_tokens(page, self.tagger.as_deref());
            let page_grammar = self.grammar.extract(page);
            debug!(
                page = idx + 1,
                tokens = page_tokens.len(),
                grammar = page_grammar.len(),
                "page extracted"
            );
            tokens.extend(page_tokens);
            grammar.extend(page_grammar);
        }
        let vocabulary = self.cluster(tokens).representatives();
        info!(
            pages = pages.len(),
            vocabulary = vocabulary.len(),
            grammar = grammar.len(),
            normalizer = self.normalizer_label(),
            "extraction complete"
        );
        Extraction {
            vocabulary,
            grammar,
        }
    }
}
