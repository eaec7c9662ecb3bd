//! Groups surface tokens by canonical key and picks one representative each.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::normalizer::Normalizer;
use crate::tagger::PosTag;

/// Tokens shorter than this many characters are dropped before normalization.
pub const MIN_TOKEN_CHARS: usize = 2;

/// A surface string pulled from source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Raw surface form.
    pub raw: String,
    /// Grammatical class, when a tagger produced the token.
    pub tag: Option<PosTag>,
}

impl Token {
    /// Untagged token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            tag: None,
        }
    }

    /// Token with a known grammatical class.
    pub fn tagged(raw: impl Into<String>, tag: PosTag) -> Self {
        Self {
            raw: raw.into(),
            tag: Some(tag),
        }
    }

    /// Non-blank, contains a letter, and not tagged as a particle or ending.
    fn is_textual(&self) -> bool {
        let raw = self.raw.trim();
        !raw.is_empty()
            && raw.chars().any(char::is_alphabetic)
            && self.tag.as_ref().map_or(true, PosTag::is_content)
    }
}

impl From<&str> for Token {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Token {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

/// Surface forms sharing one canonical key, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    key: String,
    members: Vec<String>,
}

impl Cluster {
    fn new(key: String, first: String) -> Self {
        Self {
            key,
            members: vec![first],
        }
    }

    fn insert(&mut self, member: String) {
        if !self.members.contains(&member) {
            self.members.push(member);
        }
    }

    /// Canonical key shared by every member.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Distinct members in first-seen order. Never empty.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Shortest member by character count; the first one seen wins ties.
    pub fn representative(&self) -> &str {
        self.members
            .iter()
            .min_by_key(|member| member.chars().count())
            .map(String::as_str)
            .unwrap_or(self.key.as_str())
    }
}

/// A cluster's representative, the unit handed to enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VocabularyItem {
    /// Representative surface form.
    pub text: String,
    /// Canonical key of the cluster it represents.
    pub key: String,
    /// Number of distinct surface forms folded into this item.
    pub variants: usize,
}

/// Clusters keyed by canonical key, in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clusters {
    by_key: BTreeMap<String, Cluster>,
}

impl Clusters {
    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// True when no token survived filtering.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Looks up the cluster for a canonical key.
    pub fn get(&self, key: &str) -> Option<&Cluster> {
        self.by_key.get(key)
    }

    /// Iterates clusters in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.by_key.values()
    }

    /// One item per cluster, sorted by representative text.
    pub fn representatives(&self) -> Vec<VocabularyItem> {
        let mut items: Vec<VocabularyItem> = self
            .by_key
            .values()
            .map(|cluster| VocabularyItem {
                text: cluster.representative().to_string(),
                key: cluster.key.clone(),
                variants: cluster.members.len(),
            })
            .collect();
        items.sort_by(|a, b| a.text.cmp(&b.text).then_with(|| a.key.cmp(&b.key)));
        items
    }
}

/// Normalizes and clusters tokens.
pub struct ClusterBuilder<'n> {
    normalizer: &'n dyn Normalizer,
}

impl<'n> ClusterBuilder<'n> {
    /// Builder using `normalizer` to derive keys.
    pub fn new(normalizer: &'n dyn Normalizer) -> Self {
        Self { normalizer }
    }

    /// Groups `tokens` by canonical key. Clusters are created lazily on their
    /// first valid member, so none is ever empty.
    pub fn cluster<I, T>(&self, tokens: I) -> Clusters
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        let mut clusters = Clusters::default();
        for token in tokens {
            let token = token.into();
            if !token.is_textual() {
                continue;
            }
            let surface = token.raw.trim().to_string();
            if surface.chars().count() < MIN_TOKEN_CHARS {
                continue;
            }
            let key = self.normalizer.normalize(&surface);
            if key.trim().is_empty() {
                continue;
            }
            match clusters.by_key.get_mut(&key) {
                Some(cluster) => cluster.insert(surface),
                None => {
                    clusters
                        .by_key
                        .insert(key.clone(), Cluster::new(key, surface));
                }
            }
        }
        clusters
    }

    /// Deduplicated vocabulary: one representative per canonical key, sorted.
    pub fn build<I, T>(&self, tokens: I) -> Vec<VocabularyItem>
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        self.cluster(tokens).representatives()
    }
}
