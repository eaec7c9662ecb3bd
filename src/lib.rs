#![warn(missing_docs)]
//! Core library entry points for wordsift: Korean vocabulary deduplication
//! and rate-limited enrichment.

pub mod cluster;
pub mod config;
pub mod controls;
pub mod dispatcher;
pub mod enricher;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod records;
pub mod response;
pub mod tagger;

pub use cluster::{Cluster, ClusterBuilder, Clusters, Token, VocabularyItem, MIN_TOKEN_CHARS};
pub use config::{EnrichmentConfig, ResponseMode};
pub use controls::EnrichmentArgs;
pub use dispatcher::{
    BatchDispatcher, BatchResult, BatchState, BatchSummary, DispatchReport, Pacer,
};
pub use enricher::{Enricher, OpenAiEnricher};
pub use error::{Error, Result};
pub use hangul_text::{GrammarExample, GrammarMatcher};
pub use normalizer::{normalizer_for, LemmaNormalizer, Normalizer, SuffixNormalizer};
pub use pipeline::{extract_tokens, Extraction, Pipeline};
pub use records::{EnrichmentRecord, UNENRICHED_MODEL};
pub use response::{AnalysisEntry, ParsedResponse, ResponseValidator};
pub use tagger::{PosTag, TaggedToken, Tagger, TaggingUnavailable};
