//! Lexicon Extractor - Entity normalization engine
//!
//! Turns raw backend spans into clean, title-aware entities:
//! - [`merge::SpanMerger`] merges BIO spans into candidates
//! - [`normalizer::TitleNormalizer`] strips, retains or splits leading titles
//! - [`confidence::ConfidenceAggregator`] produces entity confidence
//! - [`pipeline::EntityPipeline`] wires the three together
//!
//! Two [`lexicon_core::TaggingBackend`] implementations live here as well:
//! the dictionary-driven [`gazetteer::GazetteerTagger`] and the remote
//! [`http::HttpTaggingBackend`].

use lexicon_core::EntityType;

pub mod confidence;
pub mod gazetteer;
pub mod http;
pub mod merge;
pub mod normalizer;
pub mod pipeline;
pub mod titles;
pub mod tokens;

pub use confidence::ConfidenceAggregator;
pub use gazetteer::GazetteerTagger;
pub use http::HttpTaggingBackend;
pub use merge::SpanMerger;
pub use normalizer::TitleNormalizer;
pub use pipeline::EntityPipeline;
pub use titles::{TitleCategory, TitleRule, TitleRuleError, TitleRuleTable};

/// Intermediate entity between merging and final confidence aggregation
///
/// Keeps the constituent token scores so the aggregator can average them
/// after normalization has moved the boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub entity_type: EntityType,
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
    /// Scores of the backend spans that make up the entity
    pub scores: Vec<f32>,
    /// Set once the entity's own tokens were dropped or split off
    pub penalized: bool,
}

impl Candidate {
    pub fn new(entity_type: EntityType, start: usize, end: usize, score: f32) -> Self {
        Self {
            entity_type,
            start,
            end,
            scores: vec![score],
            penalized: false,
        }
    }

    /// Slice of `source` covered by the candidate
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}
