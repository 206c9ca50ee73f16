//! Interfaces to the external engines the ranking core consumes
//!
//! The core never computes vector similarity or index lookups itself. Each
//! upstream system implements one of these traits; the serving layer wires
//! concrete clients in. Failures surface as `anyhow::Error` and the engine
//! decides how to degrade.

use anyhow::Result;

use super::bm25::{CorpusStats, TermIdf};
use super::candidate::{KeywordCandidate, SemanticCandidate};
use super::expansion::ExpandedQuery;

/// Turns text into embedding vectors
pub trait Embedder: Send + Sync {
    /// Embed several texts, returning vectors in input order
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Proposes weighted reformulations of a user query
pub trait QueryExpander: Send + Sync {
    fn expand(&self, query: &str) -> Result<Vec<ExpandedQuery>>;
}

/// Vector-similarity search over one content type
pub trait VectorSearch<D>: Send + Sync {
    /// Ranked nearest neighbours of `embedding`, best first
    fn search(&self, embedding: &[f32], limit: usize) -> Result<Vec<SemanticCandidate<D>>>;
}

/// Full-text search over one content type
pub trait KeywordSearch<D>: Send + Sync {
    /// Ranked keyword matches for `query`, best first
    fn search(&self, query: &str, limit: usize) -> Result<Vec<KeywordCandidate<D>>>;
}

/// Corpus statistics, refreshed out-of-band
pub trait CorpusStatistics: Send + Sync {
    fn corpus_stats(&self) -> Result<CorpusStats>;

    /// IDF for each of `terms` against the current corpus
    fn term_idf(&self, terms: &[String]) -> Result<TermIdf>;
}
