//! Retrieval module - hybrid ranking with BM25, RRF fusion and multi-query dedup
//!
//! Public interface:
//! - `SearchEngine` for the full cached, multi-variant pipeline
//! - `bm25`, `fusion`, `dedup`, `expansion` for the individual stages
//! - `Document` and the candidate types flowing between stages
//! - collaborator traits the serving layer implements
//!
//! Every ranking function is pure and synchronous; only `SearchEngine`
//! touches shared state (the caches) or collaborators.

pub mod bm25;
mod candidate;
mod collaborators;
pub mod dedup;
mod engine;
pub mod expansion;
pub mod fusion;
mod normalize;

pub use bm25::{Bm25Params, CorpusStats, TermFrequencies, TermIdf};
pub use candidate::{
    BookPage, Candidate, Document, KeywordCandidate, MatchType, SemanticCandidate, Tradition,
    Verse,
};
pub use collaborators::{CorpusStatistics, Embedder, KeywordSearch, QueryExpander, VectorSearch};
pub use dedup::{deduplicate, RankedList};
pub use engine::{RetrievalConfig, SearchEngine, Sources};
pub use expansion::{ExpandedQuery, QueryVariant};
pub use fusion::{merge, FusionParams};
pub use normalize::{normalize, DEFAULT_NORMALIZATION_K};
