//! Hybrid retrieval ranking for multilingual religious-text search
//!
//! Scores and merges the ranked lists produced by external vector and
//! full-text engines: BM25 rescoring, semantic/keyword fusion, weighted
//! multi-query deduplication, and the shared caches in front of embedding
//! and query-expansion calls.

pub mod cache;
pub mod config;
pub mod retrieval;

// Re-export commonly used types
pub use cache::{EmbeddingCache, ExpansionCache};
pub use config::RankingConfig;
pub use retrieval::{Candidate, Document, SearchEngine};
