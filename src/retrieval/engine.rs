//! SearchEngine - cached expansion and embedding, per-variant fusion, cross-variant dedup

use anyhow::{bail, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::{EmbeddingCache, ExpansionCache};

use super::bm25::{self, Bm25Params, CorpusStats};
use super::candidate::{Candidate, Document};
use super::collaborators::{CorpusStatistics, Embedder, KeywordSearch, QueryExpander, VectorSearch};
use super::dedup::{deduplicate, RankedList};
use super::expansion::{self, ExpandedQuery, QueryVariant};
use super::fusion::{self, FusionParams};

/// Retrieval configuration for SearchEngine
///
/// See `RankingConfig` for the TOML form.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub bm25: Bm25Params,
    pub fusion: FusionParams,
    /// Weight of the user's own query among the variants (default: 1.0)
    pub original_query_weight: f32,
    /// Upper bound on AI reformulations per query (default: 3)
    pub max_expansions: usize,
    /// Over-fetch multiplier for each channel (default: 2)
    pub fetch_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            bm25: Bm25Params::default(),
            fusion: FusionParams::default(),
            original_query_weight: 1.0,
            max_expansions: 3,
            fetch_multiplier: 2,
        }
    }
}

/// The per-content-type engines a search runs against
///
/// Any of them may be absent; the pipeline uses whatever channels exist.
pub struct Sources<'a, D> {
    pub vector: Option<&'a dyn VectorSearch<D>>,
    pub keyword: Option<&'a dyn KeywordSearch<D>>,
    pub stats: Option<&'a dyn CorpusStatistics>,
}

impl<D> Clone for Sources<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for Sources<'_, D> {}

/// Hybrid search over injected collaborators and shared caches
pub struct SearchEngine {
    config: RetrievalConfig,
    embeddings: Arc<EmbeddingCache>,
    expansions: Arc<ExpansionCache>,
    embedder: Option<Arc<dyn Embedder>>,
    expander: Option<Arc<dyn QueryExpander>>,
}

impl SearchEngine {
    /// Create an engine around process-wide caches
    pub fn new(
        config: RetrievalConfig,
        embeddings: Arc<EmbeddingCache>,
        expansions: Arc<ExpansionCache>,
    ) -> Self {
        Self {
            config,
            embeddings,
            expansions,
            embedder: None,
            expander: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Reformulations for `query`, served from the expansion cache when fresh
    ///
    /// Expansion failures are logged and yield no reformulations; failures
    /// are not cached.
    pub fn expand(&self, query: &str) -> Vec<ExpandedQuery> {
        if let Some(cached) = self.expansions.get(query) {
            return cached;
        }
        let expander = match &self.expander {
            Some(e) => e,
            None => return Vec::new(),
        };

        match expander.expand(query) {
            Ok(raw) => {
                let cleaned = expansion::sanitize(query, raw, self.config.max_expansions);
                tracing::debug!(count = cleaned.len(), "query expanded");
                self.expansions.set(query, cleaned.clone());
                cleaned
            }
            Err(e) => {
                tracing::warn!("Query expansion failed: {e:#}");
                Vec::new()
            }
        }
    }

    /// Query variants to run: the original first, then its expansions
    pub fn variants(&self, query: &str) -> Vec<QueryVariant> {
        let expansions = self.expand(query);
        expansion::variants(query, &expansions, self.config.original_query_weight)
    }

    /// Embedding for one text, cached
    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        match vectors.pop() {
            Some(v) => Ok(v),
            None => bail!("Embedder returned no vector"),
        }
    }

    /// Embeddings for `texts` in input order; only cache misses reach the embedder
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut cached = self.embeddings.get_batch(texts);

        let mut seen = HashSet::new();
        let misses: Vec<String> = texts
            .iter()
            .filter(|t| !cached.contains_key(t.as_str()) && seen.insert(t.as_str()))
            .cloned()
            .collect();

        if !misses.is_empty() {
            let embedder = match &self.embedder {
                Some(e) => e,
                None => bail!("No embedder configured for {} uncached texts", misses.len()),
            };
            let vectors = embedder.embed(&misses)?;
            if vectors.len() != misses.len() {
                bail!(
                    "Embedder returned {} vectors for {} texts",
                    vectors.len(),
                    misses.len()
                );
            }
            let fresh: Vec<(String, Vec<f32>)> = misses.into_iter().zip(vectors).collect();
            self.embeddings.set_batch(fresh.clone());
            cached.extend(fresh);
        }

        texts
            .iter()
            .map(|t| match cached.get(t) {
                Some(v) => Ok(v.clone()),
                None => bail!("Missing embedding for text"),
            })
            .collect()
    }

    /// Full hybrid search for one content type
    ///
    /// Collaborator failures degrade the result rather than fail it: a
    /// failed channel contributes nothing for the affected variant.
    pub fn search<D: Document>(
        &self,
        query: &str,
        sources: Sources<'_, D>,
        limit: usize,
    ) -> Vec<Candidate<D>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }

        let variants = self.variants(query);
        let fetch_limit = limit * self.config.fetch_multiplier.max(1);

        let embeddings = match sources.vector {
            Some(_) => {
                let texts: Vec<String> = variants.iter().map(|v| v.text.clone()).collect();
                match self.embed_batch(&texts) {
                    Ok(vectors) => Some(vectors),
                    Err(e) => {
                        tracing::warn!("Embedding failed, semantic channel skipped: {e:#}");
                        None
                    }
                }
            }
            None => None,
        };

        let corpus = sources.stats.and_then(|s| match s.corpus_stats() {
            Ok(stats) => Some((s, stats)),
            Err(e) => {
                tracing::warn!("Corpus stats unavailable, BM25 rerank skipped: {e:#}");
                None
            }
        });

        let lists: Vec<RankedList<D>> = variants
            .par_iter()
            .enumerate()
            .map(|(i, variant)| {
                let embedding = embeddings.as_ref().and_then(|e| e.get(i)).map(Vec::as_slice);
                let results = self.fuse_variant(variant, embedding, sources, corpus, fetch_limit);
                RankedList::new(results, variant.weight)
            })
            .collect();

        let merged = deduplicate(lists, self.config.fusion.rrf_k);
        fusion::top(merged, limit)
    }

    fn fuse_variant<D: Document>(
        &self,
        variant: &QueryVariant,
        embedding: Option<&[f32]>,
        sources: Sources<'_, D>,
        corpus: Option<(&dyn CorpusStatistics, CorpusStats)>,
        fetch_limit: usize,
    ) -> Vec<Candidate<D>> {
        let semantic = match (sources.vector, embedding) {
            (Some(vector), Some(embedding)) => vector
                .search(embedding, fetch_limit)
                .unwrap_or_else(|e| {
                    tracing::warn!("Vector search skipped for variant '{}': {e:#}", variant.text);
                    Vec::new()
                }),
            _ => Vec::new(),
        };

        let mut keyword = match sources.keyword {
            Some(engine) => engine.search(&variant.text, fetch_limit).unwrap_or_else(|e| {
                tracing::warn!("Keyword search skipped for variant '{}': {e:#}", variant.text);
                Vec::new()
            }),
            None => Vec::new(),
        };

        if let Some((stats_source, stats)) = corpus {
            if !keyword.is_empty() {
                let terms = bm25::query_terms(&variant.text);
                match stats_source.term_idf(&terms) {
                    Ok(idf_map) => {
                        keyword = bm25::rerank(
                            keyword,
                            &terms,
                            &stats,
                            &idf_map,
                            self.config.bm25,
                            |c| c.doc.plain_text(),
                        );
                    }
                    Err(e) => tracing::warn!("Term IDF unavailable, BM25 rerank skipped: {e:#}"),
                }
            }
        }

        tracing::debug!(
            variant = %variant.text,
            semantic = semantic.len(),
            keyword = keyword.len(),
            "variant retrieved"
        );

        fusion::merge(semantic, keyword, &self.config.fusion)
    }
}
