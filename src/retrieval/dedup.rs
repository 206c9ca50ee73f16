//! Weighted multi-query deduplication
//!
//! The original query and its AI-expanded reformulations are each searched
//! and fused independently. This stage folds those per-variant lists into
//! one ranking with weighted RRF:
//! score(d) = Σ weight_v / (k + rank_v(d) + 1), rank 0-based.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::candidate::{Candidate, Document};

/// One query variant's ranked results and its weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedList<D> {
    pub results: Vec<Candidate<D>>,
    pub weight: f32,
}

impl<D> RankedList<D> {
    pub fn new(results: Vec<Candidate<D>>, weight: f32) -> Self {
        Self { results, weight }
    }
}

/// Keep the larger of two optional scores; an undefined incoming value changes nothing
pub fn keep_larger(existing: &mut Option<f32>, incoming: Option<f32>) {
    if let Some(value) = incoming {
        match existing {
            Some(current) if *current >= value => {}
            _ => *existing = Some(value),
        }
    }
}

/// Keep the better (smaller) of two optional ranks
fn keep_best_rank(existing: &mut Option<usize>, incoming: Option<usize>) {
    if let Some(rank) = incoming {
        match existing {
            Some(current) if *current <= rank => {}
            _ => *existing = Some(rank),
        }
    }
}

/// Fold `incoming` into `existing`, both with the same canonical key
fn absorb_duplicate<D: Document>(existing: &mut Candidate<D>, incoming: &Candidate<D>) {
    keep_larger(&mut existing.semantic_score, incoming.semantic_score);
    keep_larger(&mut existing.keyword_score, incoming.keyword_score);
    keep_larger(&mut existing.ts_rank, incoming.ts_rank);
    keep_larger(&mut existing.bm25_score, incoming.bm25_score);

    keep_best_rank(&mut existing.semantic_rank, incoming.semantic_rank);
    keep_best_rank(&mut existing.keyword_rank, incoming.keyword_rank);

    existing.fused_score = existing.fused_score.max(incoming.fused_score);
    existing.rrf_score = existing.rrf_score.max(incoming.rrf_score);

    // A snippet that differs from the plain text carries real match highlighting
    if let Some(snippet) = &incoming.highlighted_snippet {
        if snippet.as_str() != incoming.doc.plain_text() {
            existing.highlighted_snippet = Some(snippet.clone());
        }
    }

    existing.doc.absorb(&incoming.doc);
}

/// Merge per-variant lists into one list ordered by `weighted_rrf_score`
///
/// Each list must already be in its own ranked order. The same routine
/// serves books, verses and traditions; only `Document::canonical_key`
/// differs.
pub fn deduplicate<D: Document>(variants: Vec<RankedList<D>>, k: f32) -> Vec<Candidate<D>> {
    let mut index: HashMap<D::Key, usize> = HashMap::new();
    let mut merged: Vec<Candidate<D>> = Vec::new();

    for variant in variants {
        for (rank, candidate) in variant.results.into_iter().enumerate() {
            let contribution = variant.weight / (k + rank as f32 + 1.0);
            let key = candidate.key();

            match index.get(&key) {
                Some(&pos) => {
                    let existing = &mut merged[pos];
                    existing.weighted_rrf_score += contribution;
                    absorb_duplicate(existing, &candidate);
                }
                None => {
                    let mut candidate = candidate;
                    candidate.weighted_rrf_score = contribution;
                    index.insert(key, merged.len());
                    merged.push(candidate);
                }
            }
        }
    }

    merged.sort_by(|a, b| b.weighted_rrf_score.total_cmp(&a.weighted_rrf_score));
    merged
}
