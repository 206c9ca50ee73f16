//! Hybrid fusion of the semantic and keyword channels
//!
//! Each merged record gets a `fused_score` (weighted blend of similarity and
//! normalised BM25) and an `rrf_score` (Reciprocal Rank Fusion over the
//! channel ranks). Ordering is by fused score, with RRF breaking near-ties.
//! k=60 is the standard RRF value from Cormack et al., 2009.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::candidate::{Candidate, Document, KeywordCandidate, SemanticCandidate};
use super::normalize::{normalize, DEFAULT_NORMALIZATION_K};

/// Fusion constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionParams {
    /// RRF decay constant; smaller values favour top ranks more sharply
    pub rrf_k: f32,
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    /// Half-saturation point for BM25 normalisation
    pub normalization_k: f32,
    /// Fused scores closer than this are ordered by RRF instead
    pub tie_epsilon: f32,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            semantic_weight: 0.5,
            keyword_weight: 0.5,
            normalization_k: DEFAULT_NORMALIZATION_K,
            tie_epsilon: 0.001,
        }
    }
}

/// Combine the two channel scores of one record
///
/// - both channels: weighted blend of similarity and normalised BM25
/// - semantic only: the raw similarity, already bounded
/// - keyword only: normalised BM25, falling back to the engine score
pub fn fused_score(
    has_semantic: bool,
    has_keyword: bool,
    semantic_score: Option<f32>,
    bm25_score: Option<f32>,
    keyword_score: Option<f32>,
    params: &FusionParams,
) -> f32 {
    match (has_semantic, has_keyword) {
        (true, true) => {
            params.semantic_weight * semantic_score.unwrap_or(0.0)
                + params.keyword_weight
                    * normalize(bm25_score.unwrap_or(0.0), params.normalization_k)
        }
        (true, false) => semantic_score.unwrap_or(0.0),
        (false, true) => normalize(
            bm25_score.or(keyword_score).unwrap_or(0.0),
            params.normalization_k,
        ),
        (false, false) => 0.0,
    }
}

/// Reciprocal Rank Fusion: Σ 1/(k + rank) over the ranks that are present
pub fn rrf_score(ranks: &[Option<usize>], k: f32) -> f32 {
    ranks
        .iter()
        .flatten()
        .map(|&rank| 1.0 / (k + rank as f32))
        .sum()
}

/// Merge one query's semantic and keyword lists into fused records
///
/// Records are keyed by canonical key: a keyword hit for a document already
/// seen semantically gets its keyword fields attached to that record, so no
/// key ever appears twice and no semantic field is lost.
pub fn merge<D: Document>(
    semantic: Vec<SemanticCandidate<D>>,
    keyword: Vec<KeywordCandidate<D>>,
    params: &FusionParams,
) -> Vec<Candidate<D>> {
    let mut index: HashMap<D::Key, usize> = HashMap::new();
    let mut merged: Vec<Candidate<D>> = Vec::with_capacity(semantic.len() + keyword.len());

    for item in semantic {
        let key = item.doc.canonical_key();
        match index.get(&key) {
            // Duplicate within the semantic list: first (best-ranked) wins
            Some(_) => continue,
            None => {
                index.insert(key, merged.len());
                merged.push(Candidate::from_semantic(item));
            }
        }
    }

    for item in keyword {
        let key = item.doc.canonical_key();
        match index.get(&key) {
            Some(&pos) => {
                if merged[pos].keyword_rank.is_none() {
                    merged[pos].attach_keyword(item);
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(Candidate::from_keyword(item));
            }
        }
    }

    for candidate in merged.iter_mut() {
        score_candidate(candidate, params);
    }

    sort_fused(&mut merged, params.tie_epsilon);
    merged
}

fn score_candidate<D: Document>(candidate: &mut Candidate<D>, params: &FusionParams) {
    candidate.fused_score = fused_score(
        candidate.semantic_rank.is_some(),
        candidate.keyword_rank.is_some(),
        candidate.semantic_score,
        candidate.bm25_score,
        candidate.keyword_score,
        params,
    );
    candidate.rrf_score = rrf_score(
        &[candidate.semantic_rank, candidate.keyword_rank],
        params.rrf_k,
    );
}

/// Whether `a` ranks ahead of `b`
fn ranks_before<D>(a: &Candidate<D>, b: &Candidate<D>, tie_epsilon: f32) -> bool {
    if (a.fused_score - b.fused_score).abs() <= tie_epsilon {
        a.rrf_score > b.rrf_score
    } else {
        a.fused_score > b.fused_score
    }
}

/// Sort by fused score descending, RRF descending within `tie_epsilon`
///
/// The tolerance comparison is not transitive, which `slice::sort_by` may
/// reject at runtime, so this is a stable insertion sort: quadratic in the
/// list length. Lists are sized `limit * fetch_multiplier` per channel, which
/// assumes callers keep `limit` in the low hundreds.
pub fn sort_fused<D>(candidates: &mut [Candidate<D>], tie_epsilon: f32) {
    for i in 1..candidates.len() {
        let mut j = i;
        while j > 0 && ranks_before(&candidates[j], &candidates[j - 1], tie_epsilon) {
            candidates.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Keep the first `limit` records
pub fn top<D>(mut candidates: Vec<Candidate<D>>, limit: usize) -> Vec<Candidate<D>> {
    candidates.truncate(limit);
    candidates
}
