//! Map unbounded BM25 scores into [0, 1)

/// Default half-saturation point: a BM25 score of 5 normalises to 0.5
pub const DEFAULT_NORMALIZATION_K: f32 = 5.0;

/// `score / (score + k)` for positive scores, 0 otherwise
///
/// Strictly increasing on positive input and approaches 1 as the score
/// grows, which makes a BM25 score comparable with a cosine similarity.
pub fn normalize(score: f32, k: f32) -> f32 {
    if score <= 0.0 {
        return 0.0;
    }
    score / (score + k)
}
