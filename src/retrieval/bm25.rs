//! BM25 scoring over candidates handed back by the keyword engine
//!
//! The keyword engine does the inverted-index lookup; this module only
//! re-scores the passages it returns so their relevance is comparable with
//! the semantic channel. Corpus statistics and IDF values are supplied by
//! the caller and never estimated here.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::candidate::KeywordCandidate;

/// Per-term occurrence counts for one document
pub type TermFrequencies = HashMap<String, u32>;

/// Snapshot of the corpus a BM25 computation is scored against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub total_documents: u64,
    pub avg_document_length: f32,
}

/// BM25 saturation and length-normalisation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Precomputed IDF per query term, scoped to one query execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermIdf(HashMap<String, f32>);

impl TermIdf {
    pub fn new(values: HashMap<String, f32>) -> Self {
        Self(values)
    }

    /// Build from document frequencies using the smoothed IDF formula
    pub fn from_document_frequencies(dfs: &HashMap<String, u64>, stats: &CorpusStats) -> Self {
        Self(
            dfs.iter()
                .map(|(term, &df)| (term.clone(), idf(df, stats.total_documents)))
                .collect(),
        )
    }

    /// IDF for a term; 0 when the term is not part of this query
    pub fn get(&self, term: &str) -> f32 {
        self.0.get(term).copied().unwrap_or(0.0)
    }

    pub fn insert(&mut self, term: impl Into<String>, value: f32) {
        self.0.insert(term.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Robertson–Sparck-Jones IDF with +1 smoothing
///
/// `ln((N - df + 0.5) / (df + 0.5) + 1)`: non-increasing in `df`, and
/// non-negative whenever `0 < df <= N`.
pub fn idf(df: u64, total_documents: u64) -> f32 {
    let df = df as f32;
    let n = total_documents as f32;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Split a raw query into distinct whitespace-delimited terms, first occurrence wins
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in query.split_whitespace() {
        if !terms.iter().any(|t| t == token) {
            terms.push(token.to_string());
        }
    }
    terms
}

/// Count whole-word occurrences of each term in `text`
///
/// Word boundaries are whitespace or the ends of the string; generic `\b`
/// is unreliable for Arabic and other scripts without clear boundary
/// semantics. Matching is case-insensitive and non-overlapping.
pub fn count_terms(text: &str, terms: &[String]) -> TermFrequencies {
    terms
        .iter()
        .map(|term| (term.clone(), count_term(text, term)))
        .collect()
}

fn count_term(text: &str, term: &str) -> u32 {
    let term = term.trim();
    if term.is_empty() || text.is_empty() {
        return 0;
    }

    let pattern = match term_pattern(term) {
        Some(p) => p,
        None => return 0,
    };

    let mut count = 0;
    let mut pos = 0;
    while pos < text.len() {
        let m = match pattern.find_at(text, pos) {
            Some(m) => m,
            None => break,
        };

        let bounded_before = text[..m.start()]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        let bounded_after = text[m.end()..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace);

        if bounded_before && bounded_after {
            count += 1;
            pos = m.end();
        } else {
            // Retry one character later so a shorter valid match is not skipped
            pos = m.start()
                + text[m.start()..]
                    .chars()
                    .next()
                    .map_or(1, char::len_utf8);
        }
    }
    count
}

fn term_pattern(term: &str) -> Option<Regex> {
    RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Number of non-empty whitespace-delimited tokens
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// BM25 score of one document
///
/// Terms with an IDF of 0 (not in the query's IDF set) are skipped, so a
/// document matching none of the query terms scores exactly 0.
pub fn score(
    term_freqs: &TermFrequencies,
    doc_len: usize,
    idf_map: &TermIdf,
    avg_doc_len: f32,
    params: Bm25Params,
) -> f32 {
    // An empty corpus has no meaningful average; treat every document as average length
    let length_ratio = if avg_doc_len > 0.0 {
        doc_len as f32 / avg_doc_len
    } else {
        1.0
    };
    let norm = params.k1 * (1.0 - params.b + params.b * length_ratio);

    // Sorted so the float sum does not depend on hash order
    let mut terms: Vec<(&String, &u32)> = term_freqs.iter().collect();
    terms.sort_by(|a, b| a.0.cmp(b.0));

    let mut total = 0.0;
    for (term, &tf) in terms {
        let term_idf = idf_map.get(term);
        if term_idf == 0.0 || tf == 0 {
            continue;
        }
        let tf = tf as f32;
        total += term_idf * tf * (params.k1 + 1.0) / (tf + norm);
    }
    total
}

/// Recompute BM25 for every keyword candidate and sort descending
///
/// Sets `bm25_score` on each candidate. Ties keep no defined order here;
/// the fusion stage owns final ordering. `keyword_rank` is left as the
/// engine reported it.
pub fn rerank<D, F>(
    mut candidates: Vec<KeywordCandidate<D>>,
    terms: &[String],
    stats: &CorpusStats,
    idf_map: &TermIdf,
    params: Bm25Params,
    text_of: F,
) -> Vec<KeywordCandidate<D>>
where
    F: Fn(&KeywordCandidate<D>) -> &str,
{
    for candidate in candidates.iter_mut() {
        let text = text_of(candidate);
        let freqs = count_terms(text, terms);
        let doc_len = count_words(text);
        let bm25 = score(
            &freqs,
            doc_len,
            idf_map,
            stats.avg_document_length,
            params,
        );
        candidate.bm25_score = Some(bm25);
    }

    candidates.sort_by(|a, b| {
        let a = a.bm25_score.unwrap_or(0.0);
        let b = b.bm25_score.unwrap_or(0.0);
        b.total_cmp(&a)
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::candidate::{BookPage, Document};
    use approx::assert_relative_eq;

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_idf_non_increasing_in_df() {
        assert!(idf(1, 1000) > idf(100, 1000));
        assert!(idf(100, 1000) > idf(999, 1000));
        assert!(idf(1000, 1000) >= 0.0);
    }

    #[test]
    fn test_idf_closed_form() {
        let expected = ((1000.0f32 - 10.0 + 0.5) / (10.0 + 0.5) + 1.0).ln();
        assert_relative_eq!(idf(10, 1000), expected, epsilon = 1e-6);
        assert_relative_eq!(idf(500, 1000), 2.0f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_count_terms_whole_words_only() {
        let freqs = count_terms("the prayer and prayers of the prayer", &terms(&["prayer"]));
        assert_eq!(freqs["prayer"], 2);
    }

    #[test]
    fn test_count_terms_arabic() {
        let text = "الصلاة عماد الدين والصلاة نور الصلاة";
        let freqs = count_terms(text, &terms(&["الصلاة", "الدين", "الزكاة"]));
        assert_eq!(freqs["الصلاة"], 2);
        assert_eq!(freqs["الدين"], 1);
        assert_eq!(freqs["الزكاة"], 0);
    }

    #[test]
    fn test_count_terms_escapes_pattern_characters() {
        let freqs = count_terms("a (b) c.d (b)", &terms(&["(b)", "c.d", ".", "c"]));
        assert_eq!(freqs["(b)"], 2);
        assert_eq!(freqs["c.d"], 1);
        assert_eq!(freqs["."], 0);
        assert_eq!(freqs["c"], 0);
    }

    #[test]
    fn test_count_terms_case_insensitive_and_phrases() {
        let freqs = count_terms("Mercy and mercy xa a a", &terms(&["MERCY", "a a"]));
        assert_eq!(freqs["MERCY"], 2);
        assert_eq!(freqs["a a"], 1);
    }

    #[test]
    fn test_count_terms_empty_inputs() {
        let freqs = count_terms("", &terms(&["x"]));
        assert_eq!(freqs["x"], 0);

        let freqs = count_terms("some text", &terms(&["", "  "]));
        assert_eq!(freqs[""], 0);
        assert_eq!(freqs["  "], 0);

        assert!(count_terms("some text", &[]).is_empty());
    }

    #[test]
    fn test_count_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("   \t\n "), 0);
        assert_eq!(count_words("  one two\tthree\n"), 3);
    }

    #[test]
    fn test_query_terms_dedupes_in_order() {
        assert_eq!(
            query_terms("  patience  prayer patience "),
            terms(&["patience", "prayer"])
        );
        assert!(query_terms("   ").is_empty());
    }

    #[test]
    fn test_score_zero_without_query_terms() {
        let mut freqs = TermFrequencies::new();
        freqs.insert("other".to_string(), 4);
        let mut idf_map = TermIdf::default();
        idf_map.insert("query", 2.0);

        let s = score(&freqs, 30, &idf_map, 50.0, Bm25Params::default());
        assert_eq!(s, 0.0);
    }

    #[test]
    fn test_score_longer_document_scores_lower() {
        let mut freqs = TermFrequencies::new();
        freqs.insert("t".to_string(), 2);
        let mut idf_map = TermIdf::default();
        idf_map.insert("t", 1.2);

        let short = score(&freqs, 20, &idf_map, 50.0, Bm25Params::default());
        let long = score(&freqs, 200, &idf_map, 50.0, Bm25Params::default());
        assert!(short > long);
    }

    #[test]
    fn test_score_zero_average_length_is_finite() {
        let mut freqs = TermFrequencies::new();
        freqs.insert("t".to_string(), 1);
        let mut idf_map = TermIdf::default();
        idf_map.insert("t", 1.0);

        let s = score(&freqs, 10, &idf_map, 0.0, Bm25Params::default());
        assert!(s.is_finite());
        assert!(s > 0.0);
    }

    #[test]
    fn test_rerank_orders_by_bm25() {
        let make = |id: &str, text: &str, rank: usize| KeywordCandidate {
            doc: BookPage {
                book_id: id.to_string(),
                page_number: 1,
                text: text.to_string(),
            },
            ts_rank: None,
            score: None,
            keyword_rank: rank,
            highlighted_snippet: None,
            bm25_score: None,
        };
        let candidates = vec![
            make("weak", "fasting is mentioned once fasting", 0),
            make("none", "nothing relevant here", 1),
            make("strong", "fasting fasting fasting", 2),
        ];
        let stats = CorpusStats {
            total_documents: 100,
            avg_document_length: 4.0,
        };
        let mut dfs = HashMap::new();
        dfs.insert("fasting".to_string(), 5);
        let idf_map = TermIdf::from_document_frequencies(&dfs, &stats);

        let ranked = rerank(
            candidates,
            &terms(&["fasting"]),
            &stats,
            &idf_map,
            Bm25Params::default(),
            |c| c.doc.plain_text(),
        );

        assert_eq!(ranked[0].doc.book_id, "strong");
        assert_eq!(ranked[1].doc.book_id, "weak");
        assert_eq!(ranked[2].bm25_score, Some(0.0));
        // Engine rank is preserved
        assert_eq!(ranked[0].keyword_rank, 2);
    }

    #[test]
    fn test_rerank_with_nan_idf_keeps_every_candidate() {
        let make = |id: &str, text: &str, rank: usize| KeywordCandidate {
            doc: BookPage {
                book_id: id.to_string(),
                page_number: 1,
                text: text.to_string(),
            },
            ts_rank: None,
            score: None,
            keyword_rank: rank,
            highlighted_snippet: None,
            bm25_score: None,
        };
        let candidates: Vec<_> = (0..40)
            .map(|i| {
                let text = if i % 3 == 0 { "fasting day" } else { "other day" };
                make(&format!("p{i}"), text, i)
            })
            .collect();
        let stats = CorpusStats {
            total_documents: 100,
            avg_document_length: 2.0,
        };
        let mut idf_map = TermIdf::default();
        idf_map.insert("fasting", f32::NAN);
        idf_map.insert("day", 0.5);

        let ranked = rerank(
            candidates,
            &terms(&["fasting", "day"]),
            &stats,
            &idf_map,
            Bm25Params::default(),
            |c| c.doc.plain_text(),
        );

        assert_eq!(ranked.len(), 40);
        let finite: Vec<f32> = ranked
            .iter()
            .filter_map(|c| c.bm25_score)
            .filter(|s| !s.is_nan())
            .collect();
        assert_eq!(finite.len(), 26);
        assert!(finite.windows(2).all(|w| w[0] >= w[1]));
    }
}
