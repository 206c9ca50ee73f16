//! Ranking properties across BM25, normalisation, fusion and dedup

use approx::assert_relative_eq;
use std::collections::{HashMap, HashSet};

use kitab::retrieval::bm25::{self, Bm25Params, TermFrequencies, TermIdf};
use kitab::retrieval::fusion::{self, FusionParams};
use kitab::retrieval::{
    deduplicate, normalize, BookPage, Candidate, KeywordCandidate, RankedList, SemanticCandidate,
    DEFAULT_NORMALIZATION_K,
};

fn page(id: &str, n: u32) -> BookPage {
    BookPage {
        book_id: id.to_string(),
        page_number: n,
        text: format!("page {n} of {id}"),
    }
}

fn semantic(id: &str, n: u32, score: f32, rank: usize) -> SemanticCandidate<BookPage> {
    SemanticCandidate {
        doc: page(id, n),
        semantic_score: score,
        semantic_rank: rank,
    }
}

fn keyword(id: &str, n: u32, bm25: f32, rank: usize) -> KeywordCandidate<BookPage> {
    KeywordCandidate {
        doc: page(id, n),
        ts_rank: None,
        score: None,
        keyword_rank: rank,
        highlighted_snippet: None,
        bm25_score: Some(bm25),
    }
}

#[test]
fn test_idf_ordering() {
    assert!(bm25::idf(1, 1000) > bm25::idf(100, 1000));
    assert!(bm25::idf(100, 1000) > bm25::idf(999, 1000));
}

#[test]
fn test_idf_monotone_random() {
    let mut rng = fastrand::Rng::with_seed(42);
    for _ in 0..200 {
        let n = rng.u64(2..100_000);
        let a = rng.u64(1..n);
        let b = rng.u64(a..=n);
        assert!(bm25::idf(a, n) >= bm25::idf(b, n));
        assert!(bm25::idf(b, n) >= 0.0);
    }
}

#[test]
fn test_worked_bm25_example() {
    let n = 1000;
    let avg_len = 50.0f32;
    let idf_t1 = bm25::idf(10, n);
    let idf_t2 = bm25::idf(500, n);

    let mut idf_map = TermIdf::default();
    idf_map.insert("t1", idf_t1);
    idf_map.insert("t2", idf_t2);

    let mut freqs = TermFrequencies::new();
    freqs.insert("t1".to_string(), 3);
    freqs.insert("t2".to_string(), 1);

    let (k1, b) = (1.5f32, 0.75f32);
    let norm = k1 * (1.0 - b + b * 40.0 / avg_len);
    let expected = idf_t1 * 3.0 * (k1 + 1.0) / (3.0 + norm) + idf_t2 * 1.0 * (k1 + 1.0) / (1.0 + norm);

    let actual = bm25::score(&freqs, 40, &idf_map, avg_len, Bm25Params::default());
    assert_relative_eq!(actual, expected, epsilon = 1e-5);
}

#[test]
fn test_bm25_zero_without_matching_terms() {
    let freqs = bm25::count_terms("nothing about the query here", &["fasting".to_string()]);
    let mut idf_map = TermIdf::default();
    idf_map.insert("fasting", 2.3);
    assert_eq!(
        bm25::score(&freqs, 5, &idf_map, 10.0, Bm25Params::default()),
        0.0
    );
}

#[test]
fn test_normalize_properties() {
    assert_eq!(normalize(0.0, DEFAULT_NORMALIZATION_K), 0.0);
    assert_relative_eq!(normalize(5.0, DEFAULT_NORMALIZATION_K), 0.5);
    assert!(normalize(1000.0, 5.0) > 0.99);
    assert!(normalize(1.0, 5.0) < normalize(2.0, 5.0));
}

#[test]
fn test_rrf_rank_zero_in_both_beats_one() {
    let k = FusionParams::default().rrf_k;
    let both = fusion::rrf_score(&[Some(0), Some(0)], k);
    let one = fusion::rrf_score(&[Some(0), None], k);
    assert!(both > one);
}

#[test]
fn test_merge_output_keys_are_input_union() {
    let mut rng = fastrand::Rng::with_seed(9);
    for _ in 0..50 {
        let sem: Vec<_> = (0..rng.usize(0..15))
            .map(|r| semantic("b", rng.u32(0..20), rng.f32(), r))
            .collect();
        let kw: Vec<_> = (0..rng.usize(0..15))
            .map(|r| keyword("b", rng.u32(0..20), rng.f32() * 10.0, r))
            .collect();

        let mut expected: HashSet<(String, u32)> = HashSet::new();
        expected.extend(sem.iter().map(|c| ("b".to_string(), c.doc.page_number)));
        expected.extend(kw.iter().map(|c| ("b".to_string(), c.doc.page_number)));

        let merged = fusion::merge(sem, kw, &FusionParams::default());
        let keys: Vec<_> = merged.iter().map(Candidate::key).collect();
        let unique: HashSet<_> = keys.iter().cloned().collect();

        assert_eq!(keys.len(), unique.len(), "merge produced a duplicate key");
        assert_eq!(unique, expected);
    }
}

#[test]
fn test_high_bm25_lifts_low_similarity() {
    let params = FusionParams::default();
    let semantic_only = fusion::merge(vec![semantic("b", 1, 0.3, 0)], vec![], &params);
    let both = fusion::merge(
        vec![semantic("b", 1, 0.3, 0)],
        vec![keyword("b", 1, 12.0, 0)],
        &params,
    );
    assert!(both[0].fused_score >= semantic_only[0].fused_score);
}

#[test]
fn test_multi_query_weighted_rrf_exact() {
    let a = fusion::merge(
        vec![semantic("x", 1, 0.9, 0), semantic("x", 2, 0.8, 1)],
        vec![],
        &FusionParams::default(),
    );
    let b = fusion::merge(
        vec![
            semantic("x", 3, 0.9, 0),
            semantic("x", 4, 0.8, 1),
            semantic("x", 1, 0.7, 2),
        ],
        vec![],
        &FusionParams::default(),
    );

    let merged = deduplicate(vec![RankedList::new(a, 0.6), RankedList::new(b, 0.4)], 60.0);
    let doc = merged
        .iter()
        .find(|c| c.key() == ("x".to_string(), 1))
        .unwrap();
    assert_eq!(doc.weighted_rrf_score, 0.6f32 / 61.0 + 0.4f32 / 63.0);

    let by_key: HashMap<_, _> = merged.iter().map(|c| (c.key(), c.weighted_rrf_score)).collect();
    assert_eq!(by_key.len(), 4);
    for pair in merged.windows(2) {
        assert!(pair[0].weighted_rrf_score >= pair[1].weighted_rrf_score);
    }
}
