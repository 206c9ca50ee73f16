//! Candidate types shared by every ranking stage
//!
//! A candidate is one retrieved passage plus the per-channel scores and
//! ranks it picked up for a single search call. Identity across channels
//! and query variants comes from `Document::canonical_key`.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// A retrievable unit of content
///
/// The canonical key is what merging keys on: two candidates with equal
/// keys are the same logical document, whichever channel produced them.
pub trait Document: Clone + Debug + Send + Sync {
    type Key: Hash + Eq + Clone + Debug + Send + Sync;

    fn canonical_key(&self) -> Self::Key;

    /// Plain, unhighlighted text of the passage
    fn plain_text(&self) -> &str;

    /// Merge content-type specific fields from another record with the same key.
    ///
    /// Called during multi-query deduplication after the shared numeric fields
    /// have been merged. Default keeps `self` untouched.
    fn absorb(&mut self, _other: &Self) {}
}

/// One page of a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookPage {
    pub book_id: String,
    pub page_number: u32,
    #[serde(default)]
    pub text: String,
}

impl Document for BookPage {
    type Key = (String, u32);

    fn canonical_key(&self) -> Self::Key {
        (self.book_id.clone(), self.page_number)
    }

    fn plain_text(&self) -> &str {
        &self.text
    }
}

/// One verse, addressed by chapter and verse number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verse {
    pub surah_number: u16,
    pub ayah_number: u16,
    #[serde(default)]
    pub text: String,
}

impl Document for Verse {
    type Key = (u16, u16);

    fn canonical_key(&self) -> Self::Key {
        (self.surah_number, self.ayah_number)
    }

    fn plain_text(&self) -> &str {
        &self.text
    }
}

/// One narration from a tradition collection
///
/// Hadith numbers are strings: some collections use suffixed numbering ("12a").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tradition {
    pub collection_slug: String,
    pub hadith_number: String,
    #[serde(default)]
    pub text: String,
}

impl Document for Tradition {
    type Key = (String, String);

    fn canonical_key(&self) -> Self::Key {
        (self.collection_slug.clone(), self.hadith_number.clone())
    }

    fn plain_text(&self) -> &str {
        &self.text
    }
}

/// Result from the vector-similarity collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCandidate<D> {
    pub doc: D,
    /// Similarity in [0, 1]
    pub semantic_score: f32,
    /// 0-based position in the semantic list
    pub semantic_rank: usize,
}

/// Result from the full-text collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordCandidate<D> {
    pub doc: D,
    /// Engine-native proximity/phrase score, used opaquely
    #[serde(default)]
    pub ts_rank: Option<f32>,
    /// Engine-native relevance score
    #[serde(default)]
    pub score: Option<f32>,
    /// 0-based position in the keyword list
    pub keyword_rank: usize,
    #[serde(default)]
    pub highlighted_snippet: Option<String>,
    /// Filled in by `bm25::rerank`
    #[serde(default)]
    pub bm25_score: Option<f32>,
}

/// Which channels surfaced a merged candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Semantic,
    Keyword,
    Both,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Semantic => "semantic",
            MatchType::Keyword => "keyword",
            MatchType::Both => "both",
        }
    }
}

/// Merged candidate with combined scores and provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate<D> {
    pub doc: D,
    #[serde(default)]
    pub semantic_score: Option<f32>,
    #[serde(default)]
    pub semantic_rank: Option<usize>,
    #[serde(default)]
    pub keyword_score: Option<f32>,
    #[serde(default)]
    pub keyword_rank: Option<usize>,
    #[serde(default)]
    pub ts_rank: Option<f32>,
    #[serde(default)]
    pub bm25_score: Option<f32>,
    #[serde(default)]
    pub highlighted_snippet: Option<String>,
    #[serde(default)]
    pub fused_score: f32,
    #[serde(default)]
    pub rrf_score: f32,
    /// Accumulated across query variants by deduplication
    #[serde(default)]
    pub weighted_rrf_score: f32,
}

impl<D: Document> Candidate<D> {
    pub fn from_semantic(item: SemanticCandidate<D>) -> Self {
        Self {
            doc: item.doc,
            semantic_score: Some(item.semantic_score),
            semantic_rank: Some(item.semantic_rank),
            keyword_score: None,
            keyword_rank: None,
            ts_rank: None,
            bm25_score: None,
            highlighted_snippet: None,
            fused_score: 0.0,
            rrf_score: 0.0,
            weighted_rrf_score: 0.0,
        }
    }

    pub fn from_keyword(item: KeywordCandidate<D>) -> Self {
        let KeywordCandidate {
            doc,
            ts_rank,
            score,
            keyword_rank,
            highlighted_snippet,
            bm25_score,
        } = item;
        Self {
            doc,
            semantic_score: None,
            semantic_rank: None,
            keyword_score: score,
            keyword_rank: Some(keyword_rank),
            ts_rank,
            bm25_score,
            highlighted_snippet,
            fused_score: 0.0,
            rrf_score: 0.0,
            weighted_rrf_score: 0.0,
        }
    }

    /// Copy keyword-only fields onto this record, leaving semantic fields intact
    pub fn attach_keyword(&mut self, item: KeywordCandidate<D>) {
        self.keyword_rank = Some(item.keyword_rank);
        self.keyword_score = item.score;
        self.ts_rank = item.ts_rank;
        self.bm25_score = item.bm25_score;
        self.highlighted_snippet = item.highlighted_snippet;
    }

    pub fn key(&self) -> D::Key {
        self.doc.canonical_key()
    }

    /// Provenance, derived only from which ranks are set
    pub fn match_type(&self) -> MatchType {
        match (self.semantic_rank.is_some(), self.keyword_rank.is_some()) {
            (true, true) => MatchType::Both,
            (false, true) => MatchType::Keyword,
            _ => MatchType::Semantic,
        }
    }

    /// Snippet for display: highlighted text when present, otherwise plain text
    pub fn display_text(&self) -> &str {
        self.highlighted_snippet
            .as_deref()
            .unwrap_or_else(|| self.doc.plain_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str, n: u32) -> BookPage {
        BookPage {
            book_id: id.to_string(),
            page_number: n,
            text: format!("text of {} page {}", id, n),
        }
    }

    #[test]
    fn test_canonical_keys_per_content_type() {
        assert_eq!(page("b1", 4).canonical_key(), ("b1".to_string(), 4));

        let verse = Verse {
            surah_number: 2,
            ayah_number: 255,
            text: String::new(),
        };
        assert_eq!(verse.canonical_key(), (2, 255));

        let tradition = Tradition {
            collection_slug: "bukhari".to_string(),
            hadith_number: "12a".to_string(),
            text: String::new(),
        };
        assert_eq!(
            tradition.canonical_key(),
            ("bukhari".to_string(), "12a".to_string())
        );
    }

    #[test]
    fn test_match_type_from_ranks() {
        let mut c = Candidate::from_semantic(SemanticCandidate {
            doc: page("b1", 1),
            semantic_score: 0.8,
            semantic_rank: 0,
        });
        assert_eq!(c.match_type(), MatchType::Semantic);

        c.attach_keyword(KeywordCandidate {
            doc: page("b1", 1),
            ts_rank: Some(0.1),
            score: Some(2.0),
            keyword_rank: 3,
            highlighted_snippet: Some("<mark>text</mark>".to_string()),
            bm25_score: None,
        });
        assert_eq!(c.match_type(), MatchType::Both);
        assert_eq!(c.semantic_score, Some(0.8));
        assert_eq!(c.display_text(), "<mark>text</mark>");

        c.semantic_rank = None;
        assert_eq!(c.match_type(), MatchType::Keyword);
    }

    #[test]
    fn test_from_keyword_carries_keyword_fields() {
        let c = Candidate::from_keyword(KeywordCandidate {
            doc: page("b2", 9),
            ts_rank: Some(0.4),
            score: Some(6.5),
            keyword_rank: 1,
            highlighted_snippet: Some("<mark>page</mark> 9".to_string()),
            bm25_score: Some(2.25),
        });

        assert_eq!(c.key(), ("b2".to_string(), 9));
        assert_eq!(c.doc.text, "text of b2 page 9");
        assert_eq!(c.match_type(), MatchType::Keyword);
        assert_eq!(c.keyword_rank, Some(1));
        assert_eq!(c.keyword_score, Some(6.5));
        assert_eq!(c.ts_rank, Some(0.4));
        assert_eq!(c.bm25_score, Some(2.25));
        assert_eq!(c.semantic_score, None);
        assert_eq!(c.display_text(), "<mark>page</mark> 9");
    }

    #[test]
    fn test_match_type_serializes_lowercase() {
        let json = serde_json::to_string(&MatchType::Both).unwrap();
        assert_eq!(json, "\"both\"");
    }
}
