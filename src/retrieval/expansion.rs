//! Query variants from AI reformulation
//!
//! An expansion collaborator (usually an LLM) proposes alternative phrasings
//! with weights. These helpers clean that output up and turn it into the
//! weighted variant list the search pipeline runs.

use serde::{Deserialize, Serialize};

/// One reformulation proposed for a user query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedQuery {
    #[serde(alias = "expandedText")]
    pub text: String,
    /// Relative trust in this reformulation, in (0, 1]
    pub weight: f32,
    #[serde(default)]
    pub rationale: String,
}

/// A query string to run, with its weight in cross-variant deduplication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryVariant {
    pub text: String,
    pub weight: f32,
}

/// Smallest weight kept for an expansion; zero or negative weights are lifted to it
const MIN_EXPANSION_WEIGHT: f32 = 0.05;

fn same_query(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Drop empty or repeated reformulations, clamp weights, keep at most `max`
pub fn sanitize(original: &str, expansions: Vec<ExpandedQuery>, max: usize) -> Vec<ExpandedQuery> {
    let mut kept: Vec<ExpandedQuery> = Vec::new();
    for mut expansion in expansions {
        if kept.len() >= max {
            break;
        }
        expansion.text = expansion.text.trim().to_string();
        if expansion.text.is_empty() || same_query(&expansion.text, original) {
            continue;
        }
        if kept.iter().any(|k| same_query(&k.text, &expansion.text)) {
            continue;
        }
        expansion.weight = if expansion.weight.is_finite() {
            expansion.weight.clamp(MIN_EXPANSION_WEIGHT, 1.0)
        } else {
            MIN_EXPANSION_WEIGHT
        };
        kept.push(expansion);
    }
    kept
}

/// Parse an LLM reply holding a JSON array of expansions
///
/// Text around the array is ignored. Malformed replies yield no expansions.
pub fn parse_expansions(raw: &str) -> Vec<ExpandedQuery> {
    let json = match (raw.find('['), raw.rfind(']')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => raw,
    };

    match serde_json::from_str::<Vec<ExpandedQuery>>(json) {
        Ok(expansions) => expansions,
        Err(e) => {
            tracing::warn!("Failed to parse query expansions: {e}");
            Vec::new()
        }
    }
}

/// Original query first, then each expansion at its own weight
pub fn variants(
    original: &str,
    expansions: &[ExpandedQuery],
    original_weight: f32,
) -> Vec<QueryVariant> {
    let mut out = Vec::with_capacity(expansions.len() + 1);
    out.push(QueryVariant {
        text: original.to_string(),
        weight: original_weight,
    });
    out.extend(expansions.iter().map(|e| QueryVariant {
        text: e.text.clone(),
        weight: e.weight,
    }));
    out
}
