//! `kitab fuse` - run BM25 rerank, fusion and dedup over captured result lists

use anyhow::{Context, Result};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use kitab::config::RankingConfig;
use kitab::retrieval::bm25::{self, CorpusStats, TermIdf};
use kitab::retrieval::{
    dedup, fusion, BookPage, Candidate, Document, KeywordCandidate, MatchType, RankedList,
    SemanticCandidate, Tradition, Verse,
};

use crate::Kind;

/// One query variant's captured engine output
#[derive(Debug, Deserialize)]
struct VariantInput<D> {
    text: String,
    #[serde(default = "default_weight")]
    weight: f32,
    #[serde(default = "Vec::new")]
    semantic: Vec<SemanticCandidate<D>>,
    #[serde(default = "Vec::new")]
    keyword: Vec<KeywordCandidate<D>>,
}

fn default_weight() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct FuseRequest<D> {
    #[serde(default)]
    corpus_stats: Option<CorpusStats>,
    /// Document frequency per query term; enables BM25 rerank with `corpus_stats`
    #[serde(default)]
    document_frequencies: HashMap<String, u64>,
    variants: Vec<VariantInput<D>>,
}

#[derive(Serialize)]
struct FusedRecord<'a, D> {
    rank: usize,
    match_type: MatchType,
    #[serde(flatten)]
    candidate: &'a Candidate<D>,
}

pub fn execute(input: &Path, kind: Kind, limit: usize, json: bool, config: &RankingConfig) -> Result<()> {
    let raw = read_input(input)?;
    match kind {
        Kind::Book => run::<BookPage>(&raw, limit, json, config),
        Kind::Verse => run::<Verse>(&raw, limit, json, config),
        Kind::Tradition => run::<Tradition>(&raw, limit, json, config),
    }
}

fn read_input(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read request from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read request: {}", input.display()))
}

fn run<D>(raw: &str, limit: usize, json: bool, config: &RankingConfig) -> Result<()>
where
    D: Document + Serialize + DeserializeOwned,
{
    let request: FuseRequest<D> =
        serde_json::from_str(raw).context("Failed to parse fuse request")?;
    let results = fuse(request, limit, config);

    if json {
        output_json(&results)
    } else {
        output_human(&results);
        Ok(())
    }
}

fn fuse<D: Document>(request: FuseRequest<D>, limit: usize, config: &RankingConfig) -> Vec<Candidate<D>> {
    let bm25_params = config.bm25_params();
    let fusion_params = config.fusion_params();
    let idf_map = request
        .corpus_stats
        .as_ref()
        .map(|stats| TermIdf::from_document_frequencies(&request.document_frequencies, stats));

    let lists: Vec<RankedList<D>> = request
        .variants
        .into_iter()
        .map(|variant| {
            let mut keyword = variant.keyword;
            if let (Some(stats), Some(idf_map)) = (&request.corpus_stats, &idf_map) {
                let terms = bm25::query_terms(&variant.text);
                keyword = bm25::rerank(keyword, &terms, stats, idf_map, bm25_params, |c| {
                    c.doc.plain_text()
                });
            }
            let merged = fusion::merge(variant.semantic, keyword, &fusion_params);
            RankedList::new(merged, variant.weight)
        })
        .collect();

    fusion::top(dedup::deduplicate(lists, fusion_params.rrf_k), limit)
}

fn output_json<D: Document + Serialize>(results: &[Candidate<D>]) -> Result<()> {
    let records: Vec<FusedRecord<'_, D>> = results
        .iter()
        .enumerate()
        .map(|(i, candidate)| FusedRecord {
            rank: i + 1,
            match_type: candidate.match_type(),
            candidate,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

fn output_human<D: Document>(results: &[Candidate<D>]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    println!("Found {} results:\n", results.len());
    println!("{}", "─".repeat(60));

    for (i, result) in results.iter().enumerate() {
        let tag = match result.match_type() {
            MatchType::Both => "both".green(),
            MatchType::Semantic => "semantic".blue(),
            MatchType::Keyword => "keyword".yellow(),
        };
        println!(
            "{:>2}. {:?} [{}] fused {:.4} · rrf {:.5}",
            i + 1,
            result.key(),
            tag,
            result.fused_score,
            result.weighted_rrf_score
        );
        println!("    {}", truncate(result.display_text(), 120).dimmed());
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}
