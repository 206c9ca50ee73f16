//! `kitab bm25` - inspect the BM25 score of one text

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::collections::HashMap;

use kitab::config::RankingConfig;
use kitab::retrieval::bm25::{self, CorpusStats, TermIdf};
use kitab::retrieval::normalize;

pub struct Bm25Args {
    pub text: String,
    pub terms: Vec<String>,
    pub total_docs: u64,
    pub avg_len: f32,
    /// `term=count` pairs
    pub df: Vec<String>,
}

pub fn execute(args: &Bm25Args, json: bool, config: &RankingConfig) -> Result<()> {
    let dfs = parse_document_frequencies(&args.df)?;
    let stats = CorpusStats {
        total_documents: args.total_docs,
        avg_document_length: args.avg_len,
    };
    let idf_map = TermIdf::from_document_frequencies(&dfs, &stats);
    let freqs = bm25::count_terms(&args.text, &args.terms);
    let doc_len = bm25::count_words(&args.text);
    let score = bm25::score(
        &freqs,
        doc_len,
        &idf_map,
        stats.avg_document_length,
        config.bm25_params(),
    );
    let normalized = normalize(score, config.bm25.normalization_k);

    if json {
        let terms: Vec<_> = args
            .terms
            .iter()
            .map(|t| {
                json!({
                    "term": t,
                    "tf": freqs.get(t).copied().unwrap_or(0),
                    "idf": idf_map.get(t),
                })
            })
            .collect();
        let out = json!({
            "doc_len": doc_len,
            "terms": terms,
            "bm25": score,
            "normalized": normalized,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Document length: {doc_len} words\n");
        for t in &args.terms {
            println!(
                "  {t}: tf {} · idf {:.4}",
                freqs.get(t).copied().unwrap_or(0),
                idf_map.get(t)
            );
        }
        println!("\nBM25: {score:.4} (normalized {normalized:.4})");
    }
    Ok(())
}

fn parse_document_frequencies(pairs: &[String]) -> Result<HashMap<String, u64>> {
    let mut dfs = HashMap::new();
    for pair in pairs {
        let (term, count) = match pair.rsplit_once('=') {
            Some(split) => split,
            None => bail!("Expected term=count, got '{pair}'"),
        };
        let count: u64 = count
            .trim()
            .parse()
            .with_context(|| format!("Invalid document frequency in '{pair}'"))?;
        dfs.insert(term.trim().to_string(), count);
    }
    Ok(dfs)
}
