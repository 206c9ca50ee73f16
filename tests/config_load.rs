//! Config file loading and engine construction

use std::sync::Arc;
use tempfile::TempDir;

use kitab::cache::ManualClock;
use kitab::config::{self, RankingConfig};

#[test]
fn test_save_then_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = config::local_config_path(dir.path());

    let mut cfg = RankingConfig::default();
    cfg.fusion.semantic_weight = 0.6;
    cfg.fusion.keyword_weight = 0.4;
    cfg.expansion_cache.capacity = 150;
    config::save(&path, &cfg).unwrap();

    let loaded = config::load(Some(&path)).unwrap();
    assert_eq!(loaded, cfg);
}

#[test]
fn test_load_rejects_invalid_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[fusion]\nsemantic_weight = 0.9\nkeyword_weight = 0.9\n").unwrap();

    let err = config::load(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("must equal 1"));
}

#[test]
fn test_load_missing_explicit_path_fails() {
    let dir = TempDir::new().unwrap();
    assert!(config::load(Some(&dir.path().join("absent.toml"))).is_err());
}

#[test]
fn test_empty_file_is_all_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.toml");
    std::fs::write(&path, "").unwrap();

    assert_eq!(config::load_file(&path).unwrap(), RankingConfig::default());
}

#[test]
fn test_build_engine_uses_config() {
    let mut cfg = RankingConfig::default();
    cfg.fusion.max_expansions = 1;
    cfg.bm25.normalization_k = 8.0;

    let engine = cfg.build_engine(Arc::new(ManualClock::default()));
    assert_eq!(engine.config().max_expansions, 1);
    assert_eq!(engine.config().fusion.normalization_k, 8.0);
    assert_eq!(engine.config().fusion.rrf_k, 60.0);
}
