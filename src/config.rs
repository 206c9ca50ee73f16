//! Ranking configuration
//!
//! Stored as TOML, every section optional with defaults:
//!
//! ```toml
//! [bm25]
//! k1 = 1.5
//! b = 0.75
//! normalization_k = 5.0
//!
//! [fusion]
//! rrf_k = 60.0
//! semantic_weight = 0.5
//! keyword_weight = 0.5
//!
//! [embedding_cache]
//! capacity = 5000
//! ttl_secs = 1800
//! eviction_batch = 100
//! ```
//!
//! Resolution order: explicit path, `KITAB_CONFIG`, `.kitab/config.toml`
//! in the working directory, then built-in defaults.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{CacheConfig, Clock, EmbeddingCache, ExpansionCache};
use crate::retrieval::{Bm25Params, FusionParams, RetrievalConfig, SearchEngine};

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "KITAB_CONFIG";

// =============================================================================
// Config Types
// =============================================================================

/// Complete ranking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default)]
    pub bm25: Bm25Section,
    #[serde(default)]
    pub fusion: FusionSection,
    #[serde(default = "CacheSection::embedding")]
    pub embedding_cache: CacheSection,
    #[serde(default = "CacheSection::query_expansion")]
    pub expansion_cache: CacheSection,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            bm25: Bm25Section::default(),
            fusion: FusionSection::default(),
            embedding_cache: CacheSection::embedding(),
            expansion_cache: CacheSection::query_expansion(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bm25Section {
    /// Term-frequency saturation
    #[serde(default = "default_k1")]
    pub k1: f32,
    /// Document-length normalisation strength, 0..=1
    #[serde(default = "default_b")]
    pub b: f32,
    /// BM25 score that normalises to 0.5
    #[serde(default = "default_normalization_k")]
    pub normalization_k: f32,
}

fn default_k1() -> f32 {
    1.5
}
fn default_b() -> f32 {
    0.75
}
fn default_normalization_k() -> f32 {
    5.0
}

impl Default for Bm25Section {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            normalization_k: default_normalization_k(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionSection {
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    #[serde(default = "default_channel_weight")]
    pub semantic_weight: f32,
    #[serde(default = "default_channel_weight")]
    pub keyword_weight: f32,
    /// Fused scores this close are ordered by RRF
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f32,
    #[serde(default = "default_original_query_weight")]
    pub original_query_weight: f32,
    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,
    #[serde(default = "default_fetch_multiplier")]
    pub fetch_multiplier: usize,
}

fn default_rrf_k() -> f32 {
    60.0
}
fn default_channel_weight() -> f32 {
    0.5
}
fn default_tie_epsilon() -> f32 {
    0.001
}
fn default_original_query_weight() -> f32 {
    1.0
}
fn default_max_expansions() -> usize {
    3
}
fn default_fetch_multiplier() -> usize {
    2
}

impl Default for FusionSection {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            semantic_weight: default_channel_weight(),
            keyword_weight: default_channel_weight(),
            tie_epsilon: default_tie_epsilon(),
            original_query_weight: default_original_query_weight(),
            max_expansions: default_max_expansions(),
            fetch_multiplier: default_fetch_multiplier(),
        }
    }
}

/// Capacity, lifetime and eviction batch for one cache
///
/// Missing fields fall back to the embedding cache's values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: i64,
    #[serde(default = "default_eviction_batch")]
    pub eviction_batch: usize,
}

fn default_capacity() -> usize {
    5000
}
fn default_ttl_secs() -> i64 {
    30 * 60
}
fn default_eviction_batch() -> usize {
    100
}

impl CacheSection {
    pub fn embedding() -> Self {
        Self {
            capacity: default_capacity(),
            ttl_secs: default_ttl_secs(),
            eviction_batch: default_eviction_batch(),
        }
    }

    pub fn query_expansion() -> Self {
        Self {
            capacity: 200,
            ttl_secs: 10 * 60,
            eviction_batch: 50,
        }
    }

    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.capacity,
            ttl: chrono::Duration::seconds(self.ttl_secs),
            eviction_batch: self.eviction_batch,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.capacity == 0 {
            bail!("[{name}] capacity must be positive");
        }
        if self.ttl_secs <= 0 {
            bail!("[{name}] ttl_secs must be positive, got {}", self.ttl_secs);
        }
        if self.eviction_batch == 0 || self.eviction_batch > self.capacity {
            bail!(
                "[{name}] eviction_batch must be in 1..={}, got {}",
                self.capacity,
                self.eviction_batch
            );
        }
        Ok(())
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self::embedding()
    }
}

// =============================================================================
// Conversion and Validation
// =============================================================================

impl RankingConfig {
    pub fn bm25_params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.bm25.k1,
            b: self.bm25.b,
        }
    }

    pub fn fusion_params(&self) -> FusionParams {
        FusionParams {
            rrf_k: self.fusion.rrf_k,
            semantic_weight: self.fusion.semantic_weight,
            keyword_weight: self.fusion.keyword_weight,
            normalization_k: self.bm25.normalization_k,
            tie_epsilon: self.fusion.tie_epsilon,
        }
    }

    pub fn retrieval(&self) -> RetrievalConfig {
        RetrievalConfig {
            bm25: self.bm25_params(),
            fusion: self.fusion_params(),
            original_query_weight: self.fusion.original_query_weight,
            max_expansions: self.fusion.max_expansions,
            fetch_multiplier: self.fusion.fetch_multiplier,
        }
    }

    /// Engine with freshly created caches sized by this config
    ///
    /// Call once at process start and share the engine across requests.
    pub fn build_engine(&self, clock: Arc<dyn Clock>) -> SearchEngine {
        let embeddings = EmbeddingCache::for_embeddings(
            self.embedding_cache.to_cache_config(),
            clock.clone(),
        );
        let expansions =
            ExpansionCache::for_expansions(self.expansion_cache.to_cache_config(), clock);
        SearchEngine::new(self.retrieval(), Arc::new(embeddings), Arc::new(expansions))
    }

    /// Reject values that would break scoring invariants
    pub fn validate(&self) -> Result<()> {
        if self.bm25.k1 <= 0.0 {
            bail!("[bm25] k1 must be positive, got {}", self.bm25.k1);
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            bail!("[bm25] b must be within 0..=1, got {}", self.bm25.b);
        }
        if self.bm25.normalization_k <= 0.0 {
            bail!(
                "[bm25] normalization_k must be positive, got {}",
                self.bm25.normalization_k
            );
        }

        let f = &self.fusion;
        if f.rrf_k <= 0.0 {
            bail!("[fusion] rrf_k must be positive, got {}", f.rrf_k);
        }
        if f.semantic_weight < 0.0 || f.keyword_weight < 0.0 {
            bail!("[fusion] channel weights must not be negative");
        }
        if ((f.semantic_weight + f.keyword_weight) - 1.0).abs() > 1e-6 {
            bail!(
                "[fusion] semantic_weight + keyword_weight must equal 1, got {}",
                f.semantic_weight + f.keyword_weight
            );
        }
        if f.tie_epsilon < 0.0 {
            bail!("[fusion] tie_epsilon must not be negative");
        }
        if f.original_query_weight <= 0.0 {
            bail!("[fusion] original_query_weight must be positive");
        }

        self.embedding_cache.validate("embedding_cache")?;
        self.expansion_cache.validate("expansion_cache")?;
        Ok(())
    }
}

// =============================================================================
// Load/Save
// =============================================================================

/// Config file location inside a working directory
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(".kitab").join("config.toml")
}

/// Parse and validate a config file
pub fn load_file(path: &Path) -> Result<RankingConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: RankingConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config: {}", path.display()))?;
    Ok(config)
}

/// Load the effective config
///
/// An explicit path or `KITAB_CONFIG` must exist; the working-directory
/// file is optional and defaults apply when it is absent.
pub fn load(explicit: Option<&Path>) -> Result<RankingConfig> {
    if let Some(path) = explicit {
        return load_file(path);
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return load_file(Path::new(&path));
        }
    }

    let local = local_config_path(&std::env::current_dir()?);
    if local.exists() {
        return load_file(&local);
    }

    tracing::debug!("No config file found, using defaults");
    Ok(RankingConfig::default())
}

/// Write config as pretty TOML, creating parent directories
pub fn save(path: &Path, config: &RankingConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, contents).with_context(|| format!("Failed to write config: {}", path.display()))
}
