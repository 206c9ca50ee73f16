//! Bounded, time-boxed caches in front of expensive upstream calls
//!
//! Public interface:
//! - `TtlCache<V>` keyed by raw text, with capacity, TTL and batch eviction
//! - `EmbeddingCache` (text → vector) and `ExpansionCache` (query → reformulations)
//! - `Clock` for injecting time, `SystemClock` and `ManualClock`
//!
//! Each cache is an explicit object created once at process start and shared
//! (`Arc`) with every request. One mutex guards the map, so the
//! size check → evict → insert sequence is atomic with respect to other
//! writers and capacity is never overshot.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::retrieval::ExpandedQuery;

/// Text → embedding vector
pub type EmbeddingCache = TtlCache<Vec<f32>>;

/// Raw user query → ordered reformulations
pub type ExpansionCache = TtlCache<Vec<ExpandedQuery>>;

/// Capacity, lifetime and eviction batch of one cache
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
    /// Number of oldest entries dropped when the cache is full
    pub eviction_batch: usize,
}

impl CacheConfig {
    /// 5000 entries, 30 minutes, evict 100 at a time
    pub fn embedding() -> Self {
        Self {
            capacity: 5000,
            ttl: Duration::minutes(30),
            eviction_batch: 100,
        }
    }

    /// 200 entries, 10 minutes, evict 50 at a time
    ///
    /// Unique user queries are reused far less than passage texts, hence the
    /// steeper eviction ratio.
    pub fn query_expansion() -> Self {
        Self {
            capacity: 200,
            ttl: Duration::minutes(10),
            eviction_batch: 50,
        }
    }
}

/// Counters for one cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    /// Orders entries sharing a timestamp (batch inserts, coarse clocks)
    seq: u64,
}

#[derive(Debug)]
struct Entries<V> {
    map: HashMap<String, CacheEntry<V>>,
    next_seq: u64,
}

/// Bounded key → value cache with per-entry time-to-live
#[derive(Debug)]
pub struct TtlCache<V> {
    name: &'static str,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    entries: Mutex<Entries<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// `name` only labels log events
    ///
    /// An eviction batch of 0 or above capacity is clamped into `1..=capacity`.
    pub fn new(name: &'static str, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = config.capacity.max(1);
        let config = CacheConfig {
            capacity,
            ttl: config.ttl,
            eviction_batch: config.eviction_batch.clamp(1, capacity),
        };
        Self {
            name,
            config,
            clock,
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                next_seq: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn with_system_clock(name: &'static str, config: CacheConfig) -> Self {
        Self::new(name, config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn is_fresh(&self, inserted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - inserted_at <= self.config.ttl
    }

    /// Lookup under an already-held lock; stale entries are removed
    fn lookup(&self, entries: &mut Entries<V>, key: &str, now: DateTime<Utc>) -> Option<V> {
        let fresh = match entries.map.get(key) {
            Some(entry) => self.is_fresh(entry.inserted_at, now),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if fresh {
            self.hits.fetch_add(1, Ordering::Relaxed);
            entries.map.get(key).map(|e| e.value.clone())
        } else {
            entries.map.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(cache = self.name, "expired entry removed");
            None
        }
    }

    /// Fresh value for `key`, or `None`; an expired entry is dropped
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        self.lookup(&mut entries, key, now)
    }

    /// Hits only; misses and expired entries are silently left out
    pub fn get_batch<S: AsRef<str>>(&self, keys: &[S]) -> HashMap<String, V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let mut found = HashMap::new();
        for key in keys {
            let key = key.as_ref();
            if let Some(value) = self.lookup(&mut entries, key, now) {
                found.insert(key.to_string(), value);
            }
        }
        tracing::trace!(
            cache = self.name,
            requested = keys.len(),
            hits = found.len(),
            "batch lookup"
        );
        found
    }

    /// Insert, first evicting the oldest batch if the cache is full
    pub fn set(&self, key: impl Into<String>, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        if entries.map.len() >= self.config.capacity {
            self.evict_oldest(&mut entries, self.config.eviction_batch);
        }
        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.map.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: now,
                seq,
            },
        );
    }

    /// Insert many entries with one shared timestamp
    ///
    /// Evicts at least one batch when the result would reach capacity, and
    /// more if the batch alone would push past it. A batch larger than the
    /// whole cache keeps only its last `capacity` entries.
    pub fn set_batch(&self, batch: Vec<(String, V)>) {
        if batch.is_empty() {
            return;
        }
        let now = self.clock.now();
        let capacity = self.config.capacity;
        let skip = batch.len().saturating_sub(capacity);
        let incoming = batch.len() - skip;

        let mut entries = self.entries.lock();
        let projected = entries.map.len() + incoming;
        if projected >= capacity {
            let needed = projected.saturating_sub(capacity);
            self.evict_oldest(&mut entries, self.config.eviction_batch.max(needed));
        }

        for (key, value) in batch.into_iter().skip(skip) {
            let seq = entries.next_seq;
            entries.next_seq += 1;
            entries.map.insert(
                key,
                CacheEntry {
                    value,
                    inserted_at: now,
                    seq,
                },
            );
        }
    }

    /// Drop the `count` entries with the oldest insertion time
    fn evict_oldest(&self, entries: &mut Entries<V>, count: usize) {
        let mut by_age: Vec<(DateTime<Utc>, u64, String)> = entries
            .map
            .iter()
            .map(|(key, entry)| (entry.inserted_at, entry.seq, key.clone()))
            .collect();
        by_age.sort_unstable();

        let mut evicted = 0u64;
        for (_, _, key) in by_age.into_iter().take(count) {
            entries.map.remove(&key);
            evicted += 1;
        }
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        tracing::debug!(
            cache = self.name,
            evicted,
            remaining = entries.map.len(),
            "evicted oldest entries"
        );
    }

    /// Whether a fresh entry exists; does not remove stale ones or count stats
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        let entries = self.entries.lock();
        entries
            .map
            .get(key)
            .is_some_and(|e| self.is_fresh(e.inserted_at, now))
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.map.len();
        let ttl = self.config.ttl;
        entries.map.retain(|_, e| now - e.inserted_at <= ttl);
        let purged = before - entries.map.len();
        if purged > 0 {
            self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
            tracing::debug!(cache = self.name, purged, "purged expired entries");
        }
        purged
    }

    /// Stored entry count, including entries that have expired but not been touched
    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().map.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.config.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

impl EmbeddingCache {
    pub fn for_embeddings(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new("embedding", config, clock)
    }
}

impl ExpansionCache {
    pub fn for_expansions(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new("query_expansion", config, clock)
    }
}
