//! Request counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;

/// Running totals of the tile request path.
///
/// Global counters are atomics; per-layer counters sit behind a mutex that
/// is only held for a map lookup.
#[derive(Debug)]
pub struct RuntimeStats {
    started: Instant,
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    uncached: AtomicU64,
    errors: AtomicU64,
    bytes_served: AtomicU64,
    per_layer: Mutex<BTreeMap<String, LayerStats>>,
}

/// Counters of one layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LayerStats {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub bytes_served: u64,
}

/// How a served tile was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheResult {
    /// Read from the store
    Hit,
    /// Rendered, then stored
    Miss,
    /// Rendered at a level that is not cached
    Uncached,
}

impl CacheResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheResult::Hit => "HIT",
            CacheResult::Miss => "MISS",
            CacheResult::Uncached => "UNCACHED",
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub uncached: u64,
    pub errors: u64,
    pub bytes_served: u64,
    /// Hits over hits plus misses, 0 before the first cacheable request
    pub hit_ratio: f64,
    pub requests_per_second: f64,
    pub layers: BTreeMap<String, LayerStats>,
}

impl RuntimeStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            uncached: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            bytes_served: AtomicU64::new(0),
            per_layer: Mutex::new(BTreeMap::new()),
        }
    }

    /// Count a served tile.
    pub fn record(&self, layer: &str, result: CacheResult, bytes: usize) {
        let bytes = bytes as u64;
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_served.fetch_add(bytes, Ordering::Relaxed);
        match result {
            CacheResult::Hit => self.cache_hits.fetch_add(1, Ordering::Relaxed),
            CacheResult::Miss => self.cache_misses.fetch_add(1, Ordering::Relaxed),
            CacheResult::Uncached => self.uncached.fetch_add(1, Ordering::Relaxed),
        };

        let mut per_layer = self.per_layer.lock().unwrap_or_else(PoisonError::into_inner);
        let stats = per_layer.entry(layer.to_string()).or_default();
        stats.requests += 1;
        stats.bytes_served += bytes;
        match result {
            CacheResult::Hit => stats.cache_hits += 1,
            CacheResult::Miss => stats.cache_misses += 1,
            CacheResult::Uncached => {}
        }
    }

    /// Count a failed request.
    pub fn record_error(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.started.elapsed();
        let requests = self.requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let cacheable = cache_hits + cache_misses;

        StatsSnapshot {
            uptime_secs: elapsed.as_secs(),
            requests,
            cache_hits,
            cache_misses,
            uncached: self.uncached.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
            hit_ratio: if cacheable == 0 {
                0.0
            } else {
                cache_hits as f64 / cacheable as f64
            },
            requests_per_second: requests as f64 / elapsed.as_secs_f64().max(1.0),
            layers: self
                .per_layer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self::new()
    }
}
