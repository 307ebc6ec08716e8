//! Hit/miss/saved-cost accounting.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time view of the counters, persisted as `stats.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub saved_cost: f64,
}

/// Host-facing statistics projection returned by
/// [`SemanticCache::stats`](crate::SemanticCache::stats).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Whether wrapped calls currently consult the cache.
    pub enabled: bool,
    /// Number of entries in the store.
    pub cache_size: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    /// `hits / (hits + misses)` rounded to 4 decimal places; `0.0` when
    /// no lookups have happened.
    pub hit_rate: f64,
    /// Accumulated cost credited by hits, rounded to 6 decimal places.
    pub total_saved_cost: f64,
    pub status: String,
}

/// Monotone counters shared across lookups.
///
/// Updates use relaxed atomics: monotonicity and eventual convergence
/// are the guarantees, not linearizability.
#[derive(Debug, Default)]
pub struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    saved_cost: Mutex<f64>,
}

impl StatsCounter {
    /// Fresh counters, all zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters resumed from a persisted snapshot.
    pub fn from_snapshot(snapshot: &StatsSnapshot) -> Self {
        Self {
            hits: AtomicU64::new(snapshot.hits),
            misses: AtomicU64::new(snapshot.misses),
            saved_cost: Mutex::new(snapshot.saved_cost),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Credit `cost` to the saved-cost sum. Negative values are ignored
    /// to keep the sum monotone.
    pub fn add_saved_cost(&self, cost: f64) {
        if cost > 0.0 {
            let mut saved = self.saved_cost.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *saved += cost;
        }
    }

    /// Zero all counters.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        *self.saved_cost.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = 0.0;
    }

    /// Current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            saved_cost: *self.saved_cost.lock().unwrap_or_else(std::sync::PoisonError::into_inner),
        }
    }
}

/// `hits / (hits + misses)` rounded to 4 decimal places, `0.0` for no
/// traffic.
pub(crate) fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    round_to(hits as f64 / total as f64, 4)
}

/// Round `value` to `digits` decimal places.
pub(crate) fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}
