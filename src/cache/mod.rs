//! Semantic cache facade.
//!
//! [`SemanticCache`] composes the embedder, vector index, store,
//! policy, stats, and history log behind five operations: `lookup`,
//! `add`, `clear`, `stats`, and [`wrap`](SemanticCache::wrap). A lookup
//! embeds the prompt, finds the nearest stored neighbor, converts its
//! L2 distance to a similarity with `1/(1+d)`, and serves the cached
//! response when the entry is live and the similarity clears the
//! runtime threshold.
//!
//! # Concurrency
//!
//! All mutable state sits behind one `tokio::sync::RwLock`: lookups
//! take the read guard (and may run in parallel), `add`/`clear` take
//! the write guard and persist the snapshot before releasing it, so a
//! snapshot always completes before the next one starts. Counters are
//! relaxed atomics; the enable flag and tuning knobs are off the embed
//! and upstream-call suspension points.
//!
//! # Error posture
//!
//! Only construction surfaces errors. Runtime embedding failures are
//! served as misses, persistence failures keep the cache in-memory and
//! retry on the next `add`/`clear`, and corrupt snapshots start empty
//! with the files left on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, validate_threshold};
use crate::embedder::{self, Embedder};
use crate::error::Result;
use crate::history::{HistoryAction, HistoryLog, HistoryRecord};
use crate::index::{FlatIndex, VectorIndex, similarity_from_distance};
use crate::policy;
use crate::stats::{CacheStats, StatsCounter, hit_rate, round_to};
use crate::store::{CacheEntry, Store, fingerprint, snapshot};
use crate::telemetry;

pub mod wrap;

/// Status lines reported by [`SemanticCache::stats`].
const STATUS_READY: &str = "semantic cache loaded and ready";
const STATUS_DISABLED: &str = "semantic cache disabled";

/// Metadata key under which the wrapper records the upstream call cost.
pub(crate) const COST_METADATA_KEY: &str = "cost";

/// A successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    /// The cached model output.
    pub response: String,
    /// Similarity between the query and the matched entry, in `[0, 1]`.
    pub similarity: f32,
    /// The query that produced this result (not the stored prompt).
    pub original_query: String,
    /// The matched entry's metadata, verbatim.
    pub metadata: BTreeMap<String, String>,
}

/// Store and index, guarded together.
struct CacheState {
    store: Store,
    index: Box<dyn VectorIndex>,
}

/// Runtime-mutable knobs, effective immediately for subsequent lookups.
struct Tuning {
    similarity_threshold: f32,
    ttl_seconds: u64,
}

/// Everything a lookup learned, for the wrapper's miss path.
///
/// Carrying the prompt's embedding out of the lookup lets the wrapper
/// admit on a miss without embedding the same prompt a second time.
pub(crate) struct LookupOutcome {
    pub(crate) result: Option<LookupResult>,
    /// Nearest-neighbor similarity observed whether or not it produced
    /// a hit; `0.0` when the index was empty.
    pub(crate) observed_similarity: f32,
    /// The prompt's embedding. `None` when embedding failed (the miss
    /// was served without one, and nothing can be admitted).
    pub(crate) vector: Option<Vec<f32>>,
}

/// Semantic response cache.
///
/// Construct once via [`open`](Self::open) (or
/// [`with_embedder`](Self::with_embedder) for dependency injection),
/// share by `Arc`, and either call the operations directly or wrap a
/// model call with [`wrap`](Self::wrap).
///
/// ```rust,no_run
/// # use mimir::{CacheConfig, SemanticCache};
/// # fn main() -> mimir::Result<()> {
/// let cache = SemanticCache::open(CacheConfig::new().cache_path("/var/cache/mimir"))?;
/// # Ok(())
/// # }
/// ```
pub struct SemanticCache {
    model_name: String,
    cache_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    state: RwLock<CacheState>,
    stats: StatsCounter,
    history: HistoryLog,
    enabled: AtomicBool,
    tuning: std::sync::RwLock<Tuning>,
}

impl SemanticCache {
    /// Open a cache: load the embedding model named in `config`, then
    /// recover any snapshot under `config.cache_path`.
    ///
    /// Fails with [`Init`](crate::CacheError::Init) when the model
    /// cannot load and [`Configuration`](crate::CacheError::Configuration)
    /// for out-of-range options. A corrupt snapshot is not an error:
    /// the cache starts empty and the files stay on disk.
    pub fn open(config: CacheConfig) -> Result<Self> {
        let embedder = embedder::from_config(&config)?;
        Self::with_embedder(config, embedder)
    }

    /// Open a cache over an injected embedder.
    ///
    /// The embedder defines the vector dimension the snapshot is
    /// validated against.
    pub fn with_embedder(config: CacheConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let dimension = embedder.dimension();

        let (store, index, stats) = match snapshot::load(&config.cache_path, dimension) {
            Ok(Some(loaded)) => (loaded.store, loaded.index, loaded.stats),
            Ok(None) => (Store::new(), FlatIndex::new(dimension), Default::default()),
            Err(e) => {
                warn!(
                    path = %config.cache_path.display(),
                    error = %e,
                    "snapshot unusable, starting empty (files left on disk)"
                );
                (Store::new(), FlatIndex::new(dimension), Default::default())
            }
        };

        info!(
            model = %config.model_name,
            dimension,
            entries = store.len(),
            "semantic cache ready"
        );
        metrics::gauge!(telemetry::CACHE_ENTRIES).set(store.len() as f64);

        Ok(Self {
            model_name: config.model_name,
            cache_path: config.cache_path.clone(),
            embedder,
            state: RwLock::new(CacheState {
                store,
                index: Box::new(index),
            }),
            stats: StatsCounter::from_snapshot(&stats),
            history: HistoryLog::new(&config.cache_path),
            enabled: AtomicBool::new(config.enabled),
            tuning: std::sync::RwLock::new(Tuning {
                similarity_threshold: config.similarity_threshold,
                ttl_seconds: config.ttl_seconds,
            }),
        })
    }

    /// Look up the nearest cached entry for `prompt`.
    ///
    /// Returns `None` — and counts a miss — when the index is empty,
    /// the nearest slot is dangling, the entry's TTL has lapsed, or the
    /// similarity is below the threshold.
    pub async fn lookup(&self, prompt: &str) -> Option<LookupResult> {
        self.lookup_observed(prompt).await.result
    }

    /// Lookup plus what the wrapper needs on a miss: the observed
    /// nearest-neighbor similarity and the prompt's embedding (so an
    /// admission that follows does not embed again).
    pub(crate) async fn lookup_observed(&self, prompt: &str) -> LookupOutcome {
        let vector = match self.embedder.embed(prompt).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "embedding failed during lookup, serving miss");
                self.count_miss();
                return LookupOutcome {
                    result: None,
                    observed_similarity: 0.0,
                    vector: None,
                };
            }
        };
        let (threshold, ttl_seconds) = self.tuning_values();

        let state = self.state.read().await;
        let miss = |observed_similarity: f32, vector: Vec<f32>| LookupOutcome {
            result: None,
            observed_similarity,
            vector: Some(vector),
        };

        let Some(&(slot, distance)) = state.index.search(&vector, 1).first() else {
            self.count_miss();
            return miss(0.0, vector);
        };
        let similarity = similarity_from_distance(distance);

        let Some(entry) = state.store.entry_at_slot(slot) else {
            debug!(slot, "nearest slot is dangling, serving miss");
            self.count_miss();
            return miss(similarity, vector);
        };

        if !policy::is_live(&entry.created_at, Utc::now(), ttl_seconds) {
            debug!(similarity, "nearest entry expired, serving miss");
            self.count_miss();
            return miss(similarity, vector);
        }

        if !policy::accepts(similarity, threshold) {
            debug!(similarity, threshold, "nearest entry below threshold");
            self.count_miss();
            return miss(similarity, vector);
        }

        self.stats.record_hit();
        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        if let Some(cost) = entry
            .metadata
            .get(COST_METADATA_KEY)
            .and_then(|cost| cost.parse::<f64>().ok())
        {
            self.stats.add_saved_cost(cost);
        }
        debug!(similarity, "cache hit");

        let result = LookupResult {
            response: entry.response.clone(),
            similarity,
            original_query: prompt.to_string(),
            metadata: entry.metadata.clone(),
        };
        LookupOutcome {
            result: Some(result),
            observed_similarity: similarity,
            vector: Some(vector),
        }
    }

    /// Admit a prompt/response pair unconditionally (admission policy is
    /// the caller's concern — the wrapper checks it, direct callers may
    /// not want to).
    ///
    /// Re-admitting an existing fingerprint overwrites the entry in
    /// place without allocating a new index slot. The snapshot is
    /// persisted before returning; persistence failures are absorbed.
    pub async fn add(&self, prompt: &str, response: &str) {
        self.add_with_metadata(prompt, response, BTreeMap::new())
            .await;
    }

    /// [`add`](Self::add) with entry metadata, persisted verbatim.
    pub async fn add_with_metadata(
        &self,
        prompt: &str,
        response: &str,
        metadata: BTreeMap<String, String>,
    ) {
        let vector = match self.embedder.embed(prompt).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "embedding failed, entry not admitted");
                return;
            }
        };
        self.admit(prompt, response, metadata, vector).await;
    }

    /// Admission with the prompt's embedding already in hand.
    ///
    /// The wrapper calls this with the vector its lookup computed, so a
    /// store never embeds the same prompt twice.
    pub(crate) async fn admit(
        &self,
        prompt: &str,
        response: &str,
        metadata: BTreeMap<String, String>,
        vector: Vec<f32>,
    ) {
        let key = fingerprint(prompt);
        let created_at = Utc::now().to_rfc3339();

        let mut state = self.state.write().await;
        if let Some(existing) = state.store.get_mut(&key) {
            // Same fingerprint means identical prompt bytes, so the
            // vector already in the index is unchanged.
            existing.response = response.to_string();
            existing.embedding = vector;
            existing.metadata = metadata;
            existing.created_at = created_at;
        } else {
            let slot = match state.index.add(&vector) {
                Ok(slot) => slot,
                Err(e) => {
                    warn!(error = %e, "index rejected embedding, entry not admitted");
                    return;
                }
            };
            state.store.insert(
                key,
                CacheEntry {
                    prompt: prompt.to_string(),
                    embedding: vector,
                    response: response.to_string(),
                    metadata,
                    created_at,
                },
                slot,
            );
        }
        self.persist_locked(&state);
    }

    /// Drop every entry and zero the counters, then persist the empty
    /// snapshot and append a CLEAR history record.
    pub async fn clear(&self) {
        {
            let mut state = self.state.write().await;
            state.store.reset();
            state.index.reset();
            self.stats.reset();
            self.persist_locked(&state);
        }
        self.log_history("N/A", 0.0, HistoryAction::Clear);
        info!("cache cleared");
    }

    /// Current statistics.
    pub async fn stats(&self) -> CacheStats {
        let cache_size = self.state.read().await.store.len();
        let counters = self.stats.snapshot();
        let enabled = self.is_enabled();
        CacheStats {
            enabled,
            cache_size,
            hit_count: counters.hits,
            miss_count: counters.misses,
            hit_rate: hit_rate(counters.hits, counters.misses),
            total_saved_cost: round_to(counters.saved_cost, 6),
            status: if enabled { STATUS_READY } else { STATUS_DISABLED }.to_string(),
        }
    }

    // ===== Runtime controls (the host adapter surface) =====

    /// Whether wrapped calls consult the cache.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Toggle the cache for wrapped calls. Returns the previous state.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::Relaxed)
    }

    /// The current similarity threshold.
    pub fn similarity_threshold(&self) -> f32 {
        self.tuning_values().0
    }

    /// Set the similarity threshold, effective for subsequent lookups.
    /// Must be in `[0, 1]`. Not persisted — hosts that want persistence
    /// save [`config`](Self::config).
    pub fn set_similarity_threshold(&self, threshold: f32) -> Result<()> {
        validate_threshold(threshold)?;
        self.tuning_mut().similarity_threshold = threshold;
        Ok(())
    }

    /// The current entry time-to-live in seconds.
    pub fn ttl_seconds(&self) -> u64 {
        self.tuning_values().1
    }

    /// Set the entry time-to-live, effective for subsequent lookups.
    pub fn set_ttl_seconds(&self, ttl_seconds: u64) {
        self.tuning_mut().ttl_seconds = ttl_seconds;
    }

    /// A [`CacheConfig`] reflecting current runtime values, for hosts
    /// that persist configuration.
    pub fn config(&self) -> CacheConfig {
        let (similarity_threshold, ttl_seconds) = self.tuning_values();
        CacheConfig {
            model_name: self.model_name.clone(),
            cache_path: self.cache_path.clone(),
            enabled: self.is_enabled(),
            ttl_seconds,
            similarity_threshold,
        }
    }

    /// The configured model name.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// The embedder's vector dimension.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// The snapshot directory.
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    // ===== History =====

    /// The most recent `limit` HIT/STORE/CLEAR events, oldest first.
    pub fn recent_history(&self, limit: usize) -> Vec<HistoryRecord> {
        self.history.recent(limit)
    }

    /// Recent history as a pretty-printed JSON array.
    pub fn export_history_json(&self, limit: usize) -> Result<String> {
        self.history.export_json(limit)
    }

    /// Recent history as CSV with a header row.
    pub fn export_history_csv(&self, limit: usize) -> String {
        self.history.export_csv(limit)
    }

    pub(crate) fn log_history(&self, prompt: &str, similarity: f32, action: HistoryAction) {
        if let Err(e) = self.history.append(prompt, similarity, action) {
            warn!(error = %e, "failed to append history record");
        }
    }

    // ===== Internals =====

    fn count_miss(&self) {
        self.stats.record_miss();
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
    }

    /// Write the snapshot while the write guard is held, so it always
    /// completes before the next snapshot or clear.
    fn persist_locked(&self, state: &CacheState) {
        let counters = self.stats.snapshot();
        if let Err(e) = snapshot::save(
            &self.cache_path,
            state.store.entries(),
            state.index.as_ref(),
            &counters,
        ) {
            warn!(
                path = %self.cache_path.display(),
                error = %e,
                "snapshot write failed, continuing in-memory"
            );
        }
        metrics::gauge!(telemetry::CACHE_ENTRIES).set(state.store.len() as f64);
    }

    fn tuning_values(&self) -> (f32, u64) {
        let tuning = self
            .tuning
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        (tuning.similarity_threshold, tuning.ttl_seconds)
    }

    fn tuning_mut(&self) -> std::sync::RwLockWriteGuard<'_, Tuning> {
        self.tuning
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use tempfile::TempDir;

    fn test_cache(dir: &Path) -> SemanticCache {
        SemanticCache::with_embedder(
            CacheConfig::new().cache_path(dir),
            Arc::new(HashEmbedder::new(64)),
        )
        .expect("config is valid")
    }

    #[tokio::test]
    async fn store_and_index_sizes_stay_equal() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(dir.path());

        for (prompt, response) in [
            ("how do I sort a list", "use sorted()"),
            ("how do I reverse a string", "slice backwards"),
            ("how do I sort a list", "sorted() again"),
        ] {
            cache.add(prompt, response).await;
            let state = cache.state.read().await;
            assert_eq!(state.store.len(), state.index.len());
        }

        cache.clear().await;
        let state = cache.state.read().await;
        assert_eq!(state.store.len(), 0);
        assert_eq!(state.index.len(), 0);
    }

    #[tokio::test]
    async fn readmission_keeps_one_slot() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(dir.path());

        cache.add("alpha beta gamma", "X").await;
        cache.add("alpha beta gamma", "Y").await;

        let state = cache.state.read().await;
        assert_eq!(state.store.len(), 1);
        assert_eq!(state.index.len(), 1);
        let key = fingerprint("alpha beta gamma");
        assert_eq!(state.store.get(&key).unwrap().response, "Y");
        assert_eq!(state.store.slot_for(&key), Some(0));
    }

    #[tokio::test]
    async fn dangling_slot_is_served_as_miss() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(dir.path());

        cache.add("orphaned entry prompt", "response").await;
        {
            let mut state = cache.state.write().await;
            state.store.delete(&fingerprint("orphaned entry prompt"));
        }

        assert!(cache.lookup("orphaned entry prompt").await.is_none());
        assert_eq!(cache.stats().await.miss_count, 1);
    }

    #[tokio::test]
    async fn lookup_observed_reports_similarity_on_miss() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(dir.path());

        let outcome = cache.lookup_observed("anything at all").await;
        assert!(outcome.result.is_none());
        assert_eq!(outcome.observed_similarity, 0.0);

        cache.add("completely different words", "r").await;
        let outcome = cache.lookup_observed("anything at all").await;
        assert!(outcome.result.is_none());
        assert!(outcome.observed_similarity > 0.0 && outcome.observed_similarity < 0.8);
    }

    #[tokio::test]
    async fn lookup_outcome_carries_the_embedding() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(dir.path());

        let outcome = cache.lookup_observed("a prompt worth admitting").await;
        let vector = outcome.vector.expect("embedding succeeded");
        assert_eq!(vector.len(), cache.dimension());

        // Admitting with the carried vector behaves exactly like `add`.
        cache
            .admit("a prompt worth admitting", "response", BTreeMap::new(), vector)
            .await;
        let hit = cache.lookup("a prompt worth admitting").await.unwrap();
        assert_eq!(hit.similarity, 1.0);
        assert_eq!(hit.response, "response");
    }
}
