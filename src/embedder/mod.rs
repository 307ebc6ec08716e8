//! Prompt embedding.
//!
//! [`Embedder`] is the capability the cache needs: map text to a dense
//! float vector of a fixed dimension, deterministically. Two
//! implementations ship:
//!
//! - [`FastEmbedder`] — a pretrained sentence-embedding model via
//!   fastembed-rs (requires the `local-embeddings` feature; downloads
//!   the model on first use).
//! - [`HashEmbedder`] — a dependency-free token-hash projection. Used
//!   when the feature is off and throughout the test suite. Identical
//!   inputs produce identical vectors, but "similarity" degrades to
//!   token overlap rather than meaning.
//!
//! [`MemoizedEmbedder`] can wrap either one with a bounded in-memory
//! memo — embedding is deterministic, so memoization is always safe.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::telemetry;

mod hashed;
pub use hashed::HashEmbedder;

#[cfg(feature = "local-embeddings")]
mod fastembed;
#[cfg(feature = "local-embeddings")]
pub use self::fastembed::FastEmbedder;

/// Maps a prompt to a fixed-dimension float vector.
///
/// Determinism contract: identical input bytes yield identical vectors
/// within one process, and agree across processes to within
/// floating-point tolerance. The dimension is fixed for the lifetime of
/// the instance.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Name of the underlying model, for logs and snapshot diagnostics.
    fn model_name(&self) -> &str;

    /// Vector dimension `D`. Every vector returned by
    /// [`embed`](Self::embed) has exactly this length.
    fn dimension(&self) -> usize;

    /// Embed one prompt.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Dimension of the named model, when it is one we know.
pub(crate) fn known_model_dimension(model_name: &str) -> Option<usize> {
    match model_name {
        "all-MiniLM-L6-v2" | "all-MiniLM-L12-v2" | "BGE-small-en" => Some(384),
        "BGE-base-en" => Some(768),
        _ => None,
    }
}

/// Build the embedder selected by `config.model_name`, memoized.
#[cfg(feature = "local-embeddings")]
pub(crate) fn from_config(config: &CacheConfig) -> Result<Arc<dyn Embedder>> {
    let inner = FastEmbedder::load(&config.model_name)?;
    Ok(Arc::new(MemoizedEmbedder::new(Arc::new(inner))))
}

/// Build the embedder selected by `config.model_name`, memoized.
///
/// Without the `local-embeddings` feature no pretrained model can load;
/// the deterministic [`HashEmbedder`] stands in at the dimension the
/// named model would have had (384 for unrecognized names).
#[cfg(not(feature = "local-embeddings"))]
pub(crate) fn from_config(config: &CacheConfig) -> Result<Arc<dyn Embedder>> {
    let dimension =
        known_model_dimension(&config.model_name).unwrap_or(HashEmbedder::DEFAULT_DIMENSION);
    tracing::warn!(
        model = %config.model_name,
        dimension,
        "local-embeddings feature disabled; using hash-projection embedder"
    );
    Ok(Arc::new(MemoizedEmbedder::new(Arc::new(HashEmbedder::new(
        dimension,
    )))))
}

/// Default capacity of the embedding memo.
const DEFAULT_MEMO_CAPACITY: u64 = 10_000;

/// Memoizing wrapper around an [`Embedder`].
///
/// Keyed on a content hash of `(model, text)`. Bounded LRU (moka);
/// no TTL — embeddings never go stale. Emits embed-memo hit/miss
/// metrics.
pub struct MemoizedEmbedder {
    inner: Arc<dyn Embedder>,
    memo: moka::sync::Cache<u64, Vec<f32>>,
}

impl MemoizedEmbedder {
    /// Wrap `inner` with the default memo capacity (10,000 entries).
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        Self::with_capacity(inner, DEFAULT_MEMO_CAPACITY)
    }

    /// Wrap `inner` with a custom memo capacity.
    pub fn with_capacity(inner: Arc<dyn Embedder>, max_entries: u64) -> Self {
        Self {
            inner,
            memo: moka::sync::Cache::new(max_entries),
        }
    }
}

#[async_trait]
impl Embedder for MemoizedEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = memo_key(self.inner.model_name(), text);
        if let Some(vector) = self.memo.get(&key) {
            metrics::counter!(telemetry::EMBED_CACHE_HITS_TOTAL).increment(1);
            return Ok(vector);
        }
        metrics::counter!(telemetry::EMBED_CACHE_MISSES_TOTAL).increment(1);

        let vector = self.inner.embed(text).await?;
        self.memo.insert(key, vector.clone());
        Ok(vector)
    }
}

/// Compute a memo key from model and input text.
///
/// Uses `DefaultHasher` (SipHash) — deterministic within a process
/// lifetime, which is sufficient for an in-memory memo.
fn memo_key(model: &str, text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    model.hash(&mut hasher);
    text.hash(&mut hasher);
    hasher.finish()
}
