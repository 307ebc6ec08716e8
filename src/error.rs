//! Mimir error types

/// Mimir error types
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The embedding model failed to load at construction.
    ///
    /// Surfaced by [`SemanticCache::open`](crate::SemanticCache::open);
    /// hosts that prefer a degraded cache over a failed start can catch
    /// this and run without caching.
    #[error("failed to initialise embedding model: {0}")]
    Init(String),

    /// A persisted snapshot disagrees with the live embedder or cannot
    /// be read back.
    ///
    /// Absorbed during load: the cache starts empty and the corrupt
    /// files are left on disk untouched for forensics.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// A snapshot write failed.
    ///
    /// Absorbed by the facade: the cache continues in-memory and the
    /// next successful `add` or `clear` retries the write.
    #[error("failed to persist snapshot: {0}")]
    Persist(String),

    #[error("JSON error: {0}")]
    Json(String),

    /// Embedding a prompt failed at runtime (not at model load).
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// A vector's length disagrees with the index dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CacheError {
    /// Whether the facade absorbs this error internally (log and serve
    /// as a miss / keep running) rather than surfacing it.
    ///
    /// Only [`Init`](Self::Init) and [`Configuration`](Self::Configuration)
    /// reach callers, and only from the constructor and the runtime
    /// tuning setters. Upstream model failures are not represented here
    /// at all — the wrapper propagates them unchanged.
    pub fn is_absorbed(&self) -> bool {
        !matches!(self, Self::Init(_) | Self::Configuration(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Json(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Persist(err.to_string())
    }
}

/// Result type alias for mimir operations
pub type Result<T> = std::result::Result<T, CacheError>;
