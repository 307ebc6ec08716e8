//! Cache configuration.
//!
//! [`CacheConfig`] carries the constructor options for
//! [`SemanticCache`](crate::SemanticCache). Hosts that want the
//! configuration to survive restarts use [`CacheConfig::load_or_init`]
//! and [`CacheConfig::save`], which read and write `cache_config.json`
//! in a directory of the host's choosing; runtime tuning on the facade
//! (threshold, TTL, enable toggle) never writes this file on its own.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CacheError, Result};
use crate::store::snapshot::write_atomic;

/// Default embedding model: MiniLM-class, 384 dimensions.
pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Default on-disk location for the snapshot triple and history log.
pub const DEFAULT_CACHE_PATH: &str = "./semantic_cache";

/// Default similarity threshold for accepting a nearest neighbor.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Default entry time-to-live, in seconds.
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// File name for host-persisted configuration.
pub const CONFIG_FILE: &str = "cache_config.json";

/// Configuration for a [`SemanticCache`](crate::SemanticCache).
///
/// ```rust
/// # use mimir::CacheConfig;
/// let config = CacheConfig::new()
///     .cache_path("/tmp/mimir-cache")
///     .ttl_seconds(600)
///     .similarity_threshold(0.85);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Embedding model name. Default: `all-MiniLM-L6-v2`.
    pub model_name: String,
    /// Directory holding `cache.json`, `index.vec`, `stats.json`, and
    /// `history.log`. Created on first save. Default: `./semantic_cache`.
    pub cache_path: PathBuf,
    /// Whether wrapped calls consult the cache. Default: `true`.
    pub enabled: bool,
    /// Entry time-to-live in seconds. Default: 3600.
    pub ttl_seconds: u64,
    /// Minimum similarity, in `[0, 1]`, for a nearest neighbor to count
    /// as a hit. Default: 0.8.
    pub similarity_threshold: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            enabled: true,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl CacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the embedding model name.
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Set the cache directory.
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    /// Enable or disable the cache.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the entry time-to-live in seconds.
    pub fn ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = ttl;
        self
    }

    /// Set the similarity threshold. Must be in `[0, 1]`; validated by
    /// [`validate`](Self::validate) at construction.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Check the config for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.similarity_threshold)
    }

    /// Load configuration from `dir/cache_config.json`, merging file
    /// values over defaults.
    ///
    /// A missing file is written back with defaults (best effort); a
    /// corrupt file is logged and ignored. Fields absent from the file
    /// keep their default values.
    pub fn load_or_init(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<CacheConfig>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt cache config, using defaults");
                    return Self::default();
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache config, using defaults");
                return Self::default();
            }
        }

        let config = Self::default();
        if let Err(e) = config.save(dir) {
            warn!(path = %path.display(), error = %e, "failed to write default cache config");
        }
        config
    }

    /// Persist this configuration to `dir/cache_config.json` (atomic
    /// write via tmp + rename).
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| {
            CacheError::Persist(format!("failed to create config dir {}: {e}", dir.display()))
        })?;
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&dir.join(CONFIG_FILE), json.as_bytes())
    }
}

/// Validate a similarity threshold value.
pub(crate) fn validate_threshold(threshold: f32) -> Result<()> {
    // NaN fails the range check as well.
    if !(0.0..=1.0).contains(&threshold) {
        return Err(CacheError::Configuration(format!(
            "similarity threshold must be in [0, 1], got {threshold}"
        )));
    }
    Ok(())
}
