//! Telemetry metric name constants.
//!
//! Centralised metric names for mimir operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`.

/// Total semantic cache hits (lookups served from the store).
pub const CACHE_HITS_TOTAL: &str = "mimir_cache_hits_total";

/// Total semantic cache misses.
///
/// Counts every miss cause: empty index, dangling slot, TTL expiry,
/// below-threshold similarity, and embedding failure.
pub const CACHE_MISSES_TOTAL: &str = "mimir_cache_misses_total";

/// Total embed-memo hits (prompt embeddings served without running the
/// embedding model).
pub const EMBED_CACHE_HITS_TOTAL: &str = "mimir_embed_cache_hits_total";

/// Total embed-memo misses.
pub const EMBED_CACHE_MISSES_TOTAL: &str = "mimir_embed_cache_misses_total";

/// Number of entries currently in the cache. Updated after `add` and
/// `clear`.
pub const CACHE_ENTRIES: &str = "mimir_cache_entries";
