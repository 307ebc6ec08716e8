//! Admission, similarity gate, and TTL policy.
//!
//! Three independent predicates, combined by the facade:
//!
//! - **Admission** gates whether a prompt may be *stored*; it never
//!   blocks lookups. Short or junk prompts ("hi", "ok", …) carry no
//!   semantic signal worth indexing.
//! - **Similarity gate** accepts a nearest neighbor at or above the
//!   runtime threshold.
//! - **TTL** bounds entry age at lookup time. Expired entries are
//!   reported as misses and physically remain until the same
//!   fingerprint is re-admitted.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

/// Prompts composed exclusively of these tokens are never admitted.
const JUNK_TOKENS: &[&str] = &[
    "hi", "hello", "test", "ok", "okay", "hmm", "huh", "hiii", "hlo",
];

/// Whether a prompt may be stored in the cache.
///
/// Admissible means: non-empty after trimming, at least 3
/// whitespace-separated tokens, and not made up entirely of junk
/// tokens (case-insensitive).
pub fn is_admissible(prompt: &str) -> bool {
    let tokens: Vec<&str> = prompt.split_whitespace().collect();
    if tokens.len() < 3 {
        return false;
    }
    !tokens
        .iter()
        .all(|t| JUNK_TOKENS.contains(&t.to_lowercase().as_str()))
}

/// Whether a nearest-neighbor similarity clears the threshold.
pub fn accepts(similarity: f32, threshold: f32) -> bool {
    similarity >= threshold
}

/// Whether an entry created at `created_at` (RFC 3339) is still live at
/// `now` under `ttl_seconds`.
///
/// An unparseable timestamp is treated as expired — a conservative miss;
/// the entry stays on disk until overwritten. Timestamps in the future
/// (clock skew) are live.
pub fn is_live(created_at: &str, now: DateTime<Utc>, ttl_seconds: u64) -> bool {
    let created = match DateTime::parse_from_rfc3339(created_at) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            warn!(timestamp = created_at, error = %e, "unparseable entry timestamp, treating as expired");
            return false;
        }
    };
    let ttl = Duration::seconds(ttl_seconds.min(i64::MAX as u64) as i64);
    now.signed_duration_since(created) <= ttl
}
