//! Snapshot persistence for the cache triple.
//!
//! A snapshot is `cache.json` + `index.vec` + `stats.json`, written
//! whole-file with atomic per-file replacement (tmp + rename) followed
//! by a best-effort directory fsync. A crash leaves either the old
//! triple or a corrupt one; [`load`] detects the latter and the caller
//! starts empty, leaving the files on disk untouched for forensics.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::warn;

use super::{CacheEntry, Store};
use crate::error::{CacheError, Result};
use crate::index::{FlatIndex, VectorIndex};
use crate::stats::StatsSnapshot;

/// Entry snapshot file, an object keyed by fingerprint.
pub const CACHE_FILE: &str = "cache.json";

/// Vector index snapshot file.
pub const INDEX_FILE: &str = "index.vec";

/// Counter snapshot file.
pub const STATS_FILE: &str = "stats.json";

/// Write `bytes` to `path` atomically: tmp file with a PID suffix (so
/// concurrent processes don't collide), then rename over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| CacheError::Persist(format!("no file name in {}", path.display())))?;
    let tmp_path = path.with_file_name(format!(
        "{}.tmp.{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    std::fs::write(&tmp_path, bytes).map_err(|e| {
        CacheError::Persist(format!("failed to write {}: {e}", tmp_path.display()))
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        CacheError::Persist(format!(
            "failed to rename {} → {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })?;
    Ok(())
}

/// Write the full snapshot triple under `dir`.
pub fn save(
    dir: &Path,
    entries: &BTreeMap<String, CacheEntry>,
    index: &dyn VectorIndex,
    stats: &StatsSnapshot,
) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        CacheError::Persist(format!("failed to create cache dir {}: {e}", dir.display()))
    })?;

    let entries_json = serde_json::to_string_pretty(entries)?;
    write_atomic(&dir.join(CACHE_FILE), entries_json.as_bytes())?;

    index.save(&dir.join(INDEX_FILE))?;

    let stats_json = serde_json::to_string_pretty(stats)?;
    write_atomic(&dir.join(STATS_FILE), stats_json.as_bytes())?;

    // Make the renames durable. Opening a directory for fsync is not
    // portable, so failures are ignored.
    if let Ok(handle) = std::fs::File::open(dir) {
        let _ = handle.sync_all();
    }
    Ok(())
}

/// State recovered from a snapshot.
pub struct LoadedSnapshot {
    pub store: Store,
    pub index: FlatIndex,
    pub stats: StatsSnapshot,
}

/// Load the snapshot triple from `dir`, verifying it against the live
/// embedder dimension.
///
/// Returns `Ok(None)` when no snapshot exists (fresh directory) and
/// `Err(CorruptSnapshot)` when any member of the triple is unreadable,
/// the `index.vec` header disagrees with `expected_dimension`, any
/// entry's embedding has the wrong length, or the entry and index
/// counts diverge (a partial write).
///
/// Slot ids are reassigned from scratch in fingerprint order — the
/// bijection is only stable within one process lifetime — so the live
/// index is rebuilt from the persisted embeddings rather than trusting
/// `index.vec` row order.
pub fn load(dir: &Path, expected_dimension: usize) -> Result<Option<LoadedSnapshot>> {
    let cache_path = dir.join(CACHE_FILE);
    let content = match std::fs::read_to_string(&cache_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CacheError::CorruptSnapshot(format!(
                "{}: {e}",
                cache_path.display()
            )));
        }
    };

    let entries: BTreeMap<String, CacheEntry> = serde_json::from_str(&content)
        .map_err(|e| CacheError::CorruptSnapshot(format!("{}: {e}", cache_path.display())))?;

    for (fingerprint, entry) in &entries {
        if entry.embedding.len() != expected_dimension {
            return Err(CacheError::CorruptSnapshot(format!(
                "entry {fingerprint} has dimension {}, embedder reports {expected_dimension}",
                entry.embedding.len()
            )));
        }
    }

    let persisted = FlatIndex::load(&dir.join(INDEX_FILE))?;
    if persisted.dimension() != expected_dimension {
        return Err(CacheError::CorruptSnapshot(format!(
            "index dimension {} disagrees with embedder dimension {expected_dimension}",
            persisted.dimension()
        )));
    }
    if persisted.len() != entries.len() {
        return Err(CacheError::CorruptSnapshot(format!(
            "index holds {} vectors for {} entries",
            persisted.len(),
            entries.len()
        )));
    }

    let mut index = FlatIndex::new(expected_dimension);
    let mut store = Store::new();
    for (fingerprint, entry) in entries {
        let slot = index.add(&entry.embedding)?;
        store.insert(fingerprint, entry, slot);
    }

    let stats = load_stats(dir);

    Ok(Some(LoadedSnapshot {
        store,
        index,
        stats,
    }))
}

/// Load `stats.json`, tolerating absence and corruption (zeros).
fn load_stats(dir: &Path) -> StatsSnapshot {
    let path = dir.join(STATS_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to read stats snapshot");
            }
            return StatsSnapshot::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(stats) => stats,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt stats snapshot, starting from zero");
            StatsSnapshot::default()
        }
    }
}
