//! Fingerprint-keyed entry store.
//!
//! [`Store`] owns the cache entries and the slot↔fingerprint bijection
//! shared with the vector index. The fingerprint (SHA-256 of the prompt
//! bytes) is the stable external key; slot ids are only stable for the
//! process lifetime and are reassigned deterministically on reload.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod snapshot;

/// One admitted prompt with its embedding and cached response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Original prompt text, kept for inspection and re-indexing on
    /// reload.
    pub prompt: String,
    /// Embedding of the prompt; always the embedder's dimension.
    pub embedding: Vec<f32>,
    /// Cached model output.
    pub response: String,
    /// Free-form key→value map, persisted verbatim. The wrapper records
    /// the upstream call's cost here under `"cost"`.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// RFC 3339 UTC instant of admission. Held as the raw string so an
    /// unparseable persisted value survives round-trips (it is treated
    /// as expired until overwritten).
    #[serde(rename = "timestamp")]
    pub created_at: String,
}

/// Hex digest of the 256-bit content hash of a prompt.
pub fn fingerprint(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// In-memory entry map plus the slot↔fingerprint bijection.
///
/// Entries are keyed by fingerprint in a `BTreeMap` so iteration (and
/// therefore snapshot layout and reload order) is deterministic.
#[derive(Debug, Default)]
pub struct Store {
    entries: BTreeMap<String, CacheEntry>,
    /// Slot id → fingerprint, in index insertion order. A slot whose
    /// fingerprint is no longer in `entries` is dangling and resolves
    /// to `None`.
    slots: Vec<String>,
    slot_by_fingerprint: HashMap<String, usize>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by fingerprint.
    pub fn get(&self, fingerprint: &str) -> Option<&CacheEntry> {
        self.entries.get(fingerprint)
    }

    /// Mutable lookup by fingerprint.
    pub fn get_mut(&mut self, fingerprint: &str) -> Option<&mut CacheEntry> {
        self.entries.get_mut(fingerprint)
    }

    /// The slot bound to `fingerprint`, if any.
    pub fn slot_for(&self, fingerprint: &str) -> Option<usize> {
        self.slot_by_fingerprint.get(fingerprint).copied()
    }

    /// Resolve a slot id to its entry. `None` for unknown or dangling
    /// slots.
    pub fn entry_at_slot(&self, slot: usize) -> Option<&CacheEntry> {
        self.entries.get(self.slots.get(slot)?)
    }

    /// Insert a new entry bound to a freshly allocated index slot.
    ///
    /// The caller must have obtained `slot` from the index for this
    /// entry's embedding; slots arrive in sequence, matching the
    /// index's zero-based allocation.
    pub fn insert(&mut self, fingerprint: String, entry: CacheEntry, slot: usize) {
        debug_assert_eq!(slot, self.slots.len(), "slots must arrive in sequence");
        self.entries.insert(fingerprint.clone(), entry);
        self.slot_by_fingerprint.insert(fingerprint.clone(), slot);
        self.slots.push(fingerprint);
    }

    /// Remove an entry by fingerprint, leaving its slot dangling.
    ///
    /// The vector index has no removal operation, so the slot stays
    /// behind and resolves to `None` until the next `reset`.
    pub fn delete(&mut self, fingerprint: &str) -> Option<CacheEntry> {
        self.slot_by_fingerprint.remove(fingerprint);
        self.entries.remove(fingerprint)
    }

    /// Iterate entries in fingerprint order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }

    /// The entry map, for snapshotting.
    pub(crate) fn entries(&self) -> &BTreeMap<String, CacheEntry> {
        &self.entries
    }

    /// Drop all entries and slot bindings.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.slots.clear();
        self.slot_by_fingerprint.clear();
    }
}
