//! Exact flat L2 index with a versioned binary snapshot.

use std::path::Path;

use tracing::warn;

use super::VectorIndex;
use crate::error::{CacheError, Result};
use crate::store::snapshot::write_atomic;

/// Snapshot magic bytes.
const MAGIC: &[u8; 4] = b"MIMR";

/// Snapshot format version.
const FORMAT_VERSION: u32 = 1;

/// Header length: magic + version + dimension (u32) + count (u64).
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Brute-force L2 index over row-major `f32` storage.
///
/// Distances reported by [`search`](VectorIndex::search) are **squared**
/// L2 — the convention of flat-L2 index libraries. Squaring preserves
/// nearest-neighbor order, and the facade's `1/(1+d)` similarity mapping
/// is defined over this value; switching to true L2 would silently shift
/// every similarity a cache has ever persisted.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    /// Row-major vector data, `len * dimension` floats.
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for vectors of `dimension` floats.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Load a snapshot written by [`save`](VectorIndex::save).
    ///
    /// Verifies magic, version, and payload length; a reader must also
    /// check [`dimension`](VectorIndex::dimension) against its live
    /// embedder before trusting the contents.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| CacheError::CorruptSnapshot(format!("{}: {e}", path.display())))?;

        if bytes.len() < HEADER_LEN {
            return Err(CacheError::CorruptSnapshot(format!(
                "{}: truncated header ({} bytes)",
                path.display(),
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(CacheError::CorruptSnapshot(format!(
                "{}: bad magic",
                path.display()
            )));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().expect("sliced 4 bytes"));
        if version != FORMAT_VERSION {
            return Err(CacheError::CorruptSnapshot(format!(
                "{}: unsupported format version {version}",
                path.display()
            )));
        }
        let dimension = u32::from_le_bytes(bytes[8..12].try_into().expect("sliced 4 bytes")) as usize;
        let count = u64::from_le_bytes(bytes[12..20].try_into().expect("sliced 8 bytes")) as usize;

        let payload = &bytes[HEADER_LEN..];
        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                CacheError::CorruptSnapshot(format!("{}: implausible header", path.display()))
            })?;
        if payload.len() != expected {
            return Err(CacheError::CorruptSnapshot(format!(
                "{}: payload is {} bytes, header promises {expected}",
                path.display(),
                payload.len()
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("chunked 4 bytes")))
            .collect();

        Ok(Self { dimension, data })
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn add(&mut self, vector: &[f32]) -> Result<usize> {
        if vector.len() != self.dimension {
            return Err(CacheError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let slot = self.len();
        self.data.extend_from_slice(vector);
        Ok(slot)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if query.len() != self.dimension {
            warn!(
                expected = self.dimension,
                got = query.len(),
                "search query dimension mismatch"
            );
            return Vec::new();
        }
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(slot, row)| (slot, squared_l2(query, row)))
            .collect();

        // Ties resolve to the lower slot id.
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    fn reset(&mut self) {
        self.data.clear();
    }

    fn len(&self) -> usize {
        if self.dimension == 0 {
            return 0;
        }
        self.data.len() / self.dimension
    }

    fn save(&self, path: &Path) -> Result<()> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        write_atomic(path, &bytes)
    }
}

/// Squared L2 distance between two equal-length vectors.
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
