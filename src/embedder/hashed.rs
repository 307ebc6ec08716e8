//! Deterministic hash-projection embedder.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::Result;

/// Token-hash projection embedder.
///
/// Each lowercased whitespace token is hashed (SHA-256, so the vectors
/// agree across processes) and scattered into a handful of signed
/// positions; the sum is L2-normalized. The result is a bag-of-words
/// vector: identical prompts map to identical vectors, prompts sharing
/// tokens land nearby, disjoint prompts are near-orthogonal.
///
/// This is not a sentence encoder — paraphrases with no shared tokens
/// won't match. It exists so the cache is fully functional (and
/// testable) without the `local-embeddings` feature and its model
/// downloads.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    model_name: String,
    dimension: usize,
}

/// Positions each token is scattered into.
const WRITES_PER_TOKEN: usize = 4;

impl HashEmbedder {
    /// Default vector dimension, matching the MiniLM-class default.
    pub const DEFAULT_DIMENSION: usize = 384;

    /// Create an embedder producing vectors of `dimension` floats.
    ///
    /// # Panics
    ///
    /// Panics if `dimension` is zero.
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "embedding dimension must be non-zero");
        Self {
            model_name: format!("hash-projection-{dimension}"),
            dimension,
        }
    }

    /// A 64-bit seed for `token`, stable across processes.
    fn token_seed(token: &str) -> u64 {
        let digest = Sha256::digest(token.as_bytes());
        u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text.split_whitespace() {
            let mut x = Self::token_seed(&token.to_lowercase());
            for _ in 0..WRITES_PER_TOKEN {
                x = splitmix64(x);
                let index = (x % self.dimension as u64) as usize;
                let sign = if x >> 63 == 1 { 1.0 } else { -1.0 };
                vector[index] += sign;
            }
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// SplitMix64 step — cheap, well-distributed successor values from one
/// seed.
fn splitmix64(state: u64) -> u64 {
    let mut z = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embed(text: &str) -> Vec<f32> {
        tokio_test::block_on(HashEmbedder::new(64).embed(text)).unwrap()
    }

    #[test]
    fn identical_text_identical_vector() {
        assert_eq!(embed("sort a list in python"), embed("sort a list in python"));
    }

    #[test]
    fn case_is_folded_per_token() {
        assert_eq!(embed("Sort A List"), embed("sort a list"));
    }

    #[test]
    fn dimension_is_respected() {
        let vector = tokio_test::block_on(HashEmbedder::new(128).embed("hello world")).unwrap();
        assert_eq!(vector.len(), 128);
    }

    #[test]
    fn vectors_are_normalized() {
        let vector = embed("an assortment of distinct tokens");
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_the_zero_vector() {
        assert!(embed("   ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn disjoint_prompts_are_far_apart() {
        let a = embed("quarterly revenue projections spreadsheet");
        let b = embed("marinara sauce simmering instructions");
        let dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!(dot.abs() < 0.5, "unexpectedly similar: dot = {dot}");
    }
}
