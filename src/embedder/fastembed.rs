//! Local sentence embeddings via fastembed-rs.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Embedder, known_model_dimension};
use crate::error::{CacheError, Result};

/// Pretrained sentence-embedding model, loaded locally through
/// fastembed-rs.
///
/// The model is downloaded on first use and cached under
/// `$MIMIR_CACHE_DIR` (or the platform cache dir). Inference is
/// synchronous ONNX execution, so [`embed`](Embedder::embed) moves it
/// onto the blocking pool.
pub struct FastEmbedder {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedder {
    /// Load the named model, downloading it if not cached locally.
    ///
    /// Supported names: `all-MiniLM-L6-v2` (default), `all-MiniLM-L12-v2`,
    /// `BGE-small-en`, `BGE-base-en`. Anything else, or a failed model
    /// load, is an [`Init`](CacheError::Init) error.
    pub fn load(model_name: &str) -> Result<Self> {
        let model = match model_name {
            "all-MiniLM-L6-v2" => fastembed::EmbeddingModel::AllMiniLML6V2,
            "all-MiniLM-L12-v2" => fastembed::EmbeddingModel::AllMiniLML12V2,
            "BGE-small-en" => fastembed::EmbeddingModel::BGESmallENV15,
            "BGE-base-en" => fastembed::EmbeddingModel::BGEBaseENV15,
            other => {
                return Err(CacheError::Init(format!(
                    "unsupported embedding model: {other}"
                )));
            }
        };
        let dimension = known_model_dimension(model_name)
            .ok_or_else(|| CacheError::Init(format!("unknown dimension for {model_name}")))?;

        let options = fastembed::InitOptions::new(model)
            .with_show_download_progress(true)
            .with_cache_dir(model_cache_dir());

        let instance = fastembed::TextEmbedding::try_new(options)
            .map_err(|e| CacheError::Init(format!("failed to load {model_name}: {e}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(instance)),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

/// Where downloaded model files live: `$MIMIR_CACHE_DIR`, else the
/// platform cache dir, else `.cache/` relative to the working dir.
fn model_cache_dir() -> PathBuf {
    std::env::var("MIMIR_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("mimir")
                .join("models")
        })
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_owned();
        let model = Arc::clone(&self.model);

        // fastembed is sync; run it on the blocking pool.
        let values = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| CacheError::Embedding(format!("model lock poisoned: {e}")))?;
            let mut vectors = model
                .embed(vec![text], None)
                .map_err(|e| CacheError::Embedding(format!("inference failed: {e}")))?;
            vectors
                .pop()
                .ok_or_else(|| CacheError::Embedding("no embedding returned".to_string()))
        })
        .await
        .map_err(|e| CacheError::Embedding(format!("task join error: {e}")))??;

        if values.len() != self.dimension {
            return Err(CacheError::DimensionMismatch {
                expected: self.dimension,
                got: values.len(),
            });
        }
        Ok(values)
    }
}
