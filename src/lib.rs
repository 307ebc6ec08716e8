//! Mimir - semantic response cache for LLM calls
//!
//! This crate sits between a client and an expensive model endpoint: a
//! call through the cache either returns a previously computed response
//! whose prompt is *semantically near* the incoming prompt, or forwards
//! the call, stores the fresh response, and returns it. Entries are
//! keyed by a content fingerprint and searched by embedding distance;
//! state is snapshotted to disk and recovered on restart.
//!
//! # Wrapping a model call
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mimir::{CacheConfig, ModelOutput, SemanticCache};
//!
//! # async fn call_model(prompt: String) -> Result<ModelOutput, std::io::Error> {
//! #     Ok(ModelOutput::from("a completion"))
//! # }
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let cache = Arc::new(SemanticCache::open(
//!         CacheConfig::new()
//!             .cache_path("./semantic_cache")
//!             .similarity_threshold(0.8)
//!             .ttl_seconds(3600),
//!     )?);
//!
//!     let cached_call = cache.wrap(call_model);
//!     let response = cached_call("How do I sort a list in Python?".to_string())
//!         .await
//!         .expect("model call failed");
//!
//!     println!("{} ({:?})", response.response, response.cache_status);
//!     Ok(())
//! }
//! ```
//!
//! # Direct operations
//!
//! ```rust,no_run
//! # use mimir::{CacheConfig, SemanticCache};
//! # #[tokio::main]
//! # async fn main() -> mimir::Result<()> {
//! let cache = SemanticCache::open(CacheConfig::new())?;
//!
//! cache.add("How do I sort a list in Python?", "Use the sorted() function.").await;
//! if let Some(hit) = cache.lookup("How can I sort a list in Python?").await {
//!     println!("{} (similarity {:.2})", hit.response, hit.similarity);
//! }
//! println!("{:?}", cache.stats().await);
//! # Ok(())
//! # }
//! ```
//!
//! Real semantic matching needs the `local-embeddings` feature, which
//! embeds prompts with a MiniLM-class sentence model via fastembed
//! (downloaded on first use). Without it, a deterministic
//! token-hash embedder stands in: exact and token-overlapping prompts
//! still match, paraphrases don't.

pub mod cache;
pub mod config;
pub mod embedder;
pub mod error;
pub mod history;
pub mod index;
pub mod policy;
pub mod stats;
pub mod store;
pub mod telemetry;

// Re-export main types at crate root
pub use cache::wrap::{CacheStatus, ModelOutput, ModelResponse};
pub use cache::{LookupResult, SemanticCache};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use history::{HistoryAction, HistoryRecord};
pub use stats::{CacheStats, StatsSnapshot};
