//! Tests for [`SemanticCache`] — facade operations over a deterministic
//! embedder.

use std::path::Path;
use std::sync::Arc;

use mimir::embedder::HashEmbedder;
use mimir::{CacheConfig, SemanticCache};
use tempfile::TempDir;

fn test_config(dir: &Path) -> CacheConfig {
    CacheConfig::new().cache_path(dir)
}

fn test_cache(dir: &Path) -> SemanticCache {
    SemanticCache::with_embedder(test_config(dir), Arc::new(HashEmbedder::new(64)))
        .expect("valid config")
}

// =========================================================================
// Lookup basics
// =========================================================================

#[tokio::test]
async fn empty_index_lookup_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());

    assert!(cache.lookup("anything at all here").await.is_none());

    let stats = cache.stats().await;
    assert_eq!(stats.miss_count, 1);
    assert_eq!(stats.hit_count, 0);
}

#[tokio::test]
async fn add_then_exact_lookup_hits_with_similarity_one() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());

    cache
        .add("How do I sort a list in Python?", "Use the sorted() function.")
        .await;

    let hit = cache
        .lookup("How do I sort a list in Python?")
        .await
        .expect("exact prompt should hit");
    assert_eq!(hit.response, "Use the sorted() function.");
    assert_eq!(hit.similarity, 1.0);
    assert_eq!(hit.original_query, "How do I sort a list in Python?");

    let stats = cache.stats().await;
    assert_eq!(stats.hit_count, 1);
    assert_eq!(stats.miss_count, 0);
}

#[tokio::test]
async fn unrelated_prompt_is_a_miss_at_default_threshold() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());

    cache
        .add("How do I sort a list in Python?", "Use the sorted() function.")
        .await;

    assert!(cache.lookup("What is the weather today?").await.is_none());
    assert_eq!(cache.stats().await.miss_count, 1);
}

// =========================================================================
// Threshold boundaries
// =========================================================================

#[tokio::test]
async fn threshold_zero_hits_on_any_entry() {
    let dir = TempDir::new().unwrap();
    let cache = SemanticCache::with_embedder(
        test_config(dir.path()).similarity_threshold(0.0),
        Arc::new(HashEmbedder::new(64)),
    )
    .unwrap();

    cache.add("alpha beta gamma", "stored response").await;

    let hit = cache
        .lookup("entirely unrelated query text")
        .await
        .expect("threshold 0 accepts any neighbor");
    assert_eq!(hit.response, "stored response");
    assert!(hit.similarity < 1.0);
}

#[tokio::test]
async fn threshold_one_never_hits_non_identical_prompts() {
    let dir = TempDir::new().unwrap();
    let cache = SemanticCache::with_embedder(
        test_config(dir.path()).similarity_threshold(1.0),
        Arc::new(HashEmbedder::new(64)),
    )
    .unwrap();

    cache.add("how do I sort a list", "use sorted").await;

    assert!(cache.lookup("how do I sort a vector").await.is_none());
    // The identical prompt still matches at distance zero.
    assert!(cache.lookup("how do I sort a list").await.is_some());
}

#[tokio::test]
async fn threshold_changes_take_effect_immediately() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());

    cache.add("alpha beta gamma", "response").await;

    cache.set_similarity_threshold(0.0).unwrap();
    assert!(cache.lookup("unrelated query words").await.is_some());

    cache.set_similarity_threshold(0.95).unwrap();
    assert!(cache.lookup("unrelated query words").await.is_none());
}

#[tokio::test]
async fn out_of_range_threshold_is_rejected() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());

    assert!(cache.set_similarity_threshold(1.5).is_err());
    assert!(cache.set_similarity_threshold(-0.1).is_err());
    // The previous value survives a rejected update.
    assert_eq!(cache.similarity_threshold(), 0.8);
}

// =========================================================================
// TTL
// =========================================================================

#[tokio::test]
async fn zero_ttl_expires_immediately() {
    let dir = TempDir::new().unwrap();
    let cache = SemanticCache::with_embedder(
        test_config(dir.path()).ttl_seconds(0),
        Arc::new(HashEmbedder::new(64)),
    )
    .unwrap();

    cache.add("foo bar baz", "qux").await;

    assert!(cache.lookup("foo bar baz").await.is_none());
    let stats = cache.stats().await;
    assert_eq!(stats.miss_count, 1);
    assert_eq!(stats.hit_count, 0);
}

#[tokio::test]
async fn ttl_changes_take_effect_immediately() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());

    cache.add("some prompt here", "response").await;
    assert!(cache.lookup("some prompt here").await.is_some());

    cache.set_ttl_seconds(0);
    assert!(cache.lookup("some prompt here").await.is_none());

    cache.set_ttl_seconds(3600);
    assert!(cache.lookup("some prompt here").await.is_some());
}

// =========================================================================
// Re-admission
// =========================================================================

#[tokio::test]
async fn readmission_overwrites_in_place() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());

    cache.add("alpha beta gamma", "X").await;
    cache.add("alpha beta gamma", "Y").await;

    let stats = cache.stats().await;
    assert_eq!(stats.cache_size, 1);

    let hit = cache.lookup("alpha beta gamma").await.unwrap();
    assert_eq!(hit.response, "Y");
}

// =========================================================================
// Clear
// =========================================================================

#[tokio::test]
async fn clear_resets_store_and_counters() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());

    cache.add("one two three", "r1").await;
    cache.add("four five six", "r2").await;
    cache.lookup("one two three").await;
    cache.lookup("nothing like the others").await;

    cache.clear().await;

    let stats = cache.stats().await;
    assert_eq!(stats.cache_size, 0);
    assert_eq!(stats.hit_count, 0);
    assert_eq!(stats.miss_count, 0);
    assert_eq!(stats.total_saved_cost, 0.0);

    assert!(cache.lookup("one two three").await.is_none());
}

// =========================================================================
// Stats projection
// =========================================================================

#[tokio::test]
async fn stats_shape_and_hit_rate_rounding() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());

    cache.add("one two three", "r").await;
    cache.lookup("one two three").await;
    cache.lookup("unrelated thing alpha").await;
    cache.lookup("unrelated thing beta").await;

    let stats = cache.stats().await;
    assert!(stats.enabled);
    assert_eq!(stats.cache_size, 1);
    assert_eq!(stats.hit_count, 1);
    assert_eq!(stats.miss_count, 2);
    assert_eq!(stats.hit_rate, 0.3333);
    assert_eq!(stats.status, "semantic cache loaded and ready");
}

#[tokio::test]
async fn hit_rate_is_zero_without_traffic() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());
    assert_eq!(cache.stats().await.hit_rate, 0.0);
}

// =========================================================================
// Runtime controls
// =========================================================================

#[tokio::test]
async fn enable_toggle_reports_previous_state() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());

    assert!(cache.is_enabled());
    assert!(cache.set_enabled(false));
    assert!(!cache.is_enabled());
    assert!(!cache.set_enabled(true));
    assert!(cache.is_enabled());
}

#[tokio::test]
async fn config_reflects_runtime_values() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());

    cache.set_similarity_threshold(0.9).unwrap();
    cache.set_ttl_seconds(120);
    cache.set_enabled(false);

    let config = cache.config();
    assert_eq!(config.similarity_threshold, 0.9);
    assert_eq!(config.ttl_seconds, 120);
    assert!(!config.enabled);
    assert_eq!(config.cache_path, dir.path());
}

// =========================================================================
// Direct add skips admission on purpose
// =========================================================================

#[tokio::test]
async fn direct_add_stores_even_junk_prompts() {
    let dir = TempDir::new().unwrap();
    let cache = test_cache(dir.path());

    // `add` is unconditional; admission is the wrapper's gate.
    cache.add("hi", "hello there").await;
    assert_eq!(cache.stats().await.cache_size, 1);
    assert!(cache.lookup("hi").await.is_some());
}
