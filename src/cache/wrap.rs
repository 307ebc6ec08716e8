//! Async wrapping of a user-supplied model call.
//!
//! [`SemanticCache::wrap`] turns `async fn(prompt) -> ModelOutput` into
//! an async function with lookup-then-store behavior: a hit returns a
//! synthesized [`ModelResponse`] without invoking the model; a miss
//! invokes it, stores the response when the prompt is admissible, and
//! tags the result with [`CacheStatus`] and the observed similarity.
//!
//! Upstream failures propagate unchanged through the generic error
//! parameter — a failed call never pollutes the cache. The hot path
//! embeds exactly once and suspends only there and in the model call
//! (plus state-lock acquisition, which never waits on I/O): a store
//! reuses the embedding the lookup already computed instead of
//! embedding the same prompt again.
//!
//! Concurrent misses for the same prompt are not coalesced: both invoke
//! the model, and the later completion overwrites the entry. That keeps
//! the wrapper lock-free between its two awaits.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{COST_METADATA_KEY, SemanticCache};
use crate::history::HistoryAction;
use crate::policy;

/// Where a wrapped response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    /// Served from the cache; the model was not invoked.
    Hit,
    /// The model was invoked and the response was not stored.
    Miss,
    /// The model was invoked and the response was admitted. The
    /// synthesized record reports `similarity = 1.0`; this status, not
    /// the similarity, is what distinguishes it from a later HIT.
    Store,
}

/// Uniform response record for wrapped calls.
///
/// Mirrors the record shape routers commonly return (`model_used`,
/// `latency`, `cost`, token counts); all of those are optional so a
/// bare-string model can be lifted losslessly via
/// [`ModelOutput::Text`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The model output text.
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,
    /// Attached by the wrapper: nearest-neighbor similarity observed
    /// during lookup (`1.0` on STORE, `0.0` when the index was empty).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    /// Attached by the wrapper on HIT, MISS, and STORE. Absent on
    /// pass-through when the cache is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_status: Option<CacheStatus>,
}

impl ModelResponse {
    /// Lift a bare response string; every other field stays unset.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            response: text.into(),
            ..Self::default()
        }
    }

    /// The record the wrapper synthesizes for cache-served responses.
    pub(crate) fn cached(text: impl Into<String>, similarity: f32, status: CacheStatus) -> Self {
        Self {
            response: text.into(),
            model_used: Some("Cached".to_string()),
            latency: Some(0.0),
            cost: Some(0.0),
            input_tokens: Some(0),
            output_tokens: Some(0),
            selected_model: Some("Cached".to_string()),
            similarity: Some(similarity),
            cache_status: Some(status),
        }
    }
}

/// What a wrapped model call may return: a bare completion string or a
/// full response record.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Text(String),
    Response(ModelResponse),
}

impl ModelOutput {
    /// The response text — the record's `response` field, or the bare
    /// string itself.
    pub fn response_text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Response(record) => &record.response,
        }
    }

    /// The upstream cost, when the record carries one.
    pub fn cost(&self) -> Option<f64> {
        match self {
            Self::Text(_) => None,
            Self::Response(record) => record.cost,
        }
    }

    /// Lift into a uniform [`ModelResponse`].
    pub fn into_response(self) -> ModelResponse {
        match self {
            Self::Text(text) => ModelResponse::from_text(text),
            Self::Response(record) => record,
        }
    }
}

impl From<String> for ModelOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ModelOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<ModelResponse> for ModelOutput {
    fn from(record: ModelResponse) -> Self {
        Self::Response(record)
    }
}

impl SemanticCache {
    /// Wrap an async model call with lookup-then-store behavior.
    ///
    /// The returned closure owns a shared handle to the cache, so it
    /// can outlive the binding it was created from. Behavior per call:
    ///
    /// 1. Cache disabled → invoke `call` and return its (lifted) result
    ///    untouched.
    /// 2. Lookup hit → synthesized record
    ///    (`model_used = "Cached"`, zeroed latency/cost/tokens,
    ///    observed similarity, [`CacheStatus::Hit`]); `call` is not
    ///    invoked.
    /// 3. Miss → invoke `call`; errors propagate unchanged and nothing
    ///    is stored.
    /// 4. Admissible prompt and non-empty response text → store, then
    ///    return a synthesized record with `similarity = 1.0` and
    ///    [`CacheStatus::Store`]. Otherwise the upstream record is
    ///    returned with [`CacheStatus::Miss`] and the observed
    ///    similarity attached.
    pub fn wrap<F, Fut, E>(
        self: &Arc<Self>,
        call: F,
    ) -> impl Fn(String) -> BoxFuture<'static, std::result::Result<ModelResponse, E>>
    + Send
    + Sync
    + 'static
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<ModelOutput, E>> + Send + 'static,
        E: Send + 'static,
    {
        let cache = Arc::clone(self);
        let call = Arc::new(call);
        move |prompt: String| -> BoxFuture<'static, std::result::Result<ModelResponse, E>> {
            let cache = Arc::clone(&cache);
            let call = Arc::clone(&call);
            Box::pin(async move { wrapped_call(cache, call, prompt).await })
        }
    }
}

async fn wrapped_call<F, Fut, E>(
    cache: Arc<SemanticCache>,
    call: Arc<F>,
    prompt: String,
) -> std::result::Result<ModelResponse, E>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = std::result::Result<ModelOutput, E>>,
{
    if !cache.is_enabled() {
        return (call.as_ref())(prompt).await.map(ModelOutput::into_response);
    }

    let outcome = cache.lookup_observed(&prompt).await;
    if let Some(found) = outcome.result {
        cache.log_history(&prompt, found.similarity, HistoryAction::Hit);
        return Ok(ModelResponse::cached(
            found.response,
            found.similarity,
            CacheStatus::Hit,
        ));
    }

    let upstream = (call.as_ref())(prompt.clone()).await?;

    let response_text = upstream.response_text().to_string();
    if policy::is_admissible(&prompt) && !response_text.is_empty() {
        // Reuse the embedding the lookup computed; when embedding
        // failed there, nothing can be indexed and the response goes
        // back uncached.
        if let Some(vector) = outcome.vector {
            let mut metadata = BTreeMap::new();
            if let Some(cost) = upstream.cost() {
                metadata.insert(COST_METADATA_KEY.to_string(), cost.to_string());
            }
            cache.admit(&prompt, &response_text, metadata, vector).await;
            cache.log_history(&prompt, 1.0, HistoryAction::Store);
            return Ok(ModelResponse::cached(
                response_text,
                1.0,
                CacheStatus::Store,
            ));
        }
    }

    debug!("response not cached (non-admissible prompt, empty response, or failed embedding)");
    let mut response = upstream.into_response();
    response.cache_status = Some(CacheStatus::Miss);
    response.similarity = Some(outcome.observed_similarity);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_output_lifts_to_bare_record() {
        let record = ModelOutput::from("hello").into_response();
        assert_eq!(record.response, "hello");
        assert!(record.model_used.is_none());
        assert!(record.cache_status.is_none());
    }

    #[test]
    fn record_output_passes_through() {
        let record = ModelResponse {
            response: "forty-two".to_string(),
            cost: Some(0.003),
            ..ModelResponse::default()
        };
        let output = ModelOutput::from(record.clone());
        assert_eq!(output.response_text(), "forty-two");
        assert_eq!(output.cost(), Some(0.003));
        assert_eq!(output.into_response(), record);
    }

    #[test]
    fn cached_record_shape() {
        let record = ModelResponse::cached("answer", 0.91, CacheStatus::Hit);
        assert_eq!(record.model_used.as_deref(), Some("Cached"));
        assert_eq!(record.selected_model.as_deref(), Some("Cached"));
        assert_eq!(record.latency, Some(0.0));
        assert_eq!(record.cost, Some(0.0));
        assert_eq!(record.input_tokens, Some(0));
        assert_eq!(record.output_tokens, Some(0));
        assert_eq!(record.similarity, Some(0.91));
        assert_eq!(record.cache_status, Some(CacheStatus::Hit));
    }

    #[test]
    fn cache_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&CacheStatus::Hit).unwrap(),
            r#""HIT""#
        );
        assert_eq!(
            serde_json::to_string(&CacheStatus::Store).unwrap(),
            r#""STORE""#
        );
        assert_eq!(
            serde_json::to_string(&CacheStatus::Miss).unwrap(),
            r#""MISS""#
        );
    }

    #[test]
    fn unset_fields_are_omitted_from_json() {
        let json = serde_json::to_string(&ModelResponse::from_text("x")).unwrap();
        assert_eq!(json, r#"{"response":"x"}"#);
    }
}
