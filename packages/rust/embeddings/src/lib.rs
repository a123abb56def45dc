//! Embedding generation for scraped content.
//!
//! [`EmbeddingProvider`] is the seam the ingestion runner depends on;
//! [`OpenAiEmbeddings`] is the production implementation speaking the
//! OpenAI-compatible `/v1/embeddings` protocol.
//!
//! Provider errors are not retried here. The caller decides what a
//! failed embedding means for the item being processed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use contentsync_shared::{Result, SyncError};

/// Vector length produced by the supported embedding models.
pub const EMBEDDING_DIM: usize = 1536;

/// Inputs are truncated to this many characters before submission
/// (provider token-limit guard).
pub const INPUT_CHAR_LIMIT: usize = 8000;

/// Time budget for one embedding request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Produces a fixed-dimension vector for a piece of text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ---------------------------------------------------------------------------
// Wire types (OpenAI embeddings protocol)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

// ---------------------------------------------------------------------------
// OpenAI client
// ---------------------------------------------------------------------------

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct OpenAiEmbeddings {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddings {
    /// Create a client for `base_url` (scheme + host, no path).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Embedding(format!("failed to build HTTP client: {e}")))?;

        let base_url = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    #[instrument(skip_all, fields(model = %self.model, chars = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = truncate_input(text);
        let url = format!("{}/v1/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input,
            })
            .send()
            .await
            .map_err(|e| SyncError::Embedding(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(SyncError::Embedding(format!(
                "provider returned HTTP {status}: {snippet}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Embedding(format!("invalid response body: {e}")))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| SyncError::Embedding("response contained no embeddings".into()))?;

        if vector.len() != EMBEDDING_DIM {
            return Err(SyncError::Embedding(format!(
                "expected a {EMBEDDING_DIM}-dimension vector, got {}",
                vector.len()
            )));
        }

        debug!(dim = vector.len(), "embedding generated");
        Ok(vector)
    }
}

/// Truncate text to [`INPUT_CHAR_LIMIT`] characters, never splitting a
/// multi-byte character.
pub fn truncate_input(text: &str) -> &str {
    match text.char_indices().nth(INPUT_CHAR_LIMIT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_vector(dim: usize) -> Vec<f32> {
        vec![0.25; dim]
    }

    #[tokio::test]
    async fn embeds_text_via_provider() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/embeddings"))
            .and(wiremock::matchers::header(
                "authorization",
                "Bearer test-key",
            ))
            .and(wiremock::matchers::body_partial_json(serde_json::json!({
                "model": "text-embedding-3-small",
            })))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"data": [{"embedding": fake_vector(EMBEDDING_DIM)}]}),
            ))
            .mount(&server)
            .await;

        let provider =
            OpenAiEmbeddings::new(server.uri(), "test-key", "text-embedding-3-small").unwrap();
        let vector = provider.embed("some article body").await.unwrap();

        assert_eq!(vector.len(), EMBEDDING_DIM);
        assert!((vector[0] - 0.25).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn provider_error_status_propagates() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/embeddings"))
            .respond_with(
                wiremock::ResponseTemplate::new(500).set_body_string("internal provider error"),
            )
            .mount(&server)
            .await;

        let provider = OpenAiEmbeddings::new(server.uri(), "k", "m").unwrap();
        let err = provider.embed("text").await.unwrap_err();

        assert!(matches!(err, SyncError::Embedding(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/embeddings"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": [{"embedding": [0.1, 0.2, 0.3]}]})),
            )
            .mount(&server)
            .await;

        let provider = OpenAiEmbeddings::new(server.uri(), "k", "m").unwrap();
        let err = provider.embed("text").await.unwrap_err();

        assert!(err.to_string().contains("1536"));
    }

    #[tokio::test]
    async fn empty_data_is_rejected() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/embeddings"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let provider = OpenAiEmbeddings::new(server.uri(), "k", "m").unwrap();
        let err = provider.embed("text").await.unwrap_err();

        assert!(err.to_string().contains("no embeddings"));
    }

    #[test]
    fn truncates_long_input_by_characters() {
        let long = "a".repeat(INPUT_CHAR_LIMIT + 500);
        assert_eq!(truncate_input(&long).len(), INPUT_CHAR_LIMIT);

        let short = "short text";
        assert_eq!(truncate_input(short), short);
    }

    #[test]
    fn truncation_respects_multibyte_boundaries() {
        let long = "é".repeat(INPUT_CHAR_LIMIT + 5);
        let truncated = truncate_input(&long);
        assert_eq!(truncated.chars().count(), INPUT_CHAR_LIMIT);
    }
}
