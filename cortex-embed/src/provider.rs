//! Embedding provider implementations
//!
//! A provider turns one batch of texts into one vector per text, in input order.
//! Batching, ordering across batches and fail-fast semantics live in
//! [`EmbeddingClient`](crate::client::EmbeddingClient); providers only speak
//! their wire protocol.

use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single embedding vector.
pub type Embedding = Vec<f32>;

/// Result of embedding generation
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Embedding>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result.
    ///
    /// The dimension is inferred from the first embedding vector, or 0 if there
    /// are none.
    pub fn new(embeddings: Vec<Embedding>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn into_embeddings(self) -> Vec<Embedding> {
        self.embeddings
    }
}

/// Capability of turning a batch of texts into vectors.
///
/// Implementations must return exactly one vector per input text, in the same
/// order. Any failure is reported as [`EmbedError::Provider`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

fn build_http_client(provider: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EmbedError::provider_source(provider, e))
}

/// Checks that a provider answered with one vector per input text.
fn ensure_count(provider: &str, expected: usize, embeddings: &[Embedding]) -> Result<()> {
    if embeddings.len() != expected {
        return Err(EmbedError::provider(
            provider,
            format!(
                "expected {expected} embeddings, received {}",
                embeddings.len()
            ),
        ));
    }
    Ok(())
}

async fn error_for_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(EmbedError::provider(
        provider,
        format!("HTTP {status}: {snippet}"),
    ))
}

#[derive(Debug, Serialize)]
struct TextsRequest<'a> {
    texts: &'a [String],
}

/// Body returned by an embeddings service. Some deployments answer with the
/// singular `embedding` key, so both are accepted.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embeddings: Option<Vec<Embedding>>,
    #[serde(default)]
    embedding: Option<Vec<Embedding>>,
}

/// Provider for an embeddings service that accepts `{"texts": [...]}` and
/// answers `{"embeddings": [[...], ...]}`.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEmbeddingProvider {
    pub const NAME: &'static str = "http";

    /// Creates a provider posting to the full `endpoint` URL.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(Self::NAME, timeout)?,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&TextsRequest { texts })
            .send()
            .await
            .map_err(|e| EmbedError::provider_source(Self::NAME, e))?;

        let response = error_for_status(Self::NAME, response).await?;
        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::provider_source(Self::NAME, e))?;

        let embeddings = body.embeddings.or(body.embedding).ok_or_else(|| {
            EmbedError::provider(Self::NAME, "response has no 'embeddings' field")
        })?;
        ensure_count(Self::NAME, texts.len(), &embeddings)?;
        Ok(embeddings)
    }

    fn provider_name(&self) -> &str {
        Self::NAME
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    index: usize,
    embedding: Embedding,
}

/// Provider for OpenAI-compatible `/embeddings` APIs.
#[derive(Clone)]
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for OpenAiEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbeddingProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.is_some())
            .finish()
    }
}

impl OpenAiEmbeddingProvider {
    pub const NAME: &'static str = "openai";

    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let model = model.into();
        if model.is_empty() {
            return Err(EmbedError::invalid_config("model must not be empty"));
        }
        Ok(Self {
            client: build_http_client(Self::NAME, timeout)?,
            base_url: base_url.into(),
            model,
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut request = self.client.post(self.url()).json(&OpenAiRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbedError::provider_source(Self::NAME, e))?;
        let response = error_for_status(Self::NAME, response).await?;
        let mut body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::provider_source(Self::NAME, e))?;

        // The API does not promise to return items in request order.
        body.data.sort_by_key(|item| item.index);
        let embeddings: Vec<Embedding> = body.data.into_iter().map(|d| d.embedding).collect();
        ensure_count(Self::NAME, texts.len(), &embeddings)?;
        Ok(embeddings)
    }

    fn provider_name(&self) -> &str {
        Self::NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_result() {
        let result = EmbeddingResult::new(vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]]);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());

        let empty = EmbeddingResult::new(vec![]);
        assert!(empty.is_empty());
        assert_eq!(empty.dimension, 0);
    }

    #[test]
    fn test_response_accepts_both_keys() {
        let plural: EmbeddingsResponse =
            serde_json::from_str(r#"{"embeddings": [[1.0, 2.0]]}"#).unwrap();
        assert_eq!(plural.embeddings, Some(vec![vec![1.0, 2.0]]));

        let singular: EmbeddingsResponse =
            serde_json::from_str(r#"{"embedding": [[3.0]]}"#).unwrap();
        assert_eq!(singular.embeddings.or(singular.embedding), Some(vec![vec![3.0]]));
    }

    #[test]
    fn test_ensure_count() {
        assert!(ensure_count("http", 1, &[vec![1.0]]).is_ok());
        let err = ensure_count("http", 2, &[vec![1.0]]).unwrap_err();
        assert!(err.to_string().contains("expected 2 embeddings, received 1"));
    }

    #[test]
    fn test_openai_url_and_debug_hide_key() {
        let provider = OpenAiEmbeddingProvider::new(
            "https://api.openai.com/v1/",
            "text-embedding-3-small",
            Some("sk-secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(provider.url(), "https://api.openai.com/v1/embeddings");
        assert!(!format!("{provider:?}").contains("sk-secret"));
    }

    #[test]
    fn test_openai_requires_model() {
        assert!(OpenAiEmbeddingProvider::new("http://x", "", None, Duration::from_secs(1)).is_err());
    }
}
