//! Batching embedding client

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{Embedding, EmbeddingProvider, EmbeddingResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Splits texts into batches, sends them to a provider one at a time and
/// concatenates the results in input order.
///
/// The client is fail-fast: if any batch fails, the whole call fails and the
/// vectors of earlier batches are discarded.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    inter_batch_delay: Duration,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("provider", &self.provider.provider_name())
            .field("batch_size", &self.batch_size)
            .field("inter_batch_delay", &self.inter_batch_delay)
            .finish()
    }
}

impl EmbeddingClient {
    /// Wrap an existing provider with the batching settings from `config`.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbedConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(EmbedError::invalid_config(
                "batch_size must be greater than zero",
            ));
        }
        Ok(Self {
            provider,
            batch_size: config.batch_size,
            inter_batch_delay: config.inter_batch_delay(),
        })
    }

    /// Build the provider described by `config` and wrap it.
    pub fn from_config(config: &EmbedConfig) -> Result<Self> {
        let provider = config.build_provider()?;
        info!(
            "Created embedding client for provider '{}' (batch size {})",
            provider.provider_name(),
            config.batch_size
        );
        Self::new(provider, config)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed `texts`, returning one vector per text in input order.
    ///
    /// An empty input returns an empty result without contacting the provider.
    pub async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(Vec::new()));
        }

        let batch_count = texts.len().div_ceil(self.batch_size);
        let mut embeddings: Vec<Embedding> = Vec::with_capacity(texts.len());

        for (index, batch) in texts.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.inter_batch_delay).await;
            }
            debug!(
                "Embedding batch {}/{} ({} texts) via '{}'",
                index + 1,
                batch_count,
                batch.len(),
                self.provider.provider_name()
            );
            let vectors = self.provider.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(EmbedError::provider(
                    self.provider.provider_name(),
                    format!(
                        "batch {} returned {} embeddings for {} texts",
                        index + 1,
                        vectors.len(),
                        batch.len()
                    ),
                ));
            }
            embeddings.extend(vectors);
        }

        Ok(EmbeddingResult::new(embeddings))
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Embedding> {
        let result = self.embed(&[text.to_string()]).await?;
        result.into_embeddings().into_iter().next().ok_or_else(|| {
            EmbedError::provider(self.provider.provider_name(), "no embedding returned")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    /// Encodes each text as `[len, batch_number]` and records batch sizes.
    struct RecordingProvider {
        batches: Mutex<Vec<usize>>,
        fail_on_batch: Option<usize>,
    }

    impl RecordingProvider {
        fn new(fail_on_batch: Option<usize>) -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                fail_on_batch,
            }
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            let batch_number = {
                let mut batches = self.batches.lock().unwrap();
                batches.push(texts.len());
                batches.len()
            };
            if self.fail_on_batch == Some(batch_number) {
                return Err(EmbedError::provider("recording", "HTTP 500: boom"));
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, batch_number as f32])
                .collect())
        }

        fn provider_name(&self) -> &str {
            "recording"
        }
    }

    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Embedding>> {
            Ok(vec![vec![1.0]])
        }

        fn provider_name(&self) -> &str {
            "short"
        }
    }

    fn config(batch_size: usize) -> EmbedConfig {
        EmbedConfig::http("http://localhost/api/embeddings")
            .with_batch_size(batch_size)
            .with_inter_batch_delay_ms(0)
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| "x".repeat(i + 1)).collect()
    }

    #[traced_test]
    #[tokio::test]
    async fn test_batches_preserve_order() {
        let provider = Arc::new(RecordingProvider::new(None));
        let client = EmbeddingClient::new(provider.clone(), &config(2)).unwrap();

        let result = client.embed(&texts(5)).await.unwrap();

        assert_eq!(provider.batch_sizes(), vec![2, 2, 1]);
        assert_eq!(result.len(), 5);
        assert_eq!(result.dimension, 2);
        let lengths: Vec<f32> = result.embeddings.iter().map(|e| e[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let batch_numbers: Vec<f32> = result.embeddings.iter().map(|e| e[1]).collect();
        assert_eq!(batch_numbers, vec![1.0, 1.0, 2.0, 2.0, 3.0]);
        assert!(logs_contain("Embedding batch 3/3 (1 texts)"));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let provider = Arc::new(RecordingProvider::new(None));
        let client = EmbeddingClient::new(provider.clone(), &config(4)).unwrap();

        let result = client.embed(&[]).await.unwrap();

        assert!(result.is_empty());
        assert!(provider.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_failure_discards_earlier_batches() {
        let provider = Arc::new(RecordingProvider::new(Some(2)));
        let client = EmbeddingClient::new(provider.clone(), &config(2)).unwrap();

        let err = client.embed(&texts(6)).await.unwrap_err();

        assert!(err.is_provider_error());
        assert!(err.to_string().contains("HTTP 500"));
        // The third batch is never sent.
        assert_eq!(provider.batch_sizes(), vec![2, 2]);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_provider_error() {
        let client = EmbeddingClient::new(Arc::new(ShortProvider), &config(8)).unwrap();
        let err = client.embed(&texts(3)).await.unwrap_err();
        assert!(err.is_provider_error());
        assert!(err.to_string().contains("returned 1 embeddings for 3 texts"));
    }

    #[tokio::test]
    async fn test_embed_one() {
        let provider = Arc::new(RecordingProvider::new(None));
        let client = EmbeddingClient::new(provider, &config(8)).unwrap();
        let embedding = client.embed_one("hello").await.unwrap();
        assert_eq!(embedding, vec![5.0, 1.0]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let provider = Arc::new(RecordingProvider::new(None));
        let err = EmbeddingClient::new(provider, &config(0)).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
    }
}
