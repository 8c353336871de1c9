//! Configuration for the embedding client and its providers

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, HttpEmbeddingProvider, OpenAiEmbeddingProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default number of texts sent to the provider per request.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default pause between consecutive batches in milliseconds.
pub const DEFAULT_INTER_BATCH_DELAY_MS: u64 = 10;

/// Which wire protocol the provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// `POST {"texts": [...]}` returning `{"embeddings": [[...]]}`
    #[default]
    Http,
    /// OpenAI-compatible `/embeddings` endpoint
    OpenAi,
}

impl std::str::FromStr for ProviderKind {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "openai" => Ok(Self::OpenAi),
            _ => Err(EmbedError::invalid_config(format!(
                "Unsupported embedding provider: {s}. Supported providers: http, openai"
            ))),
        }
    }
}

/// Configuration for embedding generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Provider protocol
    #[serde(default)]
    pub provider: ProviderKind,
    /// Full URL for [`ProviderKind::Http`], base URL (e.g. `https://api.openai.com/v1`) for OpenAI
    pub endpoint: String,
    /// Model name, required by OpenAI-compatible providers
    #[serde(default)]
    pub model: Option<String>,
    /// Bearer token for OpenAI-compatible providers; falls back to `OPENAI_API_KEY`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Maximum number of texts per provider request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pause between consecutive batches in milliseconds
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_inter_batch_delay_ms() -> u64 {
    DEFAULT_INTER_BATCH_DELAY_MS
}

impl EmbedConfig {
    /// Configuration for a plain HTTP embeddings service at `endpoint`.
    pub fn http(endpoint: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::Http,
            endpoint: endpoint.into(),
            model: None,
            api_key: None,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            inter_batch_delay_ms: DEFAULT_INTER_BATCH_DELAY_MS,
        }
    }

    /// Configuration for an OpenAI-compatible embeddings API.
    pub fn openai(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: Some(model.into()),
            ..Self::http(base_url)
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_inter_batch_delay_ms(mut self, delay_ms: u64) -> Self {
        self.inter_batch_delay_ms = delay_ms;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    /// Validate the configuration without contacting the provider.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config(
                "batch_size must be greater than zero",
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(EmbedError::invalid_config("endpoint must not be empty"));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(EmbedError::invalid_config(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self.provider == ProviderKind::OpenAi && self.model.is_none() {
            return Err(EmbedError::invalid_config(
                "model is required for the openai provider",
            ));
        }
        Ok(())
    }

    /// Build the provider described by this configuration.
    pub fn build_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        self.validate()?;
        match self.provider {
            ProviderKind::Http => Ok(Arc::new(HttpEmbeddingProvider::new(
                self.endpoint.clone(),
                self.timeout(),
            )?)),
            ProviderKind::OpenAi => {
                let api_key = self
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("OPENAI_API_KEY").ok());
                let model = self.model.clone().unwrap_or_default();
                Ok(Arc::new(OpenAiEmbeddingProvider::new(
                    self.endpoint.clone(),
                    model,
                    api_key,
                    self.timeout(),
                )?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_defaults() {
        let config = EmbedConfig::http("http://localhost:7002/api/embeddings");
        assert_eq!(config.provider, ProviderKind::Http);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.inter_batch_delay(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let zero_batch = EmbedConfig::http("http://localhost").with_batch_size(0);
        assert!(zero_batch.validate().is_err());

        assert!(EmbedConfig::http("").validate().is_err());
        assert!(EmbedConfig::http("localhost:7002").validate().is_err());

        let mut openai = EmbedConfig::openai("https://api.openai.com/v1", "text-embedding-3-small");
        assert!(openai.validate().is_ok());
        openai.model = None;
        assert!(openai.validate().is_err());
    }

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("HTTP".parse::<ProviderKind>().unwrap(), ProviderKind::Http);
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert!("onnx".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: EmbedConfig =
            serde_json::from_str(r#"{"endpoint": "http://embed:8000/api/embeddings"}"#).unwrap();
        assert_eq!(config, EmbedConfig::http("http://embed:8000/api/embeddings"));
    }

    #[test]
    fn test_build_provider_names() {
        let http = EmbedConfig::http("http://localhost:1/api/embeddings")
            .build_provider()
            .unwrap();
        assert_eq!(http.provider_name(), "http");

        let openai = EmbedConfig::openai("http://localhost:1/v1", "m")
            .with_api_key("sk-test")
            .build_provider()
            .unwrap();
        assert_eq!(openai.provider_name(), "openai");
    }
}
