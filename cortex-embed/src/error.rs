//! Error types for the embedding client

/// Result type for embedding operations.
///
/// Used throughout the crate for operations that can fail.
pub type Result<T> = std::result::Result<T, EmbedError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for all embedding operations.
///
/// Configuration problems are reported before any request is sent. Everything
/// that goes wrong while talking to the provider (transport failures, non-2xx
/// statuses, malformed bodies, wrong vector counts) is a [`EmbedError::Provider`]
/// error and fails the whole `embed` call.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when client or provider configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Error reported by, or while reaching, the embedding provider
    #[error("Embedding provider '{provider}' failed: {message}")]
    Provider {
        provider: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a provider error that has no underlying error value.
    pub fn provider<P, S>(provider: P, message: S) -> Self
    where
        P: Into<String>,
        S: Into<String>,
    {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a transport or decoding error raised while calling a provider.
    ///
    /// # Arguments
    /// * `provider` - Name of the provider that was being called
    /// * `source` - The underlying error
    pub fn provider_source<P, E>(provider: P, source: E) -> Self
    where
        P: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Provider {
            provider: provider.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns `true` for failures that happened at the provider boundary.
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}
