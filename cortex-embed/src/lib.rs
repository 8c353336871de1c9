//! # cortex-embed
//!
//! Client for remote text embedding services. Texts are sent to a provider in
//! fixed-size batches, sequentially, and the returned vectors are concatenated
//! in input order.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cortex_embed::{EmbedConfig, EmbeddingClient};
//!
//! # async fn example() -> cortex_embed::Result<()> {
//! let config = EmbedConfig::http("http://localhost:7002/api/embeddings").with_batch_size(16);
//! let client = EmbeddingClient::from_config(&config)?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = client.embed(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - [`HttpEmbeddingProvider`]: `POST {"texts": [...]}` returning `{"embeddings": [[...]]}`
//! - [`OpenAiEmbeddingProvider`]: OpenAI-compatible `/embeddings` APIs
//!
//! Custom backends implement [`EmbeddingProvider`] and are wrapped with
//! [`EmbeddingClient::new`].
//!
//! ## Error Handling
//!
//! Any transport failure, non-2xx status, malformed body or wrong vector count
//! is reported as [`EmbedError::Provider`] and fails the whole call. No partial
//! results are returned.

pub mod client;
pub mod config;
pub mod error;
pub mod provider;

pub use client::EmbeddingClient;
pub use config::{EmbedConfig, ProviderKind};
pub use error::{EmbedError, Result};
pub use provider::{
    Embedding, EmbeddingProvider, EmbeddingResult, HttpEmbeddingProvider,
    OpenAiEmbeddingProvider,
};
