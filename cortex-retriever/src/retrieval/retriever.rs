//! Query-time retrieval: embed the query, then ask the store for neighbours.

use crate::storage::{QueryResult, StoreError, VectorStore};
use cortex_embed::{EmbedError, EmbeddingClient};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbedError),

    #[error("Vector store search failed: {0}")]
    Store(#[from] StoreError),

    #[error("Embedding provider returned no vector for the query")]
    MissingQueryEmbedding,
}

/// Pairs an embedding client with a store.
#[derive(Clone)]
pub struct Retriever {
    embedder: EmbeddingClient,
    store: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("embedder", &self.embedder)
            .field("store", &self.store.backend_name())
            .finish()
    }
}

impl Retriever {
    pub fn new(embedder: EmbeddingClient, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Returns the `top_k` chunks most similar to `query`, best first.
    ///
    /// Fails with the first error raised by the embedding client or the store.
    /// Nothing is retried.
    pub async fn search_text(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, RetrievalError> {
        let embedded = self.embedder.embed(&[query.to_string()]).await?;
        let query_vector = embedded
            .into_embeddings()
            .into_iter()
            .next()
            .ok_or(RetrievalError::MissingQueryEmbedding)?;

        let results = self.store.search(&query_vector, top_k).await?;
        debug!(
            "Retrieved {} chunks for query ({} chars, top_k {})",
            results.len(),
            query.chars().count(),
            top_k
        );
        Ok(results)
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }
}
