//! In-process vector store with linear scan search.

use super::{
    Chunk, ChunkId, Metadata, QueryResult, Result, StoreError, VectorStore, metadata_at,
    rank_chunks, validate_batch, validate_query,
};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug)]
struct MemoryState {
    chunks: Vec<Chunk>,
    next_id: ChunkId,
    dimension: Option<usize>,
}

/// Keeps every chunk in a single mutex-guarded vector.
#[derive(Debug)]
pub struct MemoryVectorStore {
    state: Mutex<MemoryState>,
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVectorStore {
    /// Creates an empty store whose dimension is set by the first add.
    pub fn new() -> Self {
        Self::with_state(None)
    }

    /// Creates an empty store that only accepts `dimension`-length vectors.
    pub fn with_dimension(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(StoreError::InvalidConfig(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self::with_state(Some(dimension)))
    }

    fn with_state(dimension: Option<usize>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                chunks: Vec::new(),
                next_id: 1,
                dimension,
            }),
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn add(
        &self,
        source: &str,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: Option<&[Metadata]>,
    ) -> Result<Vec<Chunk>> {
        let mut state = self.state.lock().await;
        let dimension = validate_batch(texts, embeddings, metadatas, state.dimension)?;

        let mut added = Vec::with_capacity(texts.len());
        for (index, (text, embedding)) in texts.iter().zip(embeddings).enumerate() {
            let chunk = Chunk {
                id: state.next_id,
                source: source.to_string(),
                text: text.clone(),
                metadata: metadata_at(metadatas, index),
                embedding: embedding.clone(),
            };
            state.next_id += 1;
            added.push(chunk);
        }
        state.chunks.extend(added.iter().cloned());
        state.dimension = dimension;

        debug!("Added {} chunks from '{}' to memory store", added.len(), source);
        Ok(added)
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<QueryResult>> {
        let state = self.state.lock().await;
        if top_k == 0 || state.chunks.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(dimension) = state.dimension {
            validate_query(query, dimension)?;
        }
        Ok(rank_chunks(query, state.chunks.iter().cloned(), top_k))
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let removed = state.chunks.len();
        state.chunks.clear();
        info!("Reset memory store, removed {} chunks", removed);
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.lock().await.chunks.len())
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.state.lock().await.dimension)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
