//! Storage layer for chunks and their embeddings
//!
//! Every backend implements [`VectorStore`]: chunks are added in batches with one
//! vector per text, and searched by exact cosine similarity. Three backends are
//! provided and chosen once at startup through [`factory::open_store`]:
//!
//! - [`memory_store::MemoryVectorStore`]: process memory, linear scan
//! - [`sqlite_store::SqliteVectorStore`]: single SQLite file, linear scan
//! - [`pg_store::PgVectorStore`]: Postgres with pgvector, ranking done by the engine
//!
//! ## Invariants
//!
//! - Chunk ids are assigned by the store and never reused, even after
//!   [`VectorStore::reset`].
//! - The store dimension is fixed by configuration or by the first successful
//!   add. Vectors of any other length are rejected.
//! - An add either stores every chunk or none of them. All validation happens
//!   before the first write.
//! - Search results are ordered by descending score, ties by ascending id.
//!
//! ## Usage
//!
//! ```rust
//! use cortex_retriever::storage::{VectorStore, memory_store::MemoryVectorStore};
//!
//! # async fn example() -> cortex_retriever::storage::Result<()> {
//! let store = MemoryVectorStore::new();
//! let texts = vec!["first".to_string(), "second".to_string()];
//! let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
//! store.add("notes.txt", &texts, &embeddings, None).await?;
//!
//! let results = store.search(&[1.0, 0.0], 1).await?;
//! assert_eq!(results[0].chunk.text, "first");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub mod factory;
pub mod memory_store;
pub mod pg_store;
pub mod sqlite_store;

/// Database ID for a stored chunk.
pub type ChunkId = i64;

/// Free-form string metadata attached to a chunk.
pub type Metadata = BTreeMap<String, String>;

pub type Result<T> = std::result::Result<T, StoreError>;

/// A stored unit of text with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source: String,
    pub text: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// A chunk returned by [`VectorStore::search`] with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Dimension mismatch: store holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Length mismatch: expected {expected} {field}, got {actual}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Text at position {index} is empty")]
    EmptyText { index: usize },

    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored embedding for chunk {id} is corrupt: {reason}")]
    CorruptEmbedding { id: ChunkId, reason: String },
}

/// Uniform interface over the chunk storage backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store one chunk per `(text, embedding)` pair and return them with their
    /// assigned ids, in input order.
    ///
    /// `metadatas` may be shorter than `texts`; missing entries become empty
    /// maps. It must not be longer.
    async fn add(
        &self,
        source: &str,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: Option<&[Metadata]>,
    ) -> Result<Vec<Chunk>>;

    /// Return at most `top_k` chunks ranked by cosine similarity to `query`.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<QueryResult>>;

    /// Remove every chunk. Ids handed out before the reset are not reused and
    /// the established dimension is kept.
    async fn reset(&self) -> Result<()>;

    /// Number of stored chunks.
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Vector dimension accepted by this store, if already established.
    async fn dimension(&self) -> Result<Option<usize>>;

    fn backend_name(&self) -> &'static str;
}

/// Cosine similarity of two vectors, `0.0` when either has zero norm.
///
/// The result is clamped to `[-1, 1]` to absorb rounding error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    // f64 sums so squares of extreme f32 values neither overflow nor vanish
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Validates an add batch and returns the dimension its vectors share.
///
/// `expected` is the dimension already established for the store, if any.
pub(crate) fn validate_batch(
    texts: &[String],
    embeddings: &[Vec<f32>],
    metadatas: Option<&[Metadata]>,
    expected: Option<usize>,
) -> Result<Option<usize>> {
    if texts.len() != embeddings.len() {
        return Err(StoreError::LengthMismatch {
            field: "embeddings",
            expected: texts.len(),
            actual: embeddings.len(),
        });
    }
    if let Some(metadatas) = metadatas {
        if metadatas.len() > texts.len() {
            return Err(StoreError::LengthMismatch {
                field: "metadatas (at most)",
                expected: texts.len(),
                actual: metadatas.len(),
            });
        }
    }
    if let Some(index) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(StoreError::EmptyText { index });
    }

    let Some(first) = embeddings.first() else {
        return Ok(expected);
    };
    let dimension = expected.unwrap_or(first.len());
    if dimension == 0 {
        return Err(StoreError::InvalidConfig(
            "embeddings must not be empty".to_string(),
        ));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        return Err(StoreError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }
    Ok(Some(dimension))
}

/// Checks a query vector against the store dimension.
pub(crate) fn validate_query(query: &[f32], dimension: usize) -> Result<()> {
    if query.len() != dimension {
        return Err(StoreError::DimensionMismatch {
            expected: dimension,
            actual: query.len(),
        });
    }
    Ok(())
}

/// Metadata for position `index` of an add batch, `{}` when absent.
pub(crate) fn metadata_at(metadatas: Option<&[Metadata]>, index: usize) -> Metadata {
    metadatas
        .and_then(|m| m.get(index))
        .cloned()
        .unwrap_or_default()
}

/// Descending score, then ascending id.
pub(crate) fn compare_results(a: &QueryResult, b: &QueryResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

/// Scores `chunks` against `query` and keeps the best `top_k`.
pub(crate) fn rank_chunks<I>(query: &[f32], chunks: I, top_k: usize) -> Vec<QueryResult>
where
    I: IntoIterator<Item = Chunk>,
{
    let mut results: Vec<QueryResult> = chunks
        .into_iter()
        .map(|chunk| QueryResult {
            score: cosine_similarity(query, &chunk.embedding),
            chunk,
        })
        .collect();
    results.sort_by(compare_results);
    results.truncate(top_k);
    results
}
