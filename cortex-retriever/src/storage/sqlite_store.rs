//! File-backed vector store on SQLite.
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE chunks (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,  -- never reused, even after reset
//!     source TEXT NOT NULL,
//!     text TEXT NOT NULL,
//!     metadata TEXT NOT NULL,                -- JSON object of strings
//!     embedding BLOB NOT NULL,               -- little-endian f32
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! CREATE TABLE store_meta (
//!     key TEXT PRIMARY KEY,                  -- 'dimension'
//!     value TEXT NOT NULL
//! );
//! ```
//!
//! Search decodes every stored vector and ranks them in process. Writers are
//! serialised through an async mutex that also caches the store dimension, and
//! each add runs in one transaction.

use super::{
    Chunk, ChunkId, Metadata, QueryResult, Result, StoreError, VectorStore, metadata_at,
    rank_chunks, validate_batch, validate_query,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const DIMENSION_KEY: &str = "dimension";

/// SQLite implementation of [`VectorStore`].
#[derive(Debug)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
    path: Option<PathBuf>,
    /// Held for the whole of every write; the value is the established dimension.
    dimension: Mutex<Option<usize>>,
}

impl SqliteVectorStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// When `dimension` is given it must agree with any dimension already
    /// persisted in the file.
    pub async fn open(path: &Path, dimension: Option<usize>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StoreError::InvalidConfig(format!(
                        "cannot create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(Duration::from_secs(5))
                .create_if_missing(true),
        )
        .await?;

        let store = Self::with_pool(pool, Some(path.to_path_buf()), dimension).await?;
        info!(
            "Opened SQLite vector store at {} ({} chunks)",
            path.display(),
            store.len().await?
        );
        Ok(store)
    }

    /// Opens a private in-memory database. Mostly useful in tests.
    pub async fn open_memory(dimension: Option<usize>) -> Result<Self> {
        // Every connection to `:memory:` is a separate database, so pin the pool
        // to a single connection that is never recycled.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;
        Self::with_pool(pool, None, dimension).await
    }

    async fn with_pool(
        pool: SqlitePool,
        path: Option<PathBuf>,
        dimension: Option<usize>,
    ) -> Result<Self> {
        if dimension == Some(0) {
            return Err(StoreError::InvalidConfig(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Self::create_tables(&pool).await?;

        let persisted = Self::load_dimension(&pool).await?;
        let dimension = match (persisted, dimension) {
            (Some(stored), Some(configured)) if stored != configured => {
                return Err(StoreError::DimensionMismatch {
                    expected: stored,
                    actual: configured,
                });
            }
            (Some(stored), _) => Some(stored),
            (None, Some(configured)) => {
                Self::save_dimension(&pool, configured).await?;
                Some(configured)
            }
            (None, None) => None,
        };

        Ok(Self {
            pool,
            path,
            dimension: Mutex::new(dimension),
        })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
            .execute(pool)
            .await?;

        Ok(())
    }

    async fn load_dimension(pool: &SqlitePool) -> Result<Option<usize>> {
        let row = sqlx::query("SELECT value FROM store_meta WHERE key = ?")
            .bind(DIMENSION_KEY)
            .fetch_optional(pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let value: String = row.try_get("value")?;
        value.parse::<usize>().map(Some).map_err(|e| {
            StoreError::InvalidConfig(format!("stored dimension '{value}' is invalid: {e}"))
        })
    }

    async fn save_dimension<'e, E>(executor: E, dimension: usize) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        sqlx::query("INSERT OR REPLACE INTO store_meta (key, value) VALUES (?, ?)")
            .bind(DIMENSION_KEY)
            .bind(dimension.to_string())
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Path of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get the database connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Encodes a vector as packed little-endian `f32` values.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decodes a blob written by [`encode_embedding`].
pub fn decode_embedding(id: ChunkId, bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(StoreError::CorruptEmbedding {
            id,
            reason: format!("blob length {} is not a multiple of 4", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
    let id: ChunkId = row.try_get("id")?;
    let metadata: String = row.try_get("metadata")?;
    let embedding: Vec<u8> = row.try_get("embedding")?;
    Ok(Chunk {
        id,
        source: row.try_get("source")?,
        text: row.try_get("text")?,
        metadata: serde_json::from_str(&metadata)?,
        embedding: decode_embedding(id, &embedding)?,
    })
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add(
        &self,
        source: &str,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: Option<&[Metadata]>,
    ) -> Result<Vec<Chunk>> {
        let mut established = self.dimension.lock().await;
        let dimension = validate_batch(texts, embeddings, metadatas, *established)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Serialise metadata before opening the transaction so a bad value
        // cannot leave a half-written batch behind.
        let rows: Vec<(Metadata, String)> = (0..texts.len())
            .map(|index| -> Result<(Metadata, String)> {
                let metadata = metadata_at(metadatas, index);
                let json = serde_json::to_string(&metadata)?;
                Ok((metadata, json))
            })
            .collect::<Result<_>>()?;

        let mut tx = self.pool.begin().await?;
        if established.is_none() {
            if let Some(dimension) = dimension {
                Self::save_dimension(&mut *tx, dimension).await?;
            }
        }

        let mut added = Vec::with_capacity(texts.len());
        for ((text, embedding), (metadata, json)) in texts.iter().zip(embeddings).zip(rows) {
            let id = sqlx::query(
                "INSERT INTO chunks (source, text, metadata, embedding) VALUES (?, ?, ?, ?)",
            )
            .bind(source)
            .bind(text)
            .bind(json)
            .bind(encode_embedding(embedding))
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            added.push(Chunk {
                id,
                source: source.to_string(),
                text: text.clone(),
                metadata,
                embedding: embedding.clone(),
            });
        }
        tx.commit().await?;
        *established = dimension;

        debug!("Added {} chunks from '{}' to SQLite store", added.len(), source);
        Ok(added)
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<QueryResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let Some(dimension) = *self.dimension.lock().await else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query("SELECT id, source, text, metadata, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        validate_query(query, dimension)?;

        let chunks = rows.iter().map(row_to_chunk).collect::<Result<Vec<_>>>()?;
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dimension) {
            return Err(StoreError::CorruptEmbedding {
                id: bad.id,
                reason: format!(
                    "expected {dimension} values, found {}",
                    bad.embedding.len()
                ),
            });
        }

        debug!("Scanning {} chunks in SQLite store", chunks.len());
        Ok(rank_chunks(query, chunks, top_k))
    }

    async fn reset(&self) -> Result<()> {
        let _guard = self.dimension.lock().await;
        let result = sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;
        info!(
            "Reset SQLite vector store, removed {} chunks",
            result.rows_affected()
        );
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM chunks")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;
        Ok(count as usize)
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(*self.dimension.lock().await)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
