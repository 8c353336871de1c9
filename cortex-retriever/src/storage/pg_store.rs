//! Postgres vector store using the pgvector extension.
//!
//! Vectors are stored in a `vector(D)` column and cross the wire as text
//! literals (`'[0.1,0.2,...]'::vector`). Ranking is pushed to the engine with
//! the cosine distance operator `<=>`; the reported score is `1 - distance`,
//! which is the cosine similarity. pgvector reports `NaN` distance when either
//! vector has zero norm, and such rows score `0.0`.

use super::{
    Chunk, ChunkId, Metadata, QueryResult, Result, StoreError, VectorStore, metadata_at,
    validate_batch, validate_query,
};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Table used when none is configured.
pub const DEFAULT_TABLE: &str = "chunks";

/// Dimension used when none is configured.
pub const DEFAULT_DIMENSION: usize = 1536;

// Postgres truncates identifiers longer than this.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Postgres + pgvector implementation of [`VectorStore`].
#[derive(Debug, Clone)]
pub struct PgVectorStore {
    pool: PgPool,
    table: String,
    dimension: usize,
}

/// Checks that `name` can be spliced into SQL as an unquoted table name.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
        return Err(StoreError::InvalidConfig(format!(
            "invalid table name '{name}': use letters, digits and underscores, \
             starting with a letter or underscore, at most {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    Ok(())
}

/// Formats a vector as a pgvector text literal.
pub fn to_vector_literal(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

/// Parses pgvector's text output, e.g. `[1,0.5,-2]`.
pub fn parse_vector_literal(id: ChunkId, literal: &str) -> Result<Vec<f32>> {
    let inner = literal
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| StoreError::CorruptEmbedding {
            id,
            reason: format!("not a vector literal: '{literal}'"),
        })?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|v| {
            v.trim().parse::<f32>().map_err(|e| StoreError::CorruptEmbedding {
                id,
                reason: format!("bad component '{v}': {e}"),
            })
        })
        .collect()
}

/// Converts a cosine distance into the reported similarity score.
pub fn distance_to_score(distance: f64) -> f32 {
    if distance.is_nan() {
        0.0
    } else {
        ((1.0 - distance) as f32).clamp(-1.0, 1.0)
    }
}

impl PgVectorStore {
    /// Connects to `database_url`, enables pgvector and creates `table` if needed.
    pub async fn connect(database_url: &str, table: &str, dimension: usize) -> Result<Self> {
        validate_table_name(table)?;
        if dimension == 0 {
            return Err(StoreError::InvalidConfig(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        let connect_options = PgConnectOptions::from_str(database_url)?;
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;

        let store = Self {
            pool,
            table: table.to_string(),
            dimension,
        };
        store.create_schema().await?;
        info!(
            "Connected Postgres vector store (table '{}', dimension {})",
            store.table, store.dimension
        );
        Ok(store)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                source TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                embedding vector({dimension}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            table = self.table,
            dimension = self.dimension
        ))
        .execute(&self.pool)
        .await?;

        // An existing table may have been created for another dimension;
        // pgvector stores it as the column's type modifier.
        let row = sqlx::query(
            "SELECT atttypmod FROM pg_attribute \
             WHERE attrelid = to_regclass($1) AND attname = 'embedding'",
        )
        .bind(&self.table)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            let typmod: i32 = row.try_get("atttypmod")?;
            if typmod > 0 && typmod as usize != self.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: typmod as usize,
                    actual: self.dimension,
                });
            }
        }
        Ok(())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn add(
        &self,
        source: &str,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: Option<&[Metadata]>,
    ) -> Result<Vec<Chunk>> {
        validate_batch(texts, embeddings, metadatas, Some(self.dimension))?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let insert = format!(
            "INSERT INTO {} (source, text, metadata, embedding) \
             VALUES ($1, $2, $3::jsonb, $4::vector) RETURNING id",
            self.table
        );

        let mut tx = self.pool.begin().await?;
        let mut added = Vec::with_capacity(texts.len());
        for (index, (text, embedding)) in texts.iter().zip(embeddings).enumerate() {
            let metadata = metadata_at(metadatas, index);
            let id: ChunkId = sqlx::query(&insert)
                .bind(source)
                .bind(text)
                .bind(serde_json::to_string(&metadata)?)
                .bind(to_vector_literal(embedding))
                .fetch_one(&mut *tx)
                .await?
                .try_get("id")?;

            added.push(Chunk {
                id,
                source: source.to_string(),
                text: text.clone(),
                metadata,
                embedding: embedding.clone(),
            });
        }
        tx.commit().await?;

        debug!(
            "Added {} chunks from '{}' to Postgres table '{}'",
            added.len(),
            source,
            self.table
        );
        Ok(added)
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<QueryResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if let Err(err) = validate_query(query, self.dimension) {
            // An empty table answers any query with nothing, as the other backends do.
            if self.is_empty().await? {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        // `<=>` is NaN against a zero vector; rank those as distance 1 (score 0).
        let sql = format!(
            "SELECT id, source, text, metadata::text AS metadata, embedding::text AS embedding, \
                    COALESCE(NULLIF(embedding <=> $1::vector, 'NaN'::float8), 1.0) AS distance \
             FROM {} \
             ORDER BY distance, id \
             LIMIT $2",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(to_vector_literal(query))
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let id: ChunkId = row.try_get("id")?;
            let metadata: String = row.try_get("metadata")?;
            let embedding: String = row.try_get("embedding")?;
            let distance: Option<f64> = row.try_get("distance")?;
            results.push(QueryResult {
                chunk: Chunk {
                    id,
                    source: row.try_get("source")?,
                    text: row.try_get("text")?,
                    metadata: serde_json::from_str(&metadata)?,
                    embedding: parse_vector_literal(id, &embedding)?,
                },
                score: distance_to_score(distance.unwrap_or(f64::NAN)),
            });
        }

        debug!(
            "Postgres search returned {} of top {} from '{}'",
            results.len(),
            top_k,
            self.table
        );
        Ok(results)
    }

    async fn reset(&self) -> Result<()> {
        let result = sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await?;
        info!(
            "Reset Postgres table '{}', removed {} chunks",
            self.table,
            result.rows_affected()
        );
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;
        Ok(count as usize)
    }

    async fn is_empty(&self) -> Result<bool> {
        let exists: bool = sqlx::query(&format!(
            "SELECT EXISTS (SELECT 1 FROM {}) AS has_rows",
            self.table
        ))
        .fetch_one(&self.pool)
        .await?
        .try_get("has_rows")?;
        Ok(!exists)
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(Some(self.dimension))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
