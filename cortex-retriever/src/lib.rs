//! cortex-retriever: chunk storage and semantic retrieval
//!
//! This crate stores document chunks with their embeddings and retrieves the
//! most similar ones for a query. It sits on top of `cortex-context` (chunking,
//! prompt assembly) and `cortex-embed` (embedding client).
//!
//! ## Key Modules
//!
//! - **[`storage`]**: [`VectorStore`](storage::VectorStore) trait with in-memory,
//!   SQLite and Postgres/pgvector backends
//! - **[`retrieval`]**: query embedding plus store search
//! - **[`service`]**: ingest / query / answer operations over one store
//! - **[`config`]**: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cortex_retriever::config::KnowledgeConfig;
//! use cortex_retriever::service::{IngestRequest, KnowledgeService, QueryRequest};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = KnowledgeConfig::load(None)?;
//! let service = KnowledgeService::from_config(&config).await?;
//!
//! service.ingest(IngestRequest::text("Rust has no garbage collector.")).await?;
//! let response = service.query(QueryRequest::new("memory management").with_top_k(3)).await?;
//! println!("{}", response.prompt);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ingest: text → Chunker → EmbeddingClient → VectorStore::add
//! query:  text → EmbeddingClient → VectorStore::search → build_prompt
//! ```

pub mod config;
pub mod retrieval;
pub mod service;
pub mod storage;
