//! The ingest / query / answer boundary used by outer layers (CLI, HTTP routes).
//!
//! A [`KnowledgeService`] owns one store, one embedding client and the chunking
//! and prompt settings. Nothing here is global: build as many services as you
//! need, each with its own store.

use crate::config::{ConfigError, KnowledgeConfig};
use crate::retrieval::retriever::{RetrievalError, Retriever};
use crate::storage::factory::open_store;
use crate::storage::{ChunkId, Metadata, QueryResult, StoreError, VectorStore};
use cortex_context::{ChunkError, ChunkerConfig, DEFAULT_MAX_CONTEXT_CHARS, build_prompt, decode_document};
use cortex_embed::{EmbedError, EmbeddingClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Source name used for raw text without an explicit source.
pub const DEFAULT_TEXT_SOURCE: &str = "text_input";

/// Number of results returned when a request does not say.
pub const DEFAULT_TOP_K: usize = 5;

const ORCHESTRATOR_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Chunking failed: {0}")]
    Chunking(#[from] ChunkError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Orchestrator request failed: {0}")]
    Orchestrator(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, KnowledgeError>;

/// A document uploaded as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Exactly one of `text` and `file` must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file: Option<UploadedFile>,
}

impl IngestRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn file(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file: Some(UploadedFile {
                filename: filename.into(),
                bytes,
            }),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Fresh identifier for this ingest call, also stored in chunk metadata
    pub doc_id: String,
    pub source: String,
    /// Number of chunks stored
    pub chunks: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Replaces the default prompt header
    #[serde(default)]
    pub instruction: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            instruction: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }
}

/// One ranked chunk as returned to callers. The embedding is left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: ChunkId,
    pub source: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

impl From<QueryResult> for QueryHit {
    fn from(result: QueryResult) -> Self {
        Self {
            id: result.chunk.id,
            source: result.chunk.source,
            text: result.chunk.text,
            metadata: result.chunk.metadata,
            score: result.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<QueryHit>,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Forwarded to the orchestrator as-is
    #[serde(default)]
    pub model: Option<String>,
}

impl AnswerRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            model: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub results: Vec<QueryHit>,
    pub prompt: String,
    /// Orchestrator reply, `None` when no orchestrator is configured
    pub llm_response: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub backend: String,
    pub chunks: usize,
    pub dimension: Option<usize>,
}

#[derive(Debug, Serialize)]
struct OrchestratorRequest<'a> {
    prompt: &'a str,
    model: Option<&'a str>,
}

/// Client for the language-model orchestrator's `/api/query` endpoint.
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    client: reqwest::Client,
    base_url: String,
}

impl OrchestratorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, ORCHESTRATOR_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Sends `prompt` and returns the orchestrator's JSON reply.
    pub async fn complete(&self, prompt: &str, model: Option<&str>) -> Result<serde_json::Value> {
        let url = format!("{}/api/query", self.base_url.trim_end_matches('/'));
        debug!("Forwarding prompt ({} chars) to {}", prompt.chars().count(), url);
        let response = self
            .client
            .post(&url)
            .json(&OrchestratorRequest { prompt, model })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Retrieval pipeline behind the ingest / query / answer operations.
pub struct KnowledgeService {
    store: Arc<dyn VectorStore>,
    embedder: EmbeddingClient,
    retriever: Retriever,
    chunker: ChunkerConfig,
    max_context_chars: usize,
    orchestrator: Option<OrchestratorClient>,
}

impl std::fmt::Debug for KnowledgeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeService")
            .field("store", &self.store.backend_name())
            .field("embedder", &self.embedder)
            .field("chunker", &self.chunker)
            .field("max_context_chars", &self.max_context_chars)
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

impl KnowledgeService {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: EmbeddingClient,
        chunker: ChunkerConfig,
    ) -> Result<Self> {
        chunker.validate()?;
        Ok(Self {
            retriever: Retriever::new(embedder.clone(), store.clone()),
            store,
            embedder,
            chunker,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            orchestrator: None,
        })
    }

    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: OrchestratorClient) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// Opens the configured store and builds the embedding client.
    pub async fn from_config(config: &KnowledgeConfig) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config.store_backend()?).await?;
        let embedder = EmbeddingClient::from_config(&config.embed_config())?;

        let mut service = Self::new(store, embedder, config.chunker())?
            .with_max_context_chars(config.max_context_chars);
        if let Some(url) = &config.orchestrator_url {
            service = service.with_orchestrator(OrchestratorClient::new(url.clone())?);
        }
        Ok(service)
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Chunks, embeds and stores one document.
    ///
    /// A document with no non-blank content is accepted and stores nothing.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse> {
        let explicit_source = request.source.filter(|s| !s.trim().is_empty());
        let (content, default_source) = match (request.text, request.file) {
            (Some(text), None) => (text, DEFAULT_TEXT_SOURCE.to_string()),
            (None, Some(file)) => {
                let decoded = decode_document(&file.bytes);
                debug!(
                    "Decoded '{}' ({} bytes) as {:?}",
                    file.filename,
                    file.bytes.len(),
                    decoded.encoding
                );
                (decoded.text, file.filename)
            }
            (Some(_), Some(_)) => {
                return Err(KnowledgeError::InvalidRequest(
                    "provide either text or a file, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(KnowledgeError::InvalidRequest(
                    "provide text or a file".to_string(),
                ));
            }
        };
        let source = explicit_source.unwrap_or(default_source);
        let doc_id = uuid::Uuid::new_v4().to_string();

        let chunks = self.chunker.chunk(&content)?;
        if chunks.is_empty() {
            info!("Document '{}' has no content to index", source);
            return Ok(IngestResponse {
                doc_id,
                source,
                chunks: 0,
            });
        }

        let embeddings = self.embedder.embed(&chunks).await?.into_embeddings();

        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), source.clone());
        metadata.insert("doc_id".to_string(), doc_id.clone());
        let metadatas = vec![metadata; chunks.len()];

        let stored = self
            .store
            .add(&source, &chunks, &embeddings, Some(metadatas.as_slice()))
            .await?;

        info!(
            "Ingested '{}' as {} chunks (doc_id {})",
            source,
            stored.len(),
            doc_id
        );
        Ok(IngestResponse {
            doc_id,
            source,
            chunks: stored.len(),
        })
    }

    /// Runs semantic search and builds a prompt from the results.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let (results, prompt) = self
            .search_and_prompt(&request.query, request.top_k, request.instruction.as_deref())
            .await?;
        Ok(QueryResponse { results, prompt })
    }

    /// Like [`query`](Self::query) with the default instruction, then forwards
    /// the prompt to the orchestrator when one is configured.
    pub async fn answer(&self, request: AnswerRequest) -> Result<AnswerResponse> {
        let (results, prompt) = self
            .search_and_prompt(&request.query, request.top_k, None)
            .await?;

        let llm_response = match &self.orchestrator {
            Some(orchestrator) => Some(
                orchestrator
                    .complete(&prompt, request.model.as_deref())
                    .await?,
            ),
            None => None,
        };

        Ok(AnswerResponse {
            results,
            prompt,
            llm_response,
        })
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            backend: self.store.backend_name().to_string(),
            chunks: self.store.len().await?,
            dimension: self.store.dimension().await?,
        })
    }

    pub async fn reset(&self) -> Result<()> {
        self.store.reset().await?;
        Ok(())
    }

    async fn search_and_prompt(
        &self,
        query: &str,
        top_k: usize,
        instruction: Option<&str>,
    ) -> Result<(Vec<QueryHit>, String)> {
        if query.trim().is_empty() {
            return Err(KnowledgeError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }

        let results = self.retriever.search_text(query, top_k).await?;
        let prompt = build_prompt(
            query,
            results.iter().map(|r| r.chunk.text.as_str()),
            instruction,
            self.max_context_chars,
        );
        let hits = results.into_iter().map(QueryHit::from).collect();
        Ok((hits, prompt))
    }
}
