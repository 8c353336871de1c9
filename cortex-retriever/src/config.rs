//! Service configuration: defaults, then an optional TOML file, then environment.

use crate::storage::factory::{BackendKind, StoreBackend};
use crate::storage::pg_store::{DEFAULT_DIMENSION, DEFAULT_TABLE};
use cortex_context::{ChunkerConfig, DEFAULT_MAX_CONTEXT_CHARS};
use cortex_embed::{EmbedConfig, ProviderKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Everything needed to assemble a [`KnowledgeService`](crate::service::KnowledgeService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub embedding_provider: ProviderKind,
    /// Base URL of the embedding service (API base URL for `openai`)
    pub embedding_service_url: String,
    /// Path appended to `embedding_service_url` for the `http` provider
    pub embeddings_path: String,
    pub embedding_model: Option<String>,
    pub embedding_timeout_secs: u64,
    pub batch_size: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Explicit backend; chosen from `database_url` when unset
    pub backend: Option<BackendKind>,
    pub vector_db_path: PathBuf,
    pub database_url: Option<String>,
    pub pg_table: String,
    pub embedding_dimension: usize,
    pub max_context_chars: usize,
    pub orchestrator_url: Option<String>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        let chunker = ChunkerConfig::default();
        Self {
            embedding_provider: ProviderKind::Http,
            embedding_service_url: "http://localhost:7002".to_string(),
            embeddings_path: "/api/embeddings".to_string(),
            embedding_model: None,
            embedding_timeout_secs: cortex_embed::config::DEFAULT_TIMEOUT_SECS,
            batch_size: cortex_embed::config::DEFAULT_BATCH_SIZE,
            chunk_size: chunker.size,
            chunk_overlap: chunker.overlap,
            backend: None,
            vector_db_path: PathBuf::from("vector_store.db"),
            database_url: None,
            pg_table: DEFAULT_TABLE.to_string(),
            embedding_dimension: DEFAULT_DIMENSION,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            orchestrator_url: None,
        }
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, format!("'{value}': {e}")))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl KnowledgeConfig {
    /// Loads defaults, the optional TOML file, then process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file. Keys that are absent keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides from `lookup`, which maps an environment variable name
    /// to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EMBEDDING_PROVIDER") {
            self.embedding_provider = v.parse().map_err(|e: cortex_embed::EmbedError| {
                ConfigError::invalid("EMBEDDING_PROVIDER", e.to_string())
            })?;
        }
        if let Some(v) = lookup("EMBEDDING_SERVICE_URL").and_then(non_empty) {
            self.embedding_service_url = v;
        }
        if let Some(v) = lookup("EMBEDDINGS_PATH") {
            self.embeddings_path = v;
        }
        if let Some(v) = lookup("EMBEDDING_MODEL") {
            self.embedding_model = non_empty(v);
        }
        if let Some(v) = lookup("EMBEDDING_TIMEOUT_SECS") {
            self.embedding_timeout_secs = parse_value("EMBEDDING_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("EMBEDDINGS_BATCH_SIZE") {
            self.batch_size = parse_value("EMBEDDINGS_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("CHUNK_SIZE") {
            self.chunk_size = parse_value("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("CHUNK_OVERLAP") {
            self.chunk_overlap = parse_value("CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = lookup("VECTOR_BACKEND") {
            self.backend = match non_empty(v) {
                Some(v) => Some(v.parse().map_err(|e: crate::storage::StoreError| {
                    ConfigError::invalid("VECTOR_BACKEND", e.to_string())
                })?),
                None => None,
            };
        }
        if let Some(v) = lookup("VECTOR_DB_PATH").and_then(non_empty) {
            self.vector_db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = non_empty(v);
        }
        if let Some(v) = lookup("PG_TABLE").and_then(non_empty) {
            self.pg_table = v;
        }
        if let Some(v) = lookup("EMBEDDING_DIMENSION") {
            self.embedding_dimension = parse_value("EMBEDDING_DIMENSION", &v)?;
        }
        if let Some(v) = lookup("MAX_CONTEXT_CHARS") {
            self.max_context_chars = parse_value("MAX_CONTEXT_CHARS", &v)?;
        }
        if let Some(v) = lookup("ORCHESTRATOR_URL") {
            self.orchestrator_url = non_empty(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunker()
            .validate()
            .map_err(|e| ConfigError::invalid("chunk_size/chunk_overlap", e.to_string()))?;
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be greater than zero"));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::invalid(
                "embedding_dimension",
                "must be greater than zero",
            ));
        }
        self.embed_config()
            .validate()
            .map_err(|e| ConfigError::invalid("embedding", e.to_string()))?;
        self.store_backend()?;
        Ok(())
    }

    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig {
            size: self.chunk_size,
            overlap: self.chunk_overlap,
        }
    }

    /// Embedding client settings. For the `http` provider the endpoint is
    /// `embedding_service_url` joined with `embeddings_path`.
    pub fn embed_config(&self) -> EmbedConfig {
        let base = self.embedding_service_url.trim_end_matches('/');
        let config = match self.embedding_provider {
            ProviderKind::Http => {
                let path = self.embeddings_path.trim();
                let endpoint = if path.is_empty() {
                    base.to_string()
                } else {
                    format!("{base}/{}", path.trim_start_matches('/'))
                };
                EmbedConfig::http(endpoint)
            }
            ProviderKind::OpenAi => {
                let mut config = EmbedConfig::openai(base, "");
                config.model = self.embedding_model.clone();
                config
            }
        };
        config
            .with_batch_size(self.batch_size)
            .with_timeout_secs(self.embedding_timeout_secs)
    }

    pub fn store_backend(&self) -> Result<StoreBackend, ConfigError> {
        StoreBackend::resolve(
            self.backend,
            self.database_url.as_deref(),
            self.vector_db_path.clone(),
            &self.pg_table,
            self.embedding_dimension,
        )
        .map_err(|e| ConfigError::invalid("backend", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = KnowledgeConfig::default();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.embedding_dimension, 1536);
        assert_eq!(config.max_context_chars, 1500);
        assert_eq!(config.pg_table, "chunks");
        assert!(config.validate().is_ok());
        assert_eq!(
            config.embed_config().endpoint,
            "http://localhost:7002/api/embeddings"
        );
        assert_eq!(
            config.store_backend().unwrap(),
            StoreBackend::Sqlite {
                path: PathBuf::from("vector_store.db")
            }
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = KnowledgeConfig::default();
        config
            .apply_overrides(env(&[
                ("EMBEDDING_SERVICE_URL", "http://embed:9000/"),
                ("EMBEDDINGS_BATCH_SIZE", "8"),
                ("CHUNK_SIZE", "400"),
                ("CHUNK_OVERLAP", "50"),
                ("DATABASE_URL", "postgres://kb:kb@db:5432/kb"),
                ("PG_TABLE", "kb_chunks"),
                ("EMBEDDING_DIMENSION", "384"),
                ("ORCHESTRATOR_URL", "http://llm:8000"),
            ]))
            .unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.embed_config().endpoint, "http://embed:9000/api/embeddings");
        assert_eq!(config.embed_config().batch_size, 8);
        assert_eq!(config.chunker(), ChunkerConfig::new(400, 50).unwrap());
        assert_eq!(config.orchestrator_url.as_deref(), Some("http://llm:8000"));
        assert_eq!(
            config.store_backend().unwrap(),
            StoreBackend::Postgres {
                database_url: "postgres://kb:kb@db:5432/kb".to_string(),
                table: "kb_chunks".to_string(),
                dimension: 384,
            }
        );
    }

    #[test]
    fn test_explicit_backend_and_blank_values() {
        let mut config = KnowledgeConfig::default();
        config
            .apply_overrides(env(&[
                ("VECTOR_BACKEND", "memory"),
                ("DATABASE_URL", "  "),
                ("ORCHESTRATOR_URL", ""),
            ]))
            .unwrap();
        assert_eq!(config.backend, Some(BackendKind::Memory));
        assert_eq!(config.database_url, None);
        assert_eq!(config.orchestrator_url, None);
        assert_eq!(config.store_backend().unwrap(), StoreBackend::Memory);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = KnowledgeConfig::default();
        let err = config
            .apply_overrides(env(&[("EMBEDDINGS_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "EMBEDDINGS_BATCH_SIZE"));

        assert!(
            KnowledgeConfig::default()
                .apply_overrides(env(&[("VECTOR_BACKEND", "chroma")]))
                .is_err()
        );

        let mut config = KnowledgeConfig::default();
        config.chunk_overlap = config.chunk_size;
        assert!(config.validate().is_err());

        let mut config = KnowledgeConfig::default();
        config.backend = Some(BackendKind::Postgres);
        assert!(config.validate().is_err());

        let mut config = KnowledgeConfig::default();
        config.pg_table = "bad name".to_string();
        config.database_url = Some("postgres://localhost/kb".to_string());
        // Table names are checked when the store is opened.
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_openai_provider_config() {
        let mut config = KnowledgeConfig::default();
        config
            .apply_overrides(env(&[
                ("EMBEDDING_PROVIDER", "openai"),
                ("EMBEDDING_SERVICE_URL", "https://api.openai.com/v1"),
            ]))
            .unwrap();
        // The model is required for openai.
        assert!(config.validate().is_err());

        config
            .apply_overrides(env(&[("EMBEDDING_MODEL", "text-embedding-3-small")]))
            .unwrap();
        assert!(config.validate().is_ok());
        let embed = config.embed_config();
        assert_eq!(embed.provider, ProviderKind::OpenAi);
        assert_eq!(embed.endpoint, "https://api.openai.com/v1");
        assert_eq!(embed.model.as_deref(), Some("text-embedding-3-small"));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("cortex.toml");
        std::fs::write(
            &path,
            r#"
            chunk_size = 200
            chunk_overlap = 20
            backend = "memory"
            max_context_chars = 500
            "#,
        )
        .unwrap();

        let config = KnowledgeConfig::from_file(&path).unwrap();
        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.chunk_overlap, 20);
        assert_eq!(config.backend, Some(BackendKind::Memory));
        assert_eq!(config.max_context_chars, 500);
        assert_eq!(config.batch_size, 32);

        let missing = KnowledgeConfig::from_file(&temp_dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        std::fs::write(&path, "chunk_size = \"big\"").unwrap();
        assert!(matches!(
            KnowledgeConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
