//! Backend selection, done once at startup.

use super::memory_store::MemoryVectorStore;
use super::pg_store::PgVectorStore;
use super::sqlite_store::SqliteVectorStore;
use super::{Result, StoreError, VectorStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Supported storage backends, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Sqlite,
    Postgres,
}

impl std::str::FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pgvector" => Ok(Self::Postgres),
            _ => Err(StoreError::InvalidConfig(format!(
                "Unsupported vector backend: {s}. Supported backends: memory, sqlite, postgres"
            ))),
        }
    }
}

/// A fully resolved backend with everything needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite {
        path: PathBuf,
    },
    Postgres {
        database_url: String,
        table: String,
        dimension: usize,
    },
}

/// True for URLs that should be served by the Postgres backend.
pub fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}

impl StoreBackend {
    /// Resolves the backend from configuration values.
    ///
    /// An explicit `kind` wins. Without one, a Postgres `database_url` selects
    /// Postgres and anything else falls back to SQLite at `sqlite_path`.
    pub fn resolve(
        kind: Option<BackendKind>,
        database_url: Option<&str>,
        sqlite_path: PathBuf,
        table: &str,
        dimension: usize,
    ) -> Result<Self> {
        let kind = kind.unwrap_or(match database_url {
            Some(url) if is_postgres_url(url) => BackendKind::Postgres,
            Some(url) if !url.trim().is_empty() => {
                warn!(
                    "DATABASE_URL is set but not a postgres:// URL; falling back to SQLite at {}",
                    sqlite_path.display()
                );
                BackendKind::Sqlite
            }
            _ => BackendKind::Sqlite,
        });

        match kind {
            BackendKind::Memory => Ok(Self::Memory),
            BackendKind::Sqlite => Ok(Self::Sqlite { path: sqlite_path }),
            BackendKind::Postgres => {
                let database_url = database_url.filter(|u| is_postgres_url(u)).ok_or_else(|| {
                    StoreError::InvalidConfig(
                        "the postgres backend needs a postgres:// DATABASE_URL".to_string(),
                    )
                })?;
                Ok(Self::Postgres {
                    database_url: database_url.to_string(),
                    table: table.to_string(),
                    dimension,
                })
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Memory => BackendKind::Memory,
            Self::Sqlite { .. } => BackendKind::Sqlite,
            Self::Postgres { .. } => BackendKind::Postgres,
        }
    }
}

/// Opens the store described by `backend`.
///
/// The memory and SQLite backends take their dimension from the first add;
/// Postgres needs it up front for the `vector(D)` column.
pub async fn open_store(backend: &StoreBackend) -> Result<Arc<dyn VectorStore>> {
    info!("Opening vector store backend: {:?}", backend.kind());
    match backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryVectorStore::new())),
        StoreBackend::Sqlite { path } => Ok(Arc::new(SqliteVectorStore::open(path, None).await?)),
        StoreBackend::Postgres {
            database_url,
            table,
            dimension,
        } => Ok(Arc::new(
            PgVectorStore::connect(database_url, table, *dimension).await?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!("SQLite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!("postgres".parse::<BackendKind>().unwrap(), BackendKind::Postgres);
        assert!("chroma".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_auto_selection() {
        let path = PathBuf::from("vector_store.db");

        let backend =
            StoreBackend::resolve(None, Some("postgres://u:p@db/kb"), path.clone(), "chunks", 1536)
                .unwrap();
        assert_eq!(backend.kind(), BackendKind::Postgres);

        let backend = StoreBackend::resolve(None, None, path.clone(), "chunks", 1536).unwrap();
        assert_eq!(backend, StoreBackend::Sqlite { path: path.clone() });

        let backend =
            StoreBackend::resolve(None, Some("sqlite://other.db"), path.clone(), "chunks", 1536)
                .unwrap();
        assert_eq!(backend.kind(), BackendKind::Sqlite);

        let backend = StoreBackend::resolve(
            Some(BackendKind::Memory),
            Some("postgres://u:p@db/kb"),
            path.clone(),
            "chunks",
            1536,
        )
        .unwrap();
        assert_eq!(backend, StoreBackend::Memory);
    }

    #[test]
    #[traced_test]
    fn test_unrecognised_database_url_warns() {
        let path = PathBuf::from("vector_store.db");
        let backend = StoreBackend::resolve(
            None,
            Some("postgresql+psycopg://u:p@db/kb"),
            path.clone(),
            "chunks",
            1536,
        )
        .unwrap();
        assert_eq!(backend, StoreBackend::Sqlite { path });
        assert!(logs_contain("DATABASE_URL is set but not a postgres:// URL"));
    }

    #[test]
    fn test_postgres_requires_url() {
        let err = StoreBackend::resolve(
            Some(BackendKind::Postgres),
            None,
            PathBuf::from("x.db"),
            "chunks",
            1536,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_open_memory_and_sqlite() {
        let store = open_store(&StoreBackend::Memory).await.unwrap();
        assert_eq!(store.backend_name(), "memory");

        let temp_dir = tempdir().unwrap();
        let store = open_store(&StoreBackend::Sqlite {
            path: temp_dir.path().join("kb.db"),
        })
        .await
        .unwrap();
        assert_eq!(store.backend_name(), "sqlite");
        assert!(store.is_empty().await.unwrap());
    }
}
