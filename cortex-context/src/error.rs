//! Error types for chunking and prompt assembly

/// Result type for text context operations.
pub type Result<T> = std::result::Result<T, ChunkError>;

/// Errors raised while preparing text for retrieval.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    /// The window would never advance, or would skip text.
    #[error("Invalid chunker configuration: size ({size}) must be larger than overlap ({overlap})")]
    InvalidConfiguration { size: usize, overlap: usize },
}
