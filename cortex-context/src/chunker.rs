//! Sliding-window text chunking.
//!
//! Documents are split into fixed-size windows measured in characters (Unicode
//! scalar values, never bytes), so multi-byte text always produces the same
//! boundaries. Consecutive windows share exactly `overlap` characters of the raw
//! text; each window is then trimmed and dropped if nothing but whitespace is left.
//!
//! ```
//! use cortex_context::chunker::chunk_text;
//!
//! let chunks = chunk_text("AAAA BBBB CCCC DDDD", 10, 3).unwrap();
//! assert_eq!(chunks, vec!["AAAA BBBB", "BB CCCC DD", "DDDD"]);
//! ```

use crate::error::{ChunkError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Default number of characters shared by adjacent windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Window parameters for [`chunk_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum characters per window
    pub size: usize,
    /// Characters shared between adjacent windows
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkerConfig {
    /// Creates a validated configuration.
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        let config = Self { size, overlap };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the window advances on every step.
    pub fn validate(&self) -> Result<()> {
        if self.size <= self.overlap {
            return Err(ChunkError::InvalidConfiguration {
                size: self.size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    /// Number of characters the window start moves forward per step.
    pub fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Chunks `text` with this configuration.
    pub fn chunk(&self, text: &str) -> Result<Vec<String>> {
        chunk_text(text, self.size, self.overlap)
    }
}

/// One kept window of the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkSpan {
    /// Position of this span among the kept spans (0-indexed)
    pub sequence: usize,
    /// Character range of the raw, untrimmed window
    pub char_range: Range<usize>,
    /// Window text with surrounding whitespace removed
    pub text: String,
}

/// Splits `text` into overlapping windows of `size` characters.
///
/// The window start advances by `size - overlap` each step. Windows are trimmed
/// and empty ones are skipped, so the result never contains blank strings.
///
/// # Errors
/// [`ChunkError::InvalidConfiguration`] when `size <= overlap`.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(chunk_spans(text, size, overlap)?
        .into_iter()
        .map(|span| span.text)
        .collect())
}

/// Like [`chunk_text`] but also reports the raw character range of each window.
pub fn chunk_spans(text: &str, size: usize, overlap: usize) -> Result<Vec<ChunkSpan>> {
    let config = ChunkerConfig { size, overlap };
    config.validate()?;

    // Byte offset of every char boundary, plus the end of the string, so that
    // character windows can be sliced without re-walking the text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let mut spans = Vec::new();
    let mut start = 0;
    while start < char_count {
        let end = start.saturating_add(size).min(char_count);
        let window = &text[boundaries[start]..boundaries[end]];
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            spans.push(ChunkSpan {
                sequence: spans.len(),
                char_range: start..end,
                text: trimmed.to_string(),
            });
        }
        start = start.saturating_add(config.step());
    }

    tracing::debug!(
        "Chunked {} characters into {} spans (size={}, overlap={})",
        char_count,
        spans.len(),
        size,
        overlap
    );

    Ok(spans)
}
