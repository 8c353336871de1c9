//! # cortex-context
//!
//! Text preparation for the Cortex retrieval pipeline: splitting documents into
//! overlapping windows before embedding, decoding uploaded bytes, and assembling
//! ranked context into the prompt handed to a language model.
//!
//! ```
//! use cortex_context::{build_prompt, chunk_text};
//!
//! let chunks = chunk_text("Rust is a systems language. It has no GC.", 28, 4).unwrap();
//! let prompt = build_prompt("Does Rust have a GC?", &chunks, None, 1500);
//! assert!(prompt.ends_with("User question: Does Rust have a GC?\n\nAnswer:"));
//! ```

pub mod chunker;
pub mod decode;
pub mod error;
pub mod prompt;

pub use chunker::{ChunkSpan, ChunkerConfig, chunk_spans, chunk_text};
pub use decode::{DecodedText, TextEncoding, decode_document};
pub use error::{ChunkError, Result};
pub use prompt::{DEFAULT_INSTRUCTION, DEFAULT_MAX_CONTEXT_CHARS, PromptBuilder, build_prompt};
