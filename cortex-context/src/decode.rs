//! Two-step decoding of uploaded document bytes.
//!
//! Bytes are decoded as UTF-8 first. If that fails they are decoded as Latin-1
//! (ISO-8859-1), which maps every byte to the code point of the same value and
//! therefore never fails and never drops data.

use serde::Serialize;

/// Encoding that was actually used to decode a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

/// Decoded document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: TextEncoding,
}

/// Decodes `bytes` as UTF-8, falling back to Latin-1.
pub fn decode_document(bytes: &[u8]) -> DecodedText {
    match std::str::from_utf8(bytes) {
        Ok(text) => DecodedText {
            text: text.to_string(),
            encoding: TextEncoding::Utf8,
        },
        Err(e) => {
            tracing::warn!(
                "Document is not valid UTF-8 (valid up to byte {}), decoding as Latin-1",
                e.valid_up_to()
            );
            DecodedText {
                text: decode_latin1(bytes),
                encoding: TextEncoding::Latin1,
            }
        }
    }
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
