//! Output records for extracted payloads.
//!
//! [`RecordBuilder`] hashes a payload (MD5, SHA-1, SHA-256) and classifies its
//! content type. It knows nothing about container offsets.

use md5::Md5;
use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// MIME reported for zero-length payloads
pub const MIME_EMPTY: &str = "application/x-empty";
/// MIME reported for printable text with no recognized signature
pub const MIME_TEXT: &str = "text/plain";
/// MIME reported when nothing else matches
pub const MIME_BINARY: &str = "application/octet-stream";

/// One extracted file, serialized as a JSON result entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedFile {
    /// Recovered filename, or a `file_<n>.bin` placeholder
    pub filename: String,
    /// Where the external writer stored the payload
    pub extracted_path: String,
    /// Payload length in bytes
    pub size: usize,
    /// Whether the block carried alignment padding
    pub padding: bool,
    /// Lowercase hex MD5 of the payload
    pub md5: String,
    /// Lowercase hex SHA-1 of the payload
    pub sha1: String,
    /// Lowercase hex SHA-256 of the payload
    pub sha256: String,
    /// Sniffed content type
    pub mime: String,
    /// Offset of the block's combined marker
    #[serde(skip)]
    pub offset: usize,
    /// Payload bytes, copied out of the container
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ExtractedFile {
    /// Returns the payload as a slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Hex digests of a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digests {
    /// MD5
    pub md5: String,
    /// SHA-1
    pub sha1: String,
    /// SHA-256
    pub sha256: String,
}

impl Digests {
    /// Hashes `data` with all three algorithms
    pub fn compute(data: &[u8]) -> Self {
        Self {
            md5: hex::encode(Md5::digest(data)),
            sha1: hex::encode(Sha1::digest(data)),
            sha256: hex::encode(Sha256::digest(data)),
        }
    }
}

/// Classifies `data` by its magic bytes
pub fn sniff_mime(data: &[u8]) -> String {
    if data.is_empty() {
        return MIME_EMPTY.to_string();
    }
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }
    if looks_like_text(data) {
        MIME_TEXT.to_string()
    } else {
        MIME_BINARY.to_string()
    }
}

fn looks_like_text(data: &[u8]) -> bool {
    match std::str::from_utf8(data) {
        Ok(text) => text
            .chars()
            .all(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r' | '\x0c')),
        Err(_) => false,
    }
}

/// Assembles [`ExtractedFile`] records
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordBuilder;

impl RecordBuilder {
    /// Creates a new builder
    pub fn new() -> Self {
        Self
    }

    /// Builds a record for `payload`.
    ///
    /// `extracted_path` and `offset` are left empty for the caller to fill in.
    pub fn build(
        &self,
        payload: &[u8],
        filename: impl Into<String>,
        had_padding: bool,
    ) -> ExtractedFile {
        let digests = Digests::compute(payload);
        ExtractedFile {
            filename: filename.into(),
            extracted_path: String::new(),
            size: payload.len(),
            padding: had_padding,
            md5: digests.md5,
            sha1: digests.sha1,
            sha256: digests.sha256,
            mime: sniff_mime(payload),
            offset: 0,
            data: payload.to_vec(),
        }
    }
}
