//! # rtfd-guns-core
//!
//! A library for extracting files embedded in RTFD "guns for hands"
//! containers, which concatenate payloads behind a fixed combined marker.
//!
//! This crate provides the core functionality for:
//! - Locating combined markers in untrusted container bytes
//! - Decoding the length/padding header and the trailing filenames
//! - Slicing payloads out without reading past the buffer
//! - Hashing and MIME-sniffing each payload into an output record
//!
//! ## Architecture
//!
//! - [`cursor`]: Bounds-checked reads
//! - [`scanner`]: Header detection, marker search and block decoding
//! - [`engine`]: The extraction state machine
//! - [`record`]: Output records, digests and content sniffing
//! - [`sink`]: Where extracted payloads are written
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use rtfd_guns_core::{DirectorySink, Extractor};
//! use std::fs;
//!
//! let data = fs::read("./sample.rtfd")?;
//! let mut sink = DirectorySink::new("extracted_files");
//! let extraction = Extractor::new().extract(&data, &mut sink);
//!
//! for file in &extraction.files {
//!     println!("{} {} {}", file.sha256, file.mime, file.filename);
//! }
//! if let Some(warning) = &extraction.warning {
//!     eprintln!("partial result: {}", warning);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`PayloadSink`]: Customize where payloads go
//! - [`NameRecovery`]: Customize how filenames are recovered
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod cursor;
pub mod engine;
pub mod error;
pub mod record;
pub mod scanner;
pub mod sink;

#[cfg(test)]
mod fixtures;

// Re-export primary types for convenience
pub use cursor::ByteCursor;
pub use engine::{
    extract_file, read_input, CancelToken, Extraction, Extractor, ExtractorConfig, SkippedMarker,
    Warning,
};
pub use error::{Error, Result};
pub use record::{sniff_mime, Digests, ExtractedFile, RecordBuilder};
pub use scanner::{
    BlockMetadata, BlockParser, LengthEncoding, MarkerScanner, NameRecovery, RecoveredName,
    TrailingNameRecovery, COMBINED_MARKER, RTFD_MAGIC,
};
pub use sink::{sanitize_filename, DirectorySink, NullSink, PayloadSink};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
