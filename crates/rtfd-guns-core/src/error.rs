//! Error types for the rtfd-guns-core library.
//!
//! Per-block errors ([`Error::UnboundedRead`], [`Error::UnrecognizedTag`],
//! [`Error::MissingEntryMarker`], [`Error::FilenameRecoveryFailure`]) are
//! contained by the extraction engine. The remaining variants end a run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for extraction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all extraction operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Source container missing or unreadable
    #[error("failed to read input '{path}': {source}")]
    InputUnavailable {
        /// Path to the container that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Source container is zero bytes long
    #[error("input '{path}' is empty")]
    EmptyInput {
        /// Path to the empty container
        path: PathBuf,
    },

    /// A byte range was requested that does not fit in the buffer
    #[error("read of {len} bytes at offset {offset} exceeds buffer of {available} bytes")]
    UnboundedRead {
        /// Start of the requested range
        offset: usize,
        /// Requested length
        len: usize,
        /// Total buffer length
        available: usize,
    },

    /// Length-encoding tag with no known decoding
    #[error("unrecognized length tag {tag:#010x} at offset {offset}")]
    UnrecognizedTag {
        /// Offset of the tag bytes
        offset: usize,
        /// Tag value, read little-endian
        tag: u32,
    },

    /// The `01 00 00 00` entry marker was not where the block header expects it
    #[error("missing entry marker at offset {offset}")]
    MissingEntryMarker {
        /// Offset where the entry marker was expected
        offset: usize,
    },

    /// No usable filename text after the payload
    #[error("no filename recoverable at offset {offset}")]
    FilenameRecoveryFailure {
        /// Offset where name recovery started
        offset: usize,
    },

    /// Failed to write an extracted payload
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to create output directory
    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreate {
        /// Path to the directory that failed to create
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Refused to overwrite an existing file
    #[error("file already exists: '{path}'")]
    FileExists {
        /// Path of the existing file
        path: PathBuf,
    },

    /// Path traversal attempt detected (security error)
    #[error("path traversal detected: '{path}' would escape output directory")]
    PathTraversal {
        /// The suspicious path
        path: PathBuf,
    },
}

impl Error {
    /// Creates a new input-unavailable error
    pub fn input_unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::InputUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Creates a new out-of-bounds read error
    pub fn unbounded_read(offset: usize, len: usize, available: usize) -> Self {
        Self::UnboundedRead {
            offset,
            len,
            available,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new directory creation error
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new path traversal error
    pub fn path_traversal(path: impl Into<PathBuf>) -> Self {
        Self::PathTraversal { path: path.into() }
    }
}
