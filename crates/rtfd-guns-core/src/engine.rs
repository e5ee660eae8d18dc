//! The extraction loop.
//!
//! [`Extractor`] drives [`MarkerScanner`] and [`BlockParser`] as an explicit
//! state machine:
//!
//! ```text
//! Scanning --no marker--> Done
//! Scanning --marker--> ParsingBlock
//! ParsingBlock --bad header--> Scanning (past the marker only)
//! ParsingBlock --payload past end--> Done (partial, with warning)
//! ParsingBlock --ok--> Emitting --> Scanning (past the block)
//! ```
//!
//! The scan offset is carried by the states and only ever moves forward.

use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::record::{ExtractedFile, RecordBuilder};
use crate::scanner::{
    detect_header, BlockMetadata, BlockParser, MarkerScanner, NameRecovery, TrailingNameRecovery,
    RTFD_MAGIC,
};
use crate::sink::PayloadSink;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cooperative cancellation flag, checked once per loop iteration
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every run holding a clone of this token
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns true once [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Configuration for the extractor
#[derive(Debug, Clone, Default)]
pub struct ExtractorConfig {
    /// Maximum number of files to extract (0 = unlimited)
    pub max_results: usize,
    /// Return nothing for buffers that do not start with `rtfd`
    pub require_magic: bool,
    /// Optional cancellation token
    pub cancel: Option<CancelToken>,
}

impl ExtractorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of files to extract
    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Sets whether the `rtfd` magic is mandatory
    pub fn require_magic(mut self, require: bool) -> Self {
        self.require_magic = require;
        self
    }

    /// Attaches a cancellation token
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Why a run stopped before the end of the buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A block declared more payload than the buffer holds
    TruncatedPayload {
        /// Offset of the offending block's marker
        marker_offset: usize,
        /// Declared payload length
        declared: u32,
        /// Bytes actually available from the payload start
        available: usize,
    },
    /// The cancellation token fired
    Cancelled {
        /// Scan offset at the time of cancellation
        offset: usize,
    },
    /// [`ExtractorConfig::max_results`] was reached with markers left
    ResultLimit {
        /// The configured limit
        limit: usize,
    },
    /// The sink rejected a payload
    SinkFailed {
        /// Offset of the block whose payload could not be stored
        marker_offset: usize,
        /// The sink's error message
        reason: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedPayload {
                marker_offset,
                declared,
                available,
            } => write!(
                f,
                "block at offset {} declares {} payload bytes but only {} remain; \
                 extraction stopped",
                marker_offset, declared, available
            ),
            Self::Cancelled { offset } => write!(f, "extraction cancelled at offset {}", offset),
            Self::ResultLimit { limit } => write!(f, "stopped after {} files", limit),
            Self::SinkFailed {
                marker_offset,
                reason,
            } => write!(
                f,
                "could not store payload of block at offset {}: {}; extraction stopped",
                marker_offset, reason
            ),
        }
    }
}

/// A marker occurrence whose block could not be decoded
#[derive(Debug)]
pub struct SkippedMarker {
    /// Offset of the marker
    pub offset: usize,
    /// Why the block was rejected
    pub reason: Error,
}

/// Result of one extraction run
#[derive(Debug, Default)]
pub struct Extraction {
    /// Extracted files in discovery order
    pub files: Vec<ExtractedFile>,
    /// Marker occurrences that were skipped
    pub skipped: Vec<SkippedMarker>,
    /// Set when the run stopped early
    pub warning: Option<Warning>,
}

impl Extraction {
    /// True when the run stopped before reaching the end of the buffer
    pub fn is_partial(&self) -> bool {
        self.warning.is_some()
    }
}

enum State {
    Scanning { offset: usize },
    ParsingBlock { marker: usize },
    Emitting { block: BlockMetadata },
    Done(Option<Warning>),
}

/// Extracts embedded files from an RTFD container buffer
#[derive(Debug, Clone)]
pub struct Extractor<R = TrailingNameRecovery> {
    config: ExtractorConfig,
    scanner: MarkerScanner,
    parser: BlockParser,
    names: R,
    builder: RecordBuilder,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    /// Creates a new extractor with default configuration
    pub fn new() -> Self {
        Self::with_config(ExtractorConfig::default())
    }

    /// Creates a new extractor with custom configuration
    pub fn with_config(config: ExtractorConfig) -> Self {
        let scanner = MarkerScanner::new();
        let parser = BlockParser::new(scanner.marker_len());
        Self {
            config,
            scanner,
            parser,
            names: TrailingNameRecovery,
            builder: RecordBuilder::new(),
        }
    }
}

impl<R: NameRecovery> Extractor<R> {
    /// Replaces the filename recovery rule
    pub fn with_name_recovery<N: NameRecovery>(self, names: N) -> Extractor<N> {
        Extractor {
            config: self.config,
            scanner: self.scanner,
            parser: self.parser,
            names,
            builder: self.builder,
        }
    }

    /// The active configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.config
            .cancel
            .as_ref()
            .is_some_and(CancelToken::is_cancelled)
    }

    /// Extracts every embedded file from `data`, handing payloads to `sink`.
    ///
    /// Malformed blocks are skipped. A block whose declared payload runs past
    /// the end of the buffer, or whose payload the sink rejects, stops the
    /// run; files found before it are kept and [`Extraction::warning`] is set.
    pub fn extract(&self, data: &[u8], sink: &mut dyn PayloadSink) -> Extraction {
        let cursor = ByteCursor::new(data);
        let mut result = Extraction::default();

        debug!("Starting extraction over {} bytes", data.len());

        if self.config.require_magic && !data.starts_with(RTFD_MAGIC) {
            debug!("No 'rtfd' magic at start and magic is required; nothing to extract");
            return result;
        }

        let mut state = State::Scanning {
            offset: detect_header(data),
        };

        loop {
            state = match state {
                State::Scanning { offset } => {
                    if self.is_cancelled() {
                        State::Done(Some(Warning::Cancelled { offset }))
                    } else {
                        match self.scanner.find_next(data, offset) {
                            None => {
                                debug!("No more combined markers after offset {}", offset);
                                State::Done(None)
                            }
                            Some(_)
                                if self.config.max_results > 0
                                    && result.files.len() >= self.config.max_results =>
                            {
                                State::Done(Some(Warning::ResultLimit {
                                    limit: self.config.max_results,
                                }))
                            }
                            Some(marker) => {
                                debug!("Found combined marker at offset {}", marker);
                                State::ParsingBlock { marker }
                            }
                        }
                    }
                }

                State::ParsingBlock { marker } => match self.parser.parse_header(&cursor, marker) {
                    Err(reason) => {
                        debug!("Skipping marker at offset {}: {}", marker, reason);
                        result.skipped.push(SkippedMarker {
                            offset: marker,
                            reason,
                        });
                        State::Scanning {
                            offset: marker + self.scanner.marker_len(),
                        }
                    }
                    Ok(header) => match self.parser.complete(&cursor, header, &self.names) {
                        Ok(block) => State::Emitting { block },
                        Err(e) => {
                            let warning = Warning::TruncatedPayload {
                                marker_offset: marker,
                                declared: header.file_len,
                                available: data.len().saturating_sub(header.payload_start()),
                            };
                            warn!("{} ({})", warning, e);
                            State::Done(Some(warning))
                        }
                    },
                },

                State::Emitting { block } => {
                    let filename = block
                        .filename
                        .clone()
                        .unwrap_or_else(|| format!("file_{}.bin", result.files.len() + 1));
                    let payload = block.payload(data);
                    let marker_offset = block.header.marker_offset;
                    match sink.store(&filename, payload) {
                        Ok(extracted_path) => {
                            debug!(
                                "Extracted '{}' ({} bytes, padding {}) from block at {}",
                                filename,
                                payload.len(),
                                block.pad_len(),
                                marker_offset
                            );

                            result.files.push(ExtractedFile {
                                extracted_path,
                                offset: marker_offset,
                                ..self.builder.build(payload, filename, block.had_padding())
                            });

                            State::Scanning {
                                offset: block.end_offset,
                            }
                        }
                        Err(e) => {
                            let warning = Warning::SinkFailed {
                                marker_offset,
                                reason: e.to_string(),
                            };
                            warn!("{}", warning);
                            State::Done(Some(warning))
                        }
                    }
                }

                State::Done(warning) => {
                    result.warning = warning;
                    break;
                }
            };
        }

        debug!(
            "Extraction complete: {} files, {} skipped markers",
            result.files.len(),
            result.skipped.len()
        );
        result
    }
}

/// Reads a container into memory, rejecting missing and empty files
pub fn read_input(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| Error::input_unavailable(path, e))?;
    if data.is_empty() {
        return Err(Error::EmptyInput {
            path: path.to_path_buf(),
        });
    }
    Ok(data)
}

/// Reads a container and extracts it with the default configuration
pub fn extract_file(path: impl AsRef<Path>, sink: &mut dyn PayloadSink) -> Result<Extraction> {
    let data = read_input(path)?;
    Ok(Extractor::new().extract(&data, sink))
}
