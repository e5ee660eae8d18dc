//! Marker scanning for RTFD combined-marker containers.
//!
//! ## Container Overview
//!
//! A container optionally starts with the 4-byte magic `rtfd`. Each embedded
//! file is introduced by [`COMBINED_MARKER`], the two serialized key names
//! `__@PreferredName@__` and `__@UTF8PreferredName@__`, each prefixed with its
//! little-endian length. The metadata following the marker is decoded by
//! [`BlockParser`].
//!
//! ## Algorithm Overview
//!
//! 1. Skip the `rtfd` magic if present
//! 2. Search for the next combined marker from the current offset
//! 3. Parse the block header and payload range after the marker
//! 4. Continue searching after the block, or after the marker if it was bogus

mod block;

use memchr::memmem;
use tracing::debug;

pub use block::{
    BlockHeader, BlockMetadata, BlockParser, LengthEncoding, NameRecovery, RecoveredName,
    TrailingNameRecovery, ENTRY_MARKER, OPAQUE_LEN,
};

/// Magic tag at the very start of an RTFD container
pub const RTFD_MAGIC: &[u8; 4] = b"rtfd";

/// Marker introducing every embedded file block
pub const COMBINED_MARKER: &[u8] =
    b"\x13\x00\x00\x00__@PreferredName@__\x17\x00\x00\x00__@UTF8PreferredName@__";

/// Returns the offset scanning starts at: 4 past the magic, or 0 without it
pub fn detect_header(data: &[u8]) -> usize {
    if data.starts_with(RTFD_MAGIC) {
        debug!("Found 'rtfd' magic at start; skipping {} bytes", RTFD_MAGIC.len());
        RTFD_MAGIC.len()
    } else {
        debug!("No 'rtfd' magic at start; scanning from offset 0");
        0
    }
}

/// Forward search for the combined marker
#[derive(Debug, Clone)]
pub struct MarkerScanner {
    finder: memmem::Finder<'static>,
}

impl Default for MarkerScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerScanner {
    /// Creates a scanner for [`COMBINED_MARKER`]
    pub fn new() -> Self {
        Self {
            finder: memmem::Finder::new(COMBINED_MARKER),
        }
    }

    /// Length of the marker in bytes
    pub fn marker_len(&self) -> usize {
        self.finder.needle().len()
    }

    /// Finds the leftmost marker at or after `start`
    pub fn find_next(&self, data: &[u8], start: usize) -> Option<usize> {
        let remaining = data.get(start..)?;
        self.finder.find(remaining).map(|pos| start + pos)
    }
}
