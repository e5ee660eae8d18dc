//! Block header decoding.
//!
//! ## Block Layout
//!
//! ```text
//! marker                 COMBINED_MARKER
//! +21 opaque bytes       ignored
//! entry marker           01 00 00 00
//! length tag             4 bytes, selects a LengthEncoding
//! length fields          encoding-specific (8 bytes for FourByteLE)
//! padding                pad_len bytes
//! payload                file_len bytes
//! name                   01 00 00 00, u32 LE length, bytes
//! UTF-8 name             01 00 00 00, u32 LE length, bytes
//! ```
//!
//! Every integer is little-endian.

use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use byteorder::{ByteOrder, LE};
use std::ops::Range;
use tracing::trace;

/// Unknown bytes between the combined marker and the entry marker
pub const OPAQUE_LEN: usize = 21;

/// Entry marker preceding the length tag and each trailing name string
pub const ENTRY_MARKER: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// How `file_len` and `pad_len` are stored after the length tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LengthEncoding {
    /// Tag `00 00 00 80`, followed by `file_len` and `pad_len` as two u32 LE
    FourByteLE,
    /// Tag with the high bit clear: the tag itself is `file_len`, no padding
    Inline,
}

/// Exact tag bytes with a dedicated encoding. Tags not listed here fall
/// back to [`LengthEncoding::Inline`] when their high bit is clear.
const TAG_TABLE: &[([u8; 4], LengthEncoding)] =
    &[([0x00, 0x00, 0x00, 0x80], LengthEncoding::FourByteLE)];

impl LengthEncoding {
    /// Looks up the encoding for a tag, `None` if it is unrecognized
    pub fn from_tag(tag: [u8; 4]) -> Option<Self> {
        TAG_TABLE
            .iter()
            .find(|(bytes, _)| *bytes == tag)
            .map(|&(_, encoding)| encoding)
            .or_else(|| (tag[3] & 0x80 == 0).then_some(Self::Inline))
    }

    /// Number of length bytes following the tag
    pub fn length_field_size(self) -> usize {
        match self {
            Self::FourByteLE => 8,
            Self::Inline => 0,
        }
    }

    /// Decodes `(file_len, pad_len)` given the tag and the offset right after it
    fn decode(self, cursor: &ByteCursor<'_>, tag: [u8; 4], offset: usize) -> Result<(u32, u32)> {
        match self {
            Self::FourByteLE => {
                let file_len = cursor.read_u32_le(offset)?;
                let pad_len = cursor.read_u32_le(offset + 4)?;
                Ok((file_len, pad_len))
            }
            Self::Inline => Ok((LE::read_u32(&tag), 0)),
        }
    }
}

/// Fixed part of a block, decoded from the bytes after the marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Offset of the combined marker
    pub marker_offset: usize,
    /// Length encoding selected by the tag
    pub encoding: LengthEncoding,
    /// Declared payload length
    pub file_len: u32,
    /// Declared padding length
    pub pad_len: u32,
    /// Bytes from the marker start to the end of the length fields
    pub header_size: usize,
}

impl BlockHeader {
    /// First payload byte, after the header and its padding
    pub fn payload_start(&self) -> usize {
        self.marker_offset
            .saturating_add(self.header_size)
            .saturating_add(self.pad_len as usize)
    }
}

/// A fully decoded block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMetadata {
    /// Decoded header
    pub header: BlockHeader,
    /// Payload byte range in the container
    pub payload: Range<usize>,
    /// Recovered filename, `None` when nothing usable was found
    pub filename: Option<String>,
    /// First byte after everything this block consumed
    pub end_offset: usize,
}

impl BlockMetadata {
    /// Declared payload length
    pub fn file_len(&self) -> u32 {
        self.header.file_len
    }

    /// Declared padding length
    pub fn pad_len(&self) -> u32 {
        self.header.pad_len
    }

    /// True when the block carries alignment padding
    pub fn had_padding(&self) -> bool {
        self.header.pad_len > 0
    }

    /// Slices this block's payload out of the container
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.payload.clone()]
    }
}

/// Outcome of filename recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredName {
    /// Best filename found, if any
    pub name: Option<String>,
    /// First byte after the name metadata
    pub end_offset: usize,
}

/// Pluggable rule for recovering a block's filename
///
/// Implementations receive the offset right after the payload and must not
/// read past the cursor's bounds. Returning an error means no name metadata
/// could be located; the caller falls back to a placeholder name.
pub trait NameRecovery: Send + Sync {
    /// Recovers the filename stored at `offset`
    fn recover(&self, cursor: &ByteCursor<'_>, offset: usize) -> Result<RecoveredName>;
}

/// Reads the two length-prefixed names stored after the payload.
///
/// The UTF-8 name wins over the legacy name; empty names count as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailingNameRecovery;

impl TrailingNameRecovery {
    fn read_string(cursor: &ByteCursor<'_>, offset: usize) -> Result<(String, usize)> {
        if cursor.peek_fixed::<4>(offset)? != ENTRY_MARKER {
            return Err(Error::FilenameRecoveryFailure { offset });
        }
        let len = cursor.read_u32_le(offset + 4)? as usize;
        let raw = cursor.read_at(offset + 8, len)?;
        let text = String::from_utf8_lossy(raw)
            .trim_end_matches('\0')
            .to_string();
        Ok((text, offset + 8 + len))
    }
}

impl NameRecovery for TrailingNameRecovery {
    fn recover(&self, cursor: &ByteCursor<'_>, offset: usize) -> Result<RecoveredName> {
        let (legacy, after_legacy) = Self::read_string(cursor, offset)
            .map_err(|_| Error::FilenameRecoveryFailure { offset })?;

        let (utf8, end_offset) = match Self::read_string(cursor, after_legacy) {
            Ok((name, end)) => (Some(name), end),
            Err(e) => {
                trace!("No UTF-8 name at offset {}: {}", after_legacy, e);
                (None, after_legacy)
            }
        };

        let name = utf8
            .filter(|s| !s.is_empty())
            .or_else(|| Some(legacy).filter(|s| !s.is_empty()));

        Ok(RecoveredName { name, end_offset })
    }
}

/// Decodes the metadata following a combined marker
#[derive(Debug, Clone, Copy)]
pub struct BlockParser {
    marker_len: usize,
}

impl BlockParser {
    /// Creates a parser for markers of `marker_len` bytes
    pub fn new(marker_len: usize) -> Self {
        Self { marker_len }
    }

    /// Parses the fixed header after the marker at `marker_offset`.
    ///
    /// Errors here only invalidate this marker occurrence.
    pub fn parse_header(
        &self,
        cursor: &ByteCursor<'_>,
        marker_offset: usize,
    ) -> Result<BlockHeader> {
        let entry_offset = marker_offset + self.marker_len + OPAQUE_LEN;
        if cursor.peek_fixed::<4>(entry_offset)? != ENTRY_MARKER {
            return Err(Error::MissingEntryMarker {
                offset: entry_offset,
            });
        }

        let tag_offset = entry_offset + ENTRY_MARKER.len();
        let tag = cursor.peek_fixed::<4>(tag_offset)?;
        let encoding = LengthEncoding::from_tag(tag).ok_or(Error::UnrecognizedTag {
            offset: tag_offset,
            tag: LE::read_u32(&tag),
        })?;

        let lengths_offset = tag_offset + tag.len();
        let (file_len, pad_len) = encoding.decode(cursor, tag, lengths_offset)?;
        let header_size = lengths_offset + encoding.length_field_size() - marker_offset;

        trace!(
            "Block header at {}: {:?}, file_len={}, pad_len={}",
            marker_offset,
            encoding,
            file_len,
            pad_len
        );

        Ok(BlockHeader {
            marker_offset,
            encoding,
            file_len,
            pad_len,
            header_size,
        })
    }

    /// Locates the payload and recovers the filename.
    ///
    /// Fails with [`Error::UnboundedRead`] when the declared padding and
    /// payload do not fit in the buffer. A missing filename is not an error.
    pub fn complete(
        &self,
        cursor: &ByteCursor<'_>,
        header: BlockHeader,
        names: &dyn NameRecovery,
    ) -> Result<BlockMetadata> {
        let payload_start = header.payload_start();
        cursor.read_at(payload_start, header.file_len as usize)?;
        let payload = payload_start..payload_start + header.file_len as usize;

        let (filename, end_offset) = match names.recover(cursor, payload.end) {
            Ok(recovered) => (recovered.name, recovered.end_offset),
            Err(e) => {
                trace!("Filename recovery failed for block at {}: {}", header.marker_offset, e);
                (None, payload.end)
            }
        };

        Ok(BlockMetadata {
            header,
            payload,
            filename,
            end_offset,
        })
    }
}
