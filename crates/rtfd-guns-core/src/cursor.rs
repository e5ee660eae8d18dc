//! Bounds-checked reads over the container buffer.
//!
//! [`ByteCursor`] never hands out a short read. Every request that would run
//! past the end of the buffer, including one whose end offset overflows
//! `usize`, fails with [`Error::UnboundedRead`].

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LE};

/// Stateless read helper over an immutable byte buffer.
///
/// Offsets are passed explicitly; the cursor keeps no position of its own.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
}

impl<'a> ByteCursor<'a> {
    /// Wraps a buffer
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Total buffer length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The underlying buffer
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Returns `len` bytes starting at `offset`
    pub fn read_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::unbounded_read(offset, len, self.data.len()))?;
        Ok(&self.data[offset..end])
    }

    /// Copies exactly `N` bytes starting at `offset`
    pub fn peek_fixed<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_at(offset, N)?);
        Ok(out)
    }

    /// Reads a little-endian `u32` at `offset`
    pub fn read_u32_le(&self, offset: usize) -> Result<u32> {
        Ok(LE::read_u32(self.read_at(offset, 4)?))
    }
}
