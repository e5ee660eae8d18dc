//! Container builders shared by the unit tests.

use crate::scanner::{COMBINED_MARKER, ENTRY_MARKER, OPAQUE_LEN, RTFD_MAGIC};

/// Builds the bytes of one embedded file block
pub(crate) struct BlockBuilder {
    payload: Vec<u8>,
    pad_len: u32,
    inline: bool,
    tag: Option<[u8; 4]>,
    declared_len: Option<u32>,
    legacy_name: Option<String>,
    name: Option<String>,
}

impl BlockBuilder {
    pub(crate) fn new(payload: &[u8]) -> Self {
        Self {
            payload: payload.to_vec(),
            pad_len: 0,
            inline: false,
            tag: None,
            declared_len: None,
            legacy_name: None,
            name: None,
        }
    }

    pub(crate) fn padding(mut self, pad_len: u32) -> Self {
        self.pad_len = pad_len;
        self
    }

    pub(crate) fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    pub(crate) fn tag(mut self, tag: [u8; 4]) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Declares a `file_len` different from the real payload length
    pub(crate) fn declared_len(mut self, len: u32) -> Self {
        self.declared_len = Some(len);
        self
    }

    pub(crate) fn legacy_name(mut self, name: &str) -> Self {
        self.legacy_name = Some(name.to_string());
        self
    }

    pub(crate) fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let file_len = self.declared_len.unwrap_or(self.payload.len() as u32);
        let mut out = COMBINED_MARKER.to_vec();
        out.extend_from_slice(&[0u8; OPAQUE_LEN]);
        out.extend_from_slice(&ENTRY_MARKER);

        if self.inline {
            out.extend_from_slice(&self.tag.unwrap_or(file_len.to_le_bytes()));
        } else {
            out.extend_from_slice(&self.tag.unwrap_or([0x00, 0x00, 0x00, 0x80]));
            out.extend_from_slice(&file_len.to_le_bytes());
            out.extend_from_slice(&self.pad_len.to_le_bytes());
        }

        out.extend(std::iter::repeat(0u8).take(self.pad_len as usize));
        out.extend_from_slice(&self.payload);

        if self.legacy_name.is_some() || self.name.is_some() {
            let legacy = self.legacy_name.as_ref().or(self.name.as_ref());
            push_string(&mut out, legacy.map(String::as_str).unwrap_or(""));
            push_string(&mut out, self.name.as_deref().unwrap_or(""));
        }
        out
    }
}

fn push_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&ENTRY_MARKER);
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Concatenates the magic and the given blocks
pub(crate) fn container(blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = RTFD_MAGIC.to_vec();
    for block in blocks {
        out.extend_from_slice(block);
    }
    out
}
