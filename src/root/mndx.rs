//! MNDX root handler (Heroes of the Storm).
//!
//! The MNDX name trie is not decoded here; the handler validates the
//! signature, keeps the buffer for a future trie implementation, and
//! reports its capabilities so storage info queries work.

use crate::error::{CascError, Result};
use byteorder::{ByteOrder, LittleEndian};

/// "MNDX" as a little-endian dword.
pub const MNDX_SIGNATURE: u32 = 0x5844_4E4D;

pub struct MndxRoot {
    data: Vec<u8>,
    header_version: u32,
    format_version: u32,
}

impl MndxRoot {
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < 12 || LittleEndian::read_u32(&data[0..4]) != MNDX_SIGNATURE {
            return Err(CascError::BadFormat("MNDX root header truncated".into()));
        }
        let header_version = LittleEndian::read_u32(&data[4..8]);
        let format_version = LittleEndian::read_u32(&data[8..12]);

        Ok(Self {
            data,
            header_version,
            format_version,
        })
    }

    pub fn header_version(&self) -> u32 {
        self.header_version
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_and_versions() {
        let mut data = Vec::new();
        data.extend_from_slice(b"MNDX");
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());

        let root = MndxRoot::parse(data.clone()).unwrap();
        assert_eq!(root.header_version(), 2);
        assert_eq!(root.format_version(), 1);
        // The buffer is retained as-is for the trie decoder.
        assert_eq!(root.data(), data.as_slice());
    }

    #[test]
    fn short_buffer_rejected() {
        assert!(MndxRoot::parse(b"MNDX".to_vec()).is_err());
    }
}
