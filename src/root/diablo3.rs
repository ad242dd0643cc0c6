//! Diablo III root handler.
//!
//! The directory tree is not decoded here; the handler validates the
//! signature, keeps the buffer, and reports its capabilities.

use crate::error::{CascError, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Signature dword of Diablo III root files.
pub const DIABLO3_SIGNATURE: u32 = 0x8007_D0C4;

pub struct Diablo3Root {
    data: Vec<u8>,
}

impl Diablo3Root {
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 || LittleEndian::read_u32(&data[0..4]) != DIABLO3_SIGNATURE {
            return Err(CascError::BadFormat("Diablo3 root header truncated".into()));
        }
        Ok(Self { data })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_checked() {
        let mut bytes = DIABLO3_SIGNATURE.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"directory tree payload");

        let root = Diablo3Root::parse(bytes.clone()).unwrap();
        assert_eq!(root.data(), bytes.as_slice());
        assert!(Diablo3Root::parse(vec![0, 1, 2, 3]).is_err());
    }
}
