//! Common key and location types used throughout the storage reader.

use std::fmt;

/// Number of index buckets in a CASC storage.
pub const BUCKET_COUNT: usize = 16;

/// Content key - MD5 of a file's plaintext bytes. This is the identifier
/// root handlers speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey([u8; 16]);

impl ContentKey {
    pub fn new(data: [u8; 16]) -> Self {
        Self(data)
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let mut key = [0u8; 16];
        if data.len() == 16 {
            key.copy_from_slice(data);
            Some(Self(key))
        } else {
            None
        }
    }

    pub fn from_hex(text: &str) -> Option<Self> {
        hex::decode(text).ok().and_then(|b| Self::from_slice(&b))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Encoding key - MD5 of a file's encoded (compressed/encrypted) bytes as
/// stored in a data archive. One content key maps to one or more of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EKey([u8; 16]);

impl EKey {
    pub fn new(data: [u8; 16]) -> Self {
        Self(data)
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let mut key = [0u8; 16];
        if data.len() == 16 {
            key.copy_from_slice(data);
            Some(Self(key))
        } else {
            None
        }
    }

    pub fn from_hex(text: &str) -> Option<Self> {
        hex::decode(text).ok().and_then(|b| Self::from_slice(&b))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The 9-byte truncation recorded in on-disk indices.
    pub fn index_key(&self) -> IndexKey {
        let mut truncated = [0u8; 9];
        truncated.copy_from_slice(&self.0[0..9]);
        IndexKey::new(truncated)
    }

    /// Index bucket this key belongs to: the high nibble of the lead byte.
    pub fn bucket_index(&self) -> u8 {
        self.0[0] >> 4
    }
}

impl fmt::Display for EKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Truncated encoding key: the first 9 bytes of an [`EKey`], as stored in
/// index entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexKey([u8; 9]);

impl IndexKey {
    pub fn new(data: [u8; 9]) -> Self {
        Self(data)
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let mut key = [0u8; 9];
        if data.len() == 9 {
            key.copy_from_slice(data);
            Some(Self(key))
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8; 9] {
        &self.0
    }

    pub fn bucket_index(&self) -> u8 {
        self.0[0] >> 4
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Location of an encoded blob within a data archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLocation {
    /// Archive file number (data.XXX)
    pub archive_id: u16,
    /// Offset within the archive file
    pub offset: u64,
    /// Encoded span length
    pub size: u32,
}

/// A parsed index record: where one encoded blob lives.
#[derive(Debug, Clone, Copy)]
pub struct IndexEntry {
    /// Truncated encoding key
    pub key: IndexKey,
    /// Bucket of the index file that contributed this entry
    pub bucket: u8,
    /// Location in the archive set
    pub location: ArchiveLocation,
}

/// Game identifier derived from the root file variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GameId {
    HeroesOfTheStorm = 1,
    Diablo3 = 2,
    WorldOfWarcraft = 3,
}

/// Locale bitmask values accepted by `open` and recorded in root files.
pub mod locale {
    pub const NONE: u32 = 0;
    pub const ALL: u32 = 0xFFFF_FFFF;

    pub const EN_US: u32 = 0x0000_0002;
    pub const KO_KR: u32 = 0x0000_0004;
    pub const FR_FR: u32 = 0x0000_0010;
    pub const DE_DE: u32 = 0x0000_0020;
    pub const ZH_CN: u32 = 0x0000_0040;
    pub const ES_ES: u32 = 0x0000_0080;
    pub const ZH_TW: u32 = 0x0000_0100;
    pub const EN_GB: u32 = 0x0000_0200;
    pub const ES_MX: u32 = 0x0000_1000;
    pub const RU_RU: u32 = 0x0000_2000;
    pub const PT_BR: u32 = 0x0000_4000;
    pub const IT_IT: u32 = 0x0000_8000;
    pub const PT_PT: u32 = 0x0001_0000;

    /// Assigned when the caller passes a zero mask.
    pub const DEFAULT: u32 = EN_US | EN_GB;
}
