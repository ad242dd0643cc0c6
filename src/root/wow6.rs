//! WoW6-style root: locale-tagged blocks of (content key, name hash)
//! records.
//!
//! The file is a plain run of blocks with no outer header. Each block
//! carries a record count, content flags, a locale mask, the file-id deltas,
//! and then the records themselves. Blocks whose locale does not intersect
//! the requested mask are skipped without decoding. A truncated trailing
//! block ends the scan; the entries decoded up to that point stand.

use crate::error::Result;
use crate::types::{ContentKey, locale};
use crate::utils::jenkins::hash_path;
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Seek, SeekFrom};
use tracing::{debug, trace};

/// Size of one record: content key (16) + name hash (8).
const RECORD_SIZE: usize = 24;
/// Block header: record count, content flags, locale mask.
const BLOCK_HEADER_SIZE: usize = 12;

/// Parsed WoW6 root with its name-hash map.
pub struct WowRoot {
    entries: HashMap<u64, ContentKey>,
    locale_mask: u32,
    total_records: usize,
}

impl WowRoot {
    /// Parse the root image, keeping records whose locale intersects
    /// `locale_mask`.
    pub fn parse(data: &[u8], locale_mask: u32) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut entries = HashMap::new();
        let mut total_records = 0usize;

        while (cursor.position() as usize) < data.len() {
            let remaining = data.len() - cursor.position() as usize;
            if remaining < BLOCK_HEADER_SIZE {
                trace!("{remaining} dangling bytes after last root block");
                break;
            }

            let num_records = cursor.read_u32::<LittleEndian>()? as usize;
            let content_flags = cursor.read_u32::<LittleEndian>()?;
            let block_locale = cursor.read_u32::<LittleEndian>()?;

            let Some(block_bytes) = num_records.checked_mul(4 + RECORD_SIZE) else {
                break;
            };
            if data.len() - (cursor.position() as usize) < block_bytes {
                trace!("truncated trailing root block, {num_records} records announced");
                break;
            }

            if block_locale & locale_mask == 0 && block_locale != locale::ALL {
                trace!(
                    "skipping root block: locale {block_locale:#010x}, flags {content_flags:#010x}"
                );
                cursor.seek(SeekFrom::Current(block_bytes as i64))?;
                continue;
            }

            // File-id deltas are not needed for name resolution.
            cursor.seek(SeekFrom::Current((num_records * 4) as i64))?;

            for _ in 0..num_records {
                let mut key = [0u8; 16];
                std::io::Read::read_exact(&mut cursor, &mut key)?;
                let name_hash = cursor.read_u64::<LittleEndian>()?;

                // The first record for a name wins; later locale blocks
                // repeat names for their own variants.
                entries.entry(name_hash).or_insert(ContentKey::new(key));
                total_records += 1;
            }
        }

        debug!(
            "WoW6 root: {} names from {total_records} records (locale {locale_mask:#010x})",
            entries.len()
        );
        Ok(Self {
            entries,
            locale_mask,
            total_records,
        })
    }

    /// Resolve a file name to its content key.
    pub fn lookup(&self, name: &str) -> Option<&ContentKey> {
        self.entries.get(&hash_path(name))
    }

    /// Resolve an already-computed name hash.
    pub fn lookup_hash(&self, name_hash: u64) -> Option<&ContentKey> {
        self.entries.get(&name_hash)
    }

    pub fn locale_mask(&self) -> u32 {
        self.locale_mask
    }

    pub fn name_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_records(&self) -> usize {
        self.total_records
    }

    pub fn entries(&self) -> impl Iterator<Item = (u64, &ContentKey)> {
        self.entries.iter().map(|(hash, key)| (*hash, key))
    }
}
