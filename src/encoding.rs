//! Encoding file parsing: content key to encoding key resolution.
//!
//! The encoding file is itself an encoded blob inside the storage, opened
//! by the encoding key the build configuration names. Its payload is a run
//! of 4096-byte segments holding variable-length entries ordered by content
//! key, preceded by a directory of per-segment first keys and checksums.
//!
//! All multi-byte header fields are big-endian, unlike the index files.

use crate::error::{CascError, Result};
use crate::types::{ContentKey, EKey};
use crate::utils::ioutils::{array_at, u40_be};
use byteorder::{BigEndian, ByteOrder};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Magic bytes at the start of the encoding file: "EN".
const ENCODING_MAGIC: [u8; 2] = [0x45, 0x4E];

/// Fixed header size.
pub const ENCODING_HEADER_SIZE: usize = 0x16;

/// Size of one payload segment.
pub const ENCODING_SEGMENT_SIZE: usize = 0x1000;

/// Directory record: first key (16) + segment MD5 (16).
const SEGMENT_RECORD_SIZE: usize = 0x20;

/// Fixed part of an entry: key count (1) + file size (5) + content key (16).
const ENTRY_FIXED_SIZE: usize = 22;

/// Parsed encoding file header.
#[derive(Debug, Clone, Copy)]
pub struct EncodingHeader {
    pub num_segments: u32,
    pub segments_pos: u32,
}

impl EncodingHeader {
    /// Parse the 0x16-byte header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ENCODING_HEADER_SIZE {
            return Err(CascError::BadFormat("encoding header truncated".into()));
        }
        if data[0..2] != ENCODING_MAGIC {
            return Err(CascError::BadFormat("encoding magic mismatch".into()));
        }

        let num_segments = BigEndian::read_u32(&data[9..13]);
        let segments_pos = BigEndian::read_u32(&data[18..22]);
        if num_segments == 0 || segments_pos == 0 {
            return Err(CascError::BadFormat(
                "encoding header with empty segment table".into(),
            ));
        }

        Ok(Self {
            num_segments,
            segments_pos,
        })
    }

    /// Number of bytes the segment directory and payload occupy, counted
    /// from the start of the file. Data past this point (the encoding-key
    /// pages) is not needed for resolution and is ignored.
    pub fn total_size(&self) -> u64 {
        ENCODING_HEADER_SIZE as u64
            + u64::from(self.segments_pos)
            + u64::from(self.num_segments) * (SEGMENT_RECORD_SIZE + ENCODING_SEGMENT_SIZE) as u64
    }
}

/// One resolution record: a content key and its encodings.
#[derive(Debug, Clone)]
pub struct EncodingEntry {
    pub content_key: ContentKey,
    /// Plaintext file size
    pub size: u64,
    /// All known encodings; the first is authoritative.
    pub ekeys: Vec<EKey>,
}

impl EncodingEntry {
    /// The encoding actually stored in local archives.
    pub fn primary_ekey(&self) -> &EKey {
        &self.ekeys[0]
    }
}

/// Parsed encoding file with its content-key map.
pub struct EncodingFile {
    header: EncodingHeader,
    entries: HashMap<ContentKey, EncodingEntry>,
}

impl EncodingFile {
    /// Parse a decoded encoding file image.
    ///
    /// Per-segment MD5 verification dominates bootstrap time on real
    /// storages and is off unless `verify_segment_checksums` is set; the
    /// first-key consistency check always runs.
    pub fn parse(data: &[u8], verify_segment_checksums: bool) -> Result<Self> {
        let header = EncodingHeader::parse(data)?;
        if (data.len() as u64) < header.total_size() {
            return Err(CascError::FileCorrupt(format!(
                "encoding file short: {} bytes of {}",
                data.len(),
                header.total_size()
            )));
        }

        let directory_offset = ENCODING_HEADER_SIZE + header.segments_pos as usize;
        let num_segments = header.num_segments as usize;
        let payload_offset = directory_offset + num_segments * SEGMENT_RECORD_SIZE;

        let mut entries = HashMap::new();
        for segment_index in 0..num_segments {
            let record_at = directory_offset + segment_index * SEGMENT_RECORD_SIZE;
            let first_key: [u8; 16] = array_at(data, record_at)
                .ok_or_else(|| CascError::FileCorrupt("encoding directory truncated".into()))?;
            let segment_hash: [u8; 16] = array_at(data, record_at + 16)
                .ok_or_else(|| CascError::FileCorrupt("encoding directory truncated".into()))?;

            let segment_at = payload_offset + segment_index * ENCODING_SEGMENT_SIZE;
            let segment = data
                .get(segment_at..segment_at + ENCODING_SEGMENT_SIZE)
                .ok_or_else(|| CascError::FileCorrupt("encoding segment truncated".into()))?;

            if verify_segment_checksums {
                let digest = md5::compute(segment).0;
                if digest != segment_hash {
                    return Err(CascError::ChecksumMismatch {
                        expected: hex::encode(segment_hash),
                        actual: hex::encode(digest),
                    });
                }
            }

            // The directory names the first content key of each segment;
            // a mismatch means the directory and payload disagree.
            if segment[6..22] != first_key {
                return Err(CascError::FileCorrupt(format!(
                    "encoding segment {segment_index} first key mismatch"
                )));
            }

            parse_segment(segment, segment_index, &mut entries)?;
        }

        debug!(
            "encoding file: {} entries in {} segments",
            entries.len(),
            num_segments
        );
        Ok(Self { header, entries })
    }

    pub fn header(&self) -> &EncodingHeader {
        &self.header
    }

    /// Resolve a content key to its encodings.
    pub fn lookup(&self, content_key: &ContentKey) -> Option<&EncodingEntry> {
        self.entries.get(content_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &EncodingEntry> {
        self.entries.values()
    }
}

/// Walk one segment's entries until the terminator or the point where no
/// further entry can fit.
fn parse_segment(
    segment: &[u8],
    segment_index: usize,
    entries: &mut HashMap<ContentKey, EncodingEntry>,
) -> Result<()> {
    let mut at = 0usize;
    while at <= ENCODING_SEGMENT_SIZE - ENTRY_FIXED_SIZE - 16 {
        let key_count = segment[at] as usize;
        if key_count == 0 {
            break;
        }

        let mut size_bytes = [0u8; 5];
        size_bytes.copy_from_slice(&segment[at + 1..at + 6]);
        let size = u40_be(&size_bytes);

        let content_key = ContentKey::from_slice(&segment[at + 6..at + 22])
            .ok_or_else(|| CascError::FileCorrupt("encoding entry key truncated".into()))?;

        let keys_end = at + ENTRY_FIXED_SIZE + key_count * 16;
        if keys_end > ENCODING_SEGMENT_SIZE {
            return Err(CascError::FileCorrupt(format!(
                "encoding segment {segment_index}: entry overruns segment"
            )));
        }
        let ekeys: Vec<EKey> = segment[at + ENTRY_FIXED_SIZE..keys_end]
            .chunks_exact(16)
            .filter_map(EKey::from_slice)
            .collect();

        trace!("encoding entry {content_key}: {} keys", ekeys.len());
        if entries.contains_key(&content_key) {
            warn!("duplicate encoding entry for {content_key}, keeping first");
        } else {
            entries.insert(
                content_key,
                EncodingEntry {
                    content_key,
                    size,
                    ekeys,
                },
            );
        }

        at = keys_end;
    }
    Ok(())
}
