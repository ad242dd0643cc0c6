//! Index file verification and parsing.
//!
//! Two incompatible layouts exist in the wild. Neither carries a magic
//! value, so the version is discriminated by hash self-consistency: the V2
//! probe (one 8-byte prefix hashed over the header block) is tried before
//! the more expensive V1 whole-header hash.
//!
//! V1 (`data.iXY`): a 48-byte header whose trailing `u32` is the lookup3
//! digest of the header with that field zeroed, followed by two contiguous
//! entry groups with individual digests.
//!
//! V2 (`XXYYYYYYYY.idx`): a `{block_size, block_hash}` prefix guarding the
//! 16-byte header, a second prefix guarding the entry payload (digest
//! accumulated record by record), and after 4096-byte alignment a tail of
//! 512-byte pages holding per-slot digests.

use crate::error::{CascError, Result};
use crate::types::{ArchiveLocation, IndexEntry, IndexKey};
use crate::utils::ioutils::{subslice, u40_be};
use crate::utils::jenkins::{hashlittle, hashlittle2};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// On-disk size of one index entry: 9-byte key, 5-byte locator, 4-byte span.
pub const INDEX_ENTRY_SIZE: usize = 18;

/// Index files larger than this are rejected outright.
pub const MAX_INDEX_FILE_SIZE: u64 = 0xA0000;

const BLOCK_PREFIX_SIZE: usize = 8;
const V1_HEADER_SIZE: usize = 48;
const V2_HEADER_SIZE: usize = 16;
const V2_INDEX_VERSION: u16 = 0x0007;

const TAIL_MIN_SIZE: usize = 0x7800;
const TAIL_PAGE_SIZE: usize = 0x200;
const TAIL_SLOT_SIZE: usize = 0x18;
const TAIL_SLOT_HASHED: usize = 0x13;
const TAIL_SLOTS_PER_PAGE: usize = 21;

/// On-disk index layout version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    V1,
    V2,
}

/// One parsed per-bucket index file.
///
/// The raw file bytes stay owned here for the storage's lifetime; entries
/// are decoded on demand from the verified payload range.
pub struct KeyMappingTable {
    bucket: u8,
    format: IndexFormat,
    data: Vec<u8>,
    entries_offset: usize,
    entry_count: usize,
    pub span_size_bytes: u8,
    pub span_offs_bytes: u8,
    pub key_bytes: u8,
    pub extra_bytes: u8,
    pub segment_bits: u8,
    pub max_file_offset: u64,
}

impl KeyMappingTable {
    /// Read and parse the index file for `bucket`.
    pub fn load(path: &Path, bucket: u8) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CascError::FileNotFound(path.display().to_string())
            } else {
                CascError::Io(e)
            }
        })?;
        if metadata.len() == 0 || metadata.len() > MAX_INDEX_FILE_SIZE {
            return Err(CascError::BadFormat(format!(
                "index file {} has impossible size {}",
                path.display(),
                metadata.len()
            )));
        }

        let data = fs::read(path)?;
        let table = Self::parse(data, bucket)?;
        debug!(
            "loaded index {} ({:?}): {} entries",
            path.display(),
            table.format,
            table.entry_count
        );
        Ok(table)
    }

    /// Parse an index file image, verifying every recorded digest.
    pub fn parse(data: Vec<u8>, bucket: u8) -> Result<Self> {
        // Cheap 8-byte probe first; the V1 check hashes the whole header.
        if is_index_header_v2(&data) {
            Self::parse_v2(data, bucket)
        } else if is_index_header_v1(&data) {
            Self::parse_v1(data, bucket)
        } else {
            Err(CascError::BadFormat(format!(
                "bucket {bucket:02x}: unrecognized index header"
            )))
        }
    }

    fn parse_v1(data: Vec<u8>, bucket: u8) -> Result<Self> {
        let header = &data[..V1_HEADER_SIZE];

        if LittleEndian::read_u16(&header[0..2]) != 0x0005 {
            return Err(CascError::BadFormat("V1 index field_0 != 0x0005".into()));
        }
        if header[2] != bucket {
            return Err(CascError::BadFormat(format!(
                "V1 index bucket mismatch: header {:02x}, expected {bucket:02x}",
                header[2]
            )));
        }
        // Undocumented, but always populated in valid files.
        if LittleEndian::read_u64(&header[8..16]) == 0 {
            return Err(CascError::BadFormat("V1 index field_8 is zero".into()));
        }

        let span_size_bytes = header[24];
        let span_offs_bytes = header[25];
        let key_bytes = header[26];
        let segment_bits = header[27];
        if span_size_bytes != 4 || span_offs_bytes != 5 || key_bytes != 9 {
            return Err(CascError::NotSupported(format!(
                "V1 index layout {key_bytes}+{span_offs_bytes}+{span_size_bytes}"
            )));
        }
        check_segment_bits(segment_bits)?;
        let max_file_offset = LittleEndian::read_u64(&header[16..24]);

        let key_count1 = LittleEndian::read_u32(&header[28..32]) as usize;
        let key_count2 = LittleEndian::read_u32(&header[32..36]) as usize;
        let keys_hash1 = LittleEndian::read_u32(&header[36..40]);
        let keys_hash2 = LittleEndian::read_u32(&header[40..44]);

        let entry_count = key_count1
            .checked_add(key_count2)
            .ok_or_else(|| CascError::BadFormat("V1 index entry count overflow".into()))?;
        let group1 = subslice(&data, V1_HEADER_SIZE, key_count1 * INDEX_ENTRY_SIZE)
            .ok_or_else(|| CascError::BadFormat("V1 index truncated in first group".into()))?;
        let group2 = subslice(
            &data,
            V1_HEADER_SIZE + key_count1 * INDEX_ENTRY_SIZE,
            key_count2 * INDEX_ENTRY_SIZE,
        )
        .ok_or_else(|| CascError::BadFormat("V1 index truncated in second group".into()))?;

        if hashlittle(group1, 0) != keys_hash1 || hashlittle(group2, 0) != keys_hash2 {
            return Err(CascError::FileCorrupt(format!(
                "bucket {bucket:02x}: V1 entry group digest mismatch"
            )));
        }

        let table = Self {
            bucket,
            format: IndexFormat::V1,
            data,
            entries_offset: V1_HEADER_SIZE,
            entry_count,
            span_size_bytes,
            span_offs_bytes,
            key_bytes,
            extra_bytes: 0,
            segment_bits,
            max_file_offset,
        };
        table.check_locator_bounds()?;
        Ok(table)
    }

    fn parse_v2(data: Vec<u8>, bucket: u8) -> Result<Self> {
        // The probe already validated the first prefix and its digest.
        let header_block_size = LittleEndian::read_u32(&data[0..4]) as usize;
        let header = subslice(&data, BLOCK_PREFIX_SIZE, V2_HEADER_SIZE)
            .ok_or_else(|| CascError::BadFormat("V2 index header truncated".into()))?;

        if LittleEndian::read_u16(&header[0..2]) != V2_INDEX_VERSION {
            return Err(CascError::BadFormat(format!(
                "V2 index version {:#06x}",
                LittleEndian::read_u16(&header[0..2])
            )));
        }
        if header[2] != bucket {
            return Err(CascError::BadFormat(format!(
                "V2 index bucket mismatch: header {:02x}, expected {bucket:02x}",
                header[2]
            )));
        }

        let extra_bytes = header[3];
        let span_size_bytes = header[4];
        let span_offs_bytes = header[5];
        let key_bytes = header[6];
        let segment_bits = header[7];
        if extra_bytes != 0 || span_size_bytes != 4 || span_offs_bytes != 5 || key_bytes != 9 {
            return Err(CascError::NotSupported(format!(
                "V2 index layout {key_bytes}+{span_offs_bytes}+{span_size_bytes}+{extra_bytes}"
            )));
        }
        check_segment_bits(segment_bits)?;
        let max_file_offset = LittleEndian::read_u64(&header[8..16]);

        // Entry payload begins at the next 16-byte boundary with its own
        // size-and-hash prefix.
        let mut position = (BLOCK_PREFIX_SIZE + header_block_size + 0x0F) & !0x0F;
        let prefix = subslice(&data, position, BLOCK_PREFIX_SIZE)
            .ok_or_else(|| CascError::BadFormat("V2 index truncated before entries".into()))?;
        let entries_size = LittleEndian::read_u32(&prefix[0..4]) as usize;
        let entries_hash = LittleEndian::read_u32(&prefix[4..8]);
        position += BLOCK_PREFIX_SIZE;

        if entries_size < INDEX_ENTRY_SIZE {
            return Err(CascError::BadFormat("V2 index entry block too small".into()));
        }
        let entries = subslice(&data, position, entries_size)
            .ok_or_else(|| CascError::BadFormat("V2 index truncated in entries".into()))?;
        let entry_count = entries_size / INDEX_ENTRY_SIZE;

        // The digest is accumulated record by record, so it is sensitive to
        // entry order, not just content.
        let mut hash_high = 0u32;
        let mut hash_low = 0u32;
        for record in entries.chunks_exact(INDEX_ENTRY_SIZE) {
            hashlittle2(record, &mut hash_high, &mut hash_low);
        }
        if hash_high != entries_hash {
            return Err(CascError::FileCorrupt(format!(
                "bucket {bucket:02x}: V2 entry payload digest mismatch"
            )));
        }

        let entries_offset = position;
        position += entries_size;

        // The remainder after 4096-byte alignment is the slot tail.
        position = (position + 0xFFF) & !0xFFF;
        let tail = data
            .get(position..)
            .ok_or_else(|| CascError::BadFormat("V2 index truncated before tail".into()))?;
        if tail.len() < TAIL_MIN_SIZE {
            return Err(CascError::BadFormat(format!(
                "V2 index tail too short: {:#x} bytes",
                tail.len()
            )));
        }
        verify_tail(tail, bucket)?;

        let table = Self {
            bucket,
            format: IndexFormat::V2,
            data,
            entries_offset,
            entry_count,
            span_size_bytes,
            span_offs_bytes,
            key_bytes,
            extra_bytes,
            segment_bits,
            max_file_offset,
        };
        table.check_locator_bounds()?;
        Ok(table)
    }

    /// Every packed locator must stay within the advertised maximum.
    fn check_locator_bounds(&self) -> Result<()> {
        for index in 0..self.entry_count {
            let record = self.record(index);
            let mut locator = [0u8; 5];
            locator.copy_from_slice(&record[9..14]);
            let packed = u40_be(&locator);
            if packed > self.max_file_offset {
                return Err(CascError::FileCorrupt(format!(
                    "bucket {:02x}: entry {index} locator {packed:#x} exceeds limit {:#x}",
                    self.bucket, self.max_file_offset
                )));
            }
        }
        Ok(())
    }

    fn record(&self, index: usize) -> &[u8] {
        let at = self.entries_offset + index * INDEX_ENTRY_SIZE;
        &self.data[at..at + INDEX_ENTRY_SIZE]
    }

    /// Decode the entry at `index`. Panics if out of range.
    pub fn entry(&self, index: usize) -> IndexEntry {
        let record = self.record(index);
        let mut key = [0u8; 9];
        key.copy_from_slice(&record[0..9]);

        let mut locator = [0u8; 5];
        locator.copy_from_slice(&record[9..14]);
        let packed = u40_be(&locator);
        let archive_id = (packed >> self.segment_bits) as u16;
        let offset = packed & ((1u64 << self.segment_bits) - 1);
        let size = BigEndian::read_u32(&record[14..18]);

        IndexEntry {
            key: IndexKey::new(key),
            bucket: self.bucket,
            location: ArchiveLocation {
                archive_id,
                offset,
                size,
            },
        }
    }

    /// Iterate over all decoded entries.
    pub fn entries(&self) -> impl Iterator<Item = IndexEntry> + '_ {
        (0..self.entry_count).map(|index| self.entry(index))
    }

    pub fn bucket(&self) -> u8 {
        self.bucket
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }
}

fn check_segment_bits(segment_bits: u8) -> Result<()> {
    if (1..=39).contains(&segment_bits) {
        Ok(())
    } else {
        Err(CascError::NotSupported(format!(
            "index segment bits {segment_bits}"
        )))
    }
}

/// V2 probe: `{block_size, block_hash}` prefix whose digest over the
/// following `block_size` bytes matches.
fn is_index_header_v2(data: &[u8]) -> bool {
    if data.len() < BLOCK_PREFIX_SIZE {
        return false;
    }
    let block_size = LittleEndian::read_u32(&data[0..4]) as usize;
    let block_hash = LittleEndian::read_u32(&data[4..8]);
    if block_size < V2_HEADER_SIZE || data.len() < BLOCK_PREFIX_SIZE + block_size {
        return false;
    }

    let mut hash_high = 0u32;
    let mut hash_low = 0u32;
    hashlittle2(
        &data[BLOCK_PREFIX_SIZE..BLOCK_PREFIX_SIZE + block_size],
        &mut hash_high,
        &mut hash_low,
    );
    hash_high == block_hash
}

/// V1 probe: the header digests to its own trailing hash field (computed
/// with that field zeroed).
fn is_index_header_v1(data: &[u8]) -> bool {
    if data.len() < V1_HEADER_SIZE {
        return false;
    }
    let mut header = [0u8; V1_HEADER_SIZE];
    header.copy_from_slice(&data[..V1_HEADER_SIZE]);
    let saved = LittleEndian::read_u32(&header[44..48]);
    header[44..48].fill(0);
    hashlittle(&header, 0) == saved
}

/// Walk the V2 tail: 512-byte pages of 21 24-byte slots, each slot leading
/// with the digest of its own first 19 bytes (high bit forced).
///
/// A zero-lead slot ends the scan successfully even if later pages hold
/// data; existing storages rely on that behavior.
fn verify_tail(tail: &[u8], bucket: u8) -> Result<()> {
    let whole_pages = (tail.len() / TAIL_PAGE_SIZE) * TAIL_PAGE_SIZE;
    for page in tail[..whole_pages].chunks_exact(TAIL_PAGE_SIZE) {
        for slot in 0..TAIL_SLOTS_PER_PAGE {
            let at = slot * TAIL_SLOT_SIZE;
            let lead = LittleEndian::read_u32(&page[at..at + 4]);
            if lead == 0 {
                return Ok(());
            }
            let digest = hashlittle(&page[at..at + TAIL_SLOT_HASHED], 0) | 0x8000_0000;
            if digest != lead {
                trace!("tail slot digest {digest:#010x} != {lead:#010x}");
                return Err(CascError::FileCorrupt(format!(
                    "bucket {bucket:02x}: V2 tail slot digest mismatch"
                )));
            }
        }
    }
    Ok(())
}
