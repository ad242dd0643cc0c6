//! Fixture builders: synthesize a complete on-disk storage (indices,
//! archive, encoding file, root file, build config) in a temp directory.
#![allow(dead_code)]

use casc_reader::types::{ContentKey, EKey, locale};
use casc_reader::utils::jenkins::{hash_path, hashlittle, hashlittle2};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const SEGMENT_BITS: u8 = 30;
const DATA_ENTRY_HEADER_SIZE: usize = 30;
const INDEX_ENTRY_SIZE: usize = 18;

/// Wrap plaintext in a headerless single-chunk plain frame.
pub fn blte_single(plain: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(plain.len() + 9);
    frame.extend_from_slice(b"BLTE");
    frame.extend_from_slice(&0u32.to_be_bytes());
    frame.push(b'N');
    frame.extend_from_slice(plain);
    frame
}

/// The 30-byte per-blob header archives carry before each frame.
fn data_entry_header(ekey: &EKey, frame_len: usize) -> Vec<u8> {
    let mut header = Vec::with_capacity(DATA_ENTRY_HEADER_SIZE);
    header.extend_from_slice(ekey.as_bytes());
    header.extend_from_slice(&((DATA_ENTRY_HEADER_SIZE + frame_len) as u32).to_le_bytes());
    header.extend_from_slice(&[0u8; 10]);
    header
}

pub fn encode_index_entry(ekey: &EKey, archive_id: u16, offset: u64, span: u32) -> [u8; 18] {
    let packed = (u64::from(archive_id) << SEGMENT_BITS) | offset;
    let mut record = [0u8; 18];
    record[0..9].copy_from_slice(&ekey.as_bytes()[0..9]);
    record[9] = (packed >> 32) as u8;
    record[10..14].copy_from_slice(&(packed as u32).to_be_bytes());
    record[14..18].copy_from_slice(&span.to_be_bytes());
    record
}

/// Serialize a V2 index file with valid digests for `bucket`.
pub fn build_v2_index(bucket: u8, entries: &[[u8; 18]]) -> Vec<u8> {
    let mut header = [0u8; 16];
    header[0..2].copy_from_slice(&0x0007u16.to_le_bytes());
    header[2] = bucket;
    header[4] = 4;
    header[5] = 5;
    header[6] = 9;
    header[7] = SEGMENT_BITS;
    header[8..16].copy_from_slice(&(1u64 << 38).to_le_bytes());

    let mut file = Vec::new();
    file.extend_from_slice(&16u32.to_le_bytes());
    let mut hash_high = 0u32;
    let mut hash_low = 0u32;
    hashlittle2(&header, &mut hash_high, &mut hash_low);
    file.extend_from_slice(&hash_high.to_le_bytes());
    file.extend_from_slice(&header);
    file.resize(32, 0);

    let mut hash_high = 0u32;
    let mut hash_low = 0u32;
    for record in entries {
        hashlittle2(record, &mut hash_high, &mut hash_low);
    }
    file.extend_from_slice(&((entries.len() * INDEX_ENTRY_SIZE) as u32).to_le_bytes());
    file.extend_from_slice(&hash_high.to_le_bytes());
    for record in entries {
        file.extend_from_slice(record);
    }

    file.resize(file.len().next_multiple_of(0x1000), 0);
    file.resize(file.len() + 0x7800, 0);
    file
}

/// Byte offset of the entry-block digest inside a built V2 index file.
pub const V2_ENTRIES_DIGEST_OFFSET: usize = 36;

/// Serialize a V1 index file (48-byte self-hashed header, one entry group).
pub fn build_v1_index(bucket: u8, entries: &[[u8; 18]]) -> Vec<u8> {
    let mut header = [0u8; 48];
    header[0..2].copy_from_slice(&0x0005u16.to_le_bytes());
    header[2] = bucket;
    header[8..16].copy_from_slice(&1u64.to_le_bytes());
    header[16..24].copy_from_slice(&(1u64 << 38).to_le_bytes());
    header[24] = 4;
    header[25] = 5;
    header[26] = 9;
    header[27] = SEGMENT_BITS;
    header[28..32].copy_from_slice(&(entries.len() as u32).to_le_bytes());

    let payload = entries.concat();
    header[36..40].copy_from_slice(&hashlittle(&payload, 0).to_le_bytes());
    header[40..44].copy_from_slice(&hashlittle(&[], 0).to_le_bytes());
    let digest = hashlittle(&header, 0);
    header[44..48].copy_from_slice(&digest.to_le_bytes());

    let mut file = header.to_vec();
    file.extend_from_slice(&payload);
    file
}

/// Serialize an encoding file image (header, directory, one segment run)
/// from unsorted (content key, size, encoding key) triples.
pub fn build_encoding_image(entries: &[(ContentKey, u64, EKey)]) -> Vec<u8> {
    let mut entries: Vec<_> = entries.to_vec();
    entries.sort_by_key(|(ckey, _, _)| *ckey);

    let mut payload = Vec::new();
    for (ckey, size, ekey) in &entries {
        payload.push(1u8);
        payload.push((size >> 32) as u8);
        payload.extend_from_slice(&(*size as u32).to_be_bytes());
        payload.extend_from_slice(ckey.as_bytes());
        payload.extend_from_slice(ekey.as_bytes());
    }
    payload.resize(0x1000, 0);

    let segments_pos = 4u32;
    let mut image = vec![0u8; 0x16];
    image[0..2].copy_from_slice(b"EN");
    image[9..13].copy_from_slice(&1u32.to_be_bytes());
    image[18..22].copy_from_slice(&segments_pos.to_be_bytes());
    image.resize(image.len() + segments_pos as usize, 0);

    image.extend_from_slice(entries[0].0.as_bytes());
    image.extend_from_slice(&md5::compute(&payload).0);
    image.extend_from_slice(&payload);
    image
}

/// Byte offset of the first directory key inside a built encoding image.
pub const ENCODING_FIRST_KEY_OFFSET: usize = 0x16 + 4;

/// Serialize a WoW6-style root with one all-locale block.
pub fn build_wow6_root(entries: &[(&str, ContentKey)]) -> Vec<u8> {
    let mut image = Vec::new();
    image.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes());
    image.extend_from_slice(&locale::ALL.to_le_bytes());
    for _ in entries {
        image.extend_from_slice(&0u32.to_le_bytes());
    }
    for (name, ckey) in entries {
        image.extend_from_slice(ckey.as_bytes());
        image.extend_from_slice(&hash_path(name).to_le_bytes());
    }
    image
}

pub fn build_mndx_root() -> Vec<u8> {
    let mut image = Vec::new();
    image.extend_from_slice(b"MNDX");
    image.extend_from_slice(&2u32.to_le_bytes());
    image.extend_from_slice(&1u32.to_le_bytes());
    image.extend_from_slice(&[0u8; 16]);
    image
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Wow6,
    Mndx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    V1,
    V2,
}

#[derive(Debug, Clone, Copy)]
pub struct FixtureOptions {
    pub root_kind: RootKind,
    pub index_kind: IndexKind,
    /// Flip a byte of this bucket's entry-block digest (V2 fixtures).
    pub corrupt_index_bucket: Option<u8>,
    /// Flip a byte of the encoding directory's first key.
    pub corrupt_encoding_first_key: bool,
    /// Repeat one index key in a second bucket.
    pub duplicate_index_key: bool,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            root_kind: RootKind::Wow6,
            index_kind: IndexKind::V2,
            corrupt_index_bucket: None,
            corrupt_encoding_first_key: false,
            duplicate_index_key: false,
        }
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub data_path: PathBuf,
    /// Index entries written across all buckets, duplicates included.
    pub total_entries: usize,
    pub foo_plain: Vec<u8>,
    pub foo_ckey: ContentKey,
    pub foo_ekey: EKey,
}

/// Build a complete storage: one archive, sixteen V2 indices, an encoding
/// file with entries for the root and one content file, a root file, and a
/// build config naming them.
pub fn build_fixture(options: FixtureOptions) -> Fixture {
    let dir = TempDir::new().unwrap();
    let data_path = dir.path().join("game").join("Data");
    let data_dir = data_path.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let foo_plain = b"hello casc storage".to_vec();
    let foo_ckey = ContentKey::new(md5::compute(&foo_plain).0);
    let foo_frame = blte_single(&foo_plain);
    let foo_ekey = EKey::new(md5::compute(&foo_frame).0);

    let root_plain = match options.root_kind {
        RootKind::Wow6 => build_wow6_root(&[("Foo.txt", foo_ckey)]),
        RootKind::Mndx => build_mndx_root(),
    };
    let root_ckey = ContentKey::new(md5::compute(&root_plain).0);
    let root_frame = blte_single(&root_plain);
    let root_ekey = EKey::new(md5::compute(&root_frame).0);

    let mut encoding_plain = build_encoding_image(&[
        (foo_ckey, foo_plain.len() as u64, foo_ekey),
        (root_ckey, root_plain.len() as u64, root_ekey),
    ]);
    if options.corrupt_encoding_first_key {
        encoding_plain[ENCODING_FIRST_KEY_OFFSET + 3] ^= 0xFF;
    }
    let encoding_ckey = ContentKey::new(md5::compute(&encoding_plain).0);
    let encoding_frame = blte_single(&encoding_plain);
    let encoding_ekey = EKey::new(md5::compute(&encoding_frame).0);

    // Concatenate the three blobs into data.000.
    let mut archive = Vec::new();
    let mut spans = Vec::new();
    for (ekey, frame) in [
        (encoding_ekey, &encoding_frame),
        (root_ekey, &root_frame),
        (foo_ekey, &foo_frame),
    ] {
        let offset = archive.len() as u64;
        archive.extend_from_slice(&data_entry_header(&ekey, frame.len()));
        archive.extend_from_slice(frame);
        spans.push((ekey, offset, (DATA_ENTRY_HEADER_SIZE + frame.len()) as u32));
    }
    fs::write(data_dir.join("data.000"), &archive).unwrap();

    // Distribute entries into their buckets; give every other bucket one
    // filler entry so no index file ends up empty.
    let mut buckets: Vec<Vec<[u8; 18]>> = vec![Vec::new(); 16];
    for (ekey, offset, span) in &spans {
        buckets[ekey.bucket_index() as usize]
            .push(encode_index_entry(ekey, 0, *offset, *span));
    }
    for (bucket, entries) in buckets.iter_mut().enumerate() {
        if entries.is_empty() {
            let mut filler = [bucket as u8; 16];
            filler[0] = (bucket as u8) << 4;
            entries.push(encode_index_entry(
                &EKey::new(filler),
                0,
                0,
                DATA_ENTRY_HEADER_SIZE as u32,
            ));
        }
    }
    if options.duplicate_index_key {
        // Repeat one of bucket 3's keys inside bucket 7; the bucket 3 copy
        // is seen first and wins in the unified map.
        let record = buckets[3][0];
        buckets[7].push(record);
    }
    let total_entries = buckets.iter().map(Vec::len).sum();

    for (bucket, entries) in buckets.iter().enumerate() {
        let bucket = bucket as u8;
        let (name, mut image) = match options.index_kind {
            IndexKind::V2 => (
                format!("{bucket:02x}00000001.idx"),
                build_v2_index(bucket, entries),
            ),
            IndexKind::V1 => (format!("data.i{bucket:x}1"), build_v1_index(bucket, entries)),
        };
        if options.corrupt_index_bucket == Some(bucket) {
            image[V2_ENTRIES_DIGEST_OFFSET] ^= 0xFF;
        }
        fs::write(data_dir.join(name), &image).unwrap();
    }

    let config_text = format!(
        "# Build Configuration\n\n\
         root = {root_ckey}\n\
         encoding = {encoding_ckey} {encoding_ekey}\n\
         build-name = WOW-18179patch6.0.1\n"
    );
    let config_dir = data_path.join("config").join("00").join("11");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join(encoding_ckey.to_string()), config_text).unwrap();

    Fixture {
        dir,
        data_path,
        total_entries,
        foo_plain,
        foo_ckey,
        foo_ekey,
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
