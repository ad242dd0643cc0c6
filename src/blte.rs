//! Minimal BLTE block-frame decoder.
//!
//! Every blob in a data archive is wrapped in a BLTE frame: a magic, an
//! optional chunk table, and a run of chunks each carrying a one-byte mode.
//! Local storage only needs the plain ('N') and zlib ('Z') modes; anything
//! else is reported as unsupported rather than silently skipped.

use crate::error::{CascError, Result};
use byteorder::{BigEndian, ByteOrder};
use flate2::read::ZlibDecoder;
use std::io::Read;
use tracing::trace;

const BLTE_MAGIC: [u8; 4] = *b"BLTE";
const CHUNK_TABLE_FORMAT: u8 = 0x0F;
const CHUNK_INFO_SIZE: usize = 24;

struct ChunkInfo {
    compressed_size: u32,
    decompressed_size: u32,
    checksum: [u8; 16],
}

/// Decode a complete BLTE frame into plaintext bytes.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 8 || data[0..4] != BLTE_MAGIC {
        return Err(CascError::BadFormat("not a BLTE frame".into()));
    }
    let header_size = BigEndian::read_u32(&data[4..8]) as usize;

    // A zero header size means the rest of the frame is one headerless
    // chunk.
    if header_size == 0 {
        return decode_chunk(&data[8..], None);
    }

    if header_size < 8 + 4 + CHUNK_INFO_SIZE || header_size > data.len() {
        return Err(CascError::BadFormat(format!(
            "BLTE header size {header_size:#x} out of range"
        )));
    }
    let table_format = data[8];
    if table_format != CHUNK_TABLE_FORMAT {
        return Err(CascError::NotSupported(format!(
            "BLTE chunk table format {table_format:#04x}"
        )));
    }
    let chunk_count =
        (u32::from(data[9]) << 16 | u32::from(data[10]) << 8 | u32::from(data[11])) as usize;
    if header_size != 8 + 4 + chunk_count * CHUNK_INFO_SIZE {
        return Err(CascError::BadFormat(format!(
            "BLTE header size {header_size:#x} does not fit {chunk_count} chunks"
        )));
    }

    let mut chunks = Vec::with_capacity(chunk_count);
    for index in 0..chunk_count {
        let at = 12 + index * CHUNK_INFO_SIZE;
        let mut checksum = [0u8; 16];
        checksum.copy_from_slice(&data[at + 8..at + 24]);
        chunks.push(ChunkInfo {
            compressed_size: BigEndian::read_u32(&data[at..at + 4]),
            decompressed_size: BigEndian::read_u32(&data[at + 4..at + 8]),
            checksum,
        });
    }

    let mut out = Vec::new();
    let mut offset = header_size;
    for (index, chunk) in chunks.iter().enumerate() {
        let end = offset + chunk.compressed_size as usize;
        let chunk_data = data.get(offset..end).ok_or_else(|| {
            CascError::FileCorrupt(format!("BLTE chunk {index} truncated"))
        })?;

        // An all-zero checksum means "not recorded".
        if chunk.checksum != [0u8; 16] {
            let digest = md5::compute(chunk_data).0;
            if digest != chunk.checksum {
                return Err(CascError::ChecksumMismatch {
                    expected: hex::encode(chunk.checksum),
                    actual: hex::encode(digest),
                });
            }
        }

        let decoded = decode_chunk(chunk_data, Some(chunk.decompressed_size as usize))?;
        out.extend_from_slice(&decoded);
        offset = end;
    }
    Ok(out)
}

fn decode_chunk(data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
    let Some((&mode, payload)) = data.split_first() else {
        return Err(CascError::BadFormat("empty BLTE chunk".into()));
    };

    let decoded = match mode {
        b'N' => payload.to_vec(),
        b'Z' => {
            trace!("zlib chunk: {} bytes", payload.len());
            let mut decoder = ZlibDecoder::new(payload);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| CascError::Decompression(format!("zlib: {e}")))?;
            out
        }
        other => {
            return Err(CascError::NotSupported(format!(
                "BLTE chunk mode {:?}",
                char::from(other)
            )));
        }
    };

    if let Some(expected) = expected_size {
        if decoded.len() != expected {
            return Err(CascError::Decompression(format!(
                "chunk decoded to {} bytes, expected {expected}",
                decoded.len()
            )));
        }
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn single_frame(plain: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&BLTE_MAGIC);
        frame.extend_from_slice(&0u32.to_be_bytes());
        frame.push(b'N');
        frame.extend_from_slice(plain);
        frame
    }

    fn chunked_frame(chunks: &[Vec<u8>]) -> Vec<u8> {
        // Each input is already a mode-prefixed chunk body.
        let header_size = 12 + chunks.len() * CHUNK_INFO_SIZE;
        let mut frame = Vec::new();
        frame.extend_from_slice(&BLTE_MAGIC);
        frame.extend_from_slice(&(header_size as u32).to_be_bytes());
        frame.push(CHUNK_TABLE_FORMAT);
        frame.extend_from_slice(&(chunks.len() as u32).to_be_bytes()[1..4]);
        for chunk in chunks {
            let decompressed = decode_chunk(chunk, None).unwrap().len();
            frame.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
            frame.extend_from_slice(&(decompressed as u32).to_be_bytes());
            frame.extend_from_slice(&md5::compute(chunk).0);
        }
        for chunk in chunks {
            frame.extend_from_slice(chunk);
        }
        frame
    }

    fn zlib_chunk(plain: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(vec![b'Z'], Compression::default());
        encoder.write_all(plain).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn single_headerless_chunk() {
        assert_eq!(decompress(&single_frame(b"hello")).unwrap(), b"hello");
    }

    #[test]
    fn chunk_table_with_mixed_modes() {
        let mut plain_chunk = vec![b'N'];
        plain_chunk.extend_from_slice(b"plain ");
        let frame = chunked_frame(&[plain_chunk, zlib_chunk(b"compressed")]);
        assert_eq!(decompress(&frame).unwrap(), b"plain compressed");
    }

    #[test]
    fn chunk_checksum_enforced() {
        let mut chunk = vec![b'N'];
        chunk.extend_from_slice(b"payload");
        let mut frame = chunked_frame(&[chunk]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(
            decompress(&frame),
            Err(CascError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn unknown_mode_is_unsupported() {
        let mut frame = single_frame(b"");
        frame[8] = b'E';
        assert!(matches!(
            decompress(&frame),
            Err(CascError::NotSupported(_))
        ));
    }

    #[test]
    fn bad_magic_rejected() {
        assert!(matches!(
            decompress(b"NOPE\x00\x00\x00\x00N"),
            Err(CascError::BadFormat(_))
        ));
    }
}
