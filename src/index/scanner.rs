//! Index directory scanning and newest-generation selection.
//!
//! A storage keeps one live index file per bucket plus older generations it
//! has not cleaned up yet. The scanner enumerates the directory, locks onto
//! whichever filename convention it sees first, and keeps the newest and
//! second-newest generation number per bucket.

use crate::error::{CascError, Result};
use crate::types::BUCKET_COUNT;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Index filename convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexNameFormat {
    /// `data.iXY`: X = bucket, Y = generation, one hex digit each.
    V1,
    /// `XXYYYYYYYY.idx`: XX = bucket, YYYYYYYY = generation.
    V2,
}

impl IndexNameFormat {
    /// Filename for a given bucket and generation under this convention.
    pub fn file_name(self, bucket: u8, generation: u32) -> String {
        match self {
            Self::V1 => format!("data.i{bucket:x}{generation:x}"),
            Self::V2 => format!("{bucket:02x}{generation:08x}.idx"),
        }
    }
}

/// `data.iXY` with two hex digits.
fn parse_v1_name(name: &str) -> Option<(u8, u32)> {
    if name.len() != 8 || !name[..6].eq_ignore_ascii_case("data.i") {
        return None;
    }
    let mut digits = name[6..].chars();
    let bucket = digits.next()?.to_digit(16)?;
    let generation = digits.next()?.to_digit(16)?;
    Some((bucket as u8, generation))
}

/// `XXYYYYYYYY.idx` with ten hex digits.
fn parse_v2_name(name: &str) -> Option<(u8, u32)> {
    if name.len() != 14
        || !name[10..].eq_ignore_ascii_case(".idx")
        || !name[..10].bytes().all(|b| b.is_ascii_hexdigit())
    {
        return None;
    }
    let bucket = u8::from_str_radix(&name[0..2], 16).ok()?;
    let generation = u32::from_str_radix(&name[2..10], 16).ok()?;
    Some((bucket, generation))
}

/// Scan result: the live and previous generation per bucket.
#[derive(Debug)]
pub struct IndexDirectory {
    pub format: IndexNameFormat,
    pub current: [u32; BUCKET_COUNT],
    pub previous: [u32; BUCKET_COUNT],
}

impl IndexDirectory {
    /// Enumerate `index_path` and select generations.
    ///
    /// The first file matching either convention locks the format for the
    /// rest of the scan; files that do not match the locked format are
    /// ignored, as are buckets outside `0..16`.
    pub fn scan(index_path: &Path) -> Result<Self> {
        if !index_path.is_dir() {
            return Err(CascError::FileNotFound(format!(
                "index directory {}",
                index_path.display()
            )));
        }

        let mut format = None;
        let mut current = [0u32; BUCKET_COUNT];
        let mut previous = [0u32; BUCKET_COUNT];

        for entry in fs::read_dir(index_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            let parsed = match format {
                None => {
                    if let Some(parsed) = parse_v1_name(name) {
                        format = Some(IndexNameFormat::V1);
                        Some(parsed)
                    } else if let Some(parsed) = parse_v2_name(name) {
                        format = Some(IndexNameFormat::V2);
                        Some(parsed)
                    } else {
                        None
                    }
                }
                Some(IndexNameFormat::V1) => parse_v1_name(name),
                Some(IndexNameFormat::V2) => parse_v2_name(name),
            };
            let Some((bucket, generation)) = parsed else {
                trace!("ignoring {name}");
                continue;
            };
            if bucket as usize >= BUCKET_COUNT {
                trace!("ignoring {name}: bucket {bucket:#04x} out of range");
                continue;
            }

            let slot = bucket as usize;
            if generation > current[slot] {
                previous[slot] = current[slot];
                current[slot] = generation;
            } else if generation > previous[slot] {
                previous[slot] = generation;
            }
        }

        let Some(format) = format else {
            return Err(CascError::FileNotFound(format!(
                "no index files in {}",
                index_path.display()
            )));
        };

        debug!(?format, "scanned index directory {}", index_path.display());
        Ok(Self {
            format,
            current,
            previous,
        })
    }

    /// Path of the live index file for `bucket`.
    pub fn bucket_path(&self, index_path: &Path, bucket: u8) -> PathBuf {
        index_path.join(self.format.file_name(bucket, self.current[bucket as usize]))
    }
}
