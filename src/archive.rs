//! Data archive (`data.NNN`) access.
//!
//! Archives are opened lazily on first use and stay open until the storage
//! is closed. Small archives are memory-mapped; larger ones fall back to a
//! buffered reader behind the storage's archive lock.

use crate::error::{CascError, Result};
use crate::types::ArchiveLocation;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Upper bound for memory mapping; beyond this a seeking reader is used.
const MMAP_LIMIT: u64 = 2 * 1024 * 1024 * 1024;

/// An open archive file.
pub struct Archive {
    id: u16,
    path: PathBuf,
    size: u64,
    mmap: Option<Mmap>,
    file: Option<BufReader<File>>,
}

impl Archive {
    /// Open the archive at `path`.
    pub fn open(id: u16, path: PathBuf) -> Result<Self> {
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CascError::ArchiveNotFound(id)
            } else {
                CascError::Io(e)
            }
        })?;
        let size = file.metadata()?.len();
        debug!("opening archive {}: {} bytes", path.display(), size);

        let mmap = if size > 0 && size < MMAP_LIMIT {
            // SAFETY: the map is read-only and the storage format treats
            // archives as immutable while open.
            unsafe { MmapOptions::new().map(&file) }.ok()
        } else {
            None
        };
        let file = if mmap.is_none() {
            Some(BufReader::new(file))
        } else {
            None
        };

        Ok(Self {
            id,
            path,
            size,
            mmap,
            file,
        })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// The canonical file name for an archive number.
    pub fn file_name(id: u16) -> String {
        format!("data.{id:03}")
    }

    /// Read the span a location describes.
    pub fn read_span(&mut self, location: &ArchiveLocation) -> Result<Vec<u8>> {
        self.read_at(location.offset, location.size as usize)
    }

    /// Read `length` bytes at `offset`.
    pub fn read_at(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        if offset.checked_add(length as u64).is_none_or(|end| end > self.size) {
            return Err(CascError::FileCorrupt(format!(
                "archive {}: span {offset:#x}+{length:#x} beyond size {:#x}",
                self.id, self.size
            )));
        }

        if let Some(mmap) = &self.mmap {
            Ok(mmap[offset as usize..offset as usize + length].to_vec())
        } else if let Some(file) = &mut self.file {
            file.seek(SeekFrom::Start(offset))?;
            let mut buffer = vec![0u8; length];
            file.read_exact(&mut buffer)?;
            Ok(buffer)
        } else {
            Err(CascError::ArchiveNotFound(self.id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_spans_within_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Archive::file_name(0));
        let mut file = File::create(&path).unwrap();
        file.write_all(b"0123456789").unwrap();
        drop(file);

        let mut archive = Archive::open(0, path).unwrap();
        assert_eq!(archive.size(), 10);
        assert_eq!(archive.read_at(2, 3).unwrap(), b"234");
        assert!(archive.read_at(8, 4).is_err());
        assert!(archive.read_at(u64::MAX, 1).is_err());
    }

    #[test]
    fn missing_archive_is_reported_by_number() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(Archive::file_name(7));
        assert!(matches!(
            Archive::open(7, missing),
            Err(CascError::ArchiveNotFound(7))
        ));
    }

    #[test]
    fn file_name_formatting() {
        assert_eq!(Archive::file_name(0), "data.000");
        assert_eq!(Archive::file_name(123), "data.123");
    }
}
