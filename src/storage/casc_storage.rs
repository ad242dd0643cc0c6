//! Storage lifecycle: bootstrap, queries, and teardown.
//!
//! `open` runs the whole bootstrap synchronously: configuration, index
//! scan, per-bucket parse, unified map, encoding file, root dispatch. The
//! first failure at any step unwinds, dropping every partially-built piece.

use crate::archive::Archive;
use crate::blte;
use crate::config::StorageConfig;
use crate::encoding::{EncodingEntry, EncodingFile};
use crate::error::{CascError, Result};
use crate::index::{CombinedIndex, IndexDirectory, KeyMappingTable};
use crate::root::{RootFeatures, RootHandler};
use crate::types::{BUCKET_COUNT, ContentKey, EKey, GameId, IndexEntry, IndexKey};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Per-blob header preceding the frame data inside an archive:
/// encoding key (16), size (4), flags (2), two checksums (4 + 4).
const DATA_ENTRY_HEADER_SIZE: usize = 30;

/// Storage info classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoClass {
    /// Number of entries in the unified index map.
    FileCount,
    /// Root handler feature bits.
    Features,
    /// Game identifier derived from the root variant.
    GameInfo,
    /// Build number from the build configuration.
    GameBuild,
}

type ArchiveMap = RwLock<HashMap<u16, Archive>>;

struct StorageInner {
    data_path: PathBuf,
    root_path: PathBuf,
    config: StorageConfig,
    locale_mask: u32,
    tables: Vec<KeyMappingTable>,
    index_map: CombinedIndex,
    encoding: EncodingFile,
    root: RootHandler,
    archives: ArchiveMap,
}

/// An open CASC storage.
///
/// Everything is loaded and verified by [`CascStorage::open`]; afterwards
/// the maps are read-only. [`CascStorage::close`] drops the buffers, maps,
/// and archive handles once the reference count reaches zero; any call
/// after that reports an invalid handle.
pub struct CascStorage {
    inner: Option<StorageInner>,
    ref_count: u32,
}

impl CascStorage {
    /// Open the storage rooted at `data_path` (the game's `Data` directory).
    ///
    /// A zero `locale_mask` selects the configured default.
    pub fn open(data_path: impl AsRef<Path>, locale_mask: u32) -> Result<Self> {
        let data_path = data_path.as_ref().to_path_buf();
        let root_path = data_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or(CascError::InvalidParameter("data path has no parent"))?;
        info!("opening CASC storage at {}", data_path.display());

        let config = StorageConfig::discover(&data_path)?;
        let locale_mask = if locale_mask == 0 {
            config.default_locale
        } else {
            locale_mask
        };

        // Older installs keep indices in their own directory; newer ones
        // mix them into the data directory.
        let indices_dir = data_path.join("indices");
        let index_path = if indices_dir.is_dir() {
            indices_dir
        } else {
            data_path.join("data")
        };

        let directory = IndexDirectory::scan(&index_path)?;
        let mut tables = Vec::with_capacity(BUCKET_COUNT);
        for bucket in 0..BUCKET_COUNT as u8 {
            let path = directory.bucket_path(&index_path, bucket);
            tables.push(KeyMappingTable::load(&path, bucket)?);
        }
        let index_map = CombinedIndex::build(&tables);

        let archives: ArchiveMap = RwLock::new(HashMap::new());

        // The encoding file is opened directly by its encoding key.
        let entry = resolve_ekey(&index_map, &config.encoding_ekey)?;
        let image = read_encoded(&archives, &data_path, &entry)?;
        let encoding = EncodingFile::parse(&image, false)?;
        debug!("encoding file loaded: {} entries", encoding.len());

        // The root file is named by content key and resolves like any file.
        let root_entry = encoding.lookup(&config.root_key).ok_or_else(|| {
            CascError::EntryNotFound(format!("root file {}", config.root_key))
        })?;
        let entry = resolve_ekey(&index_map, root_entry.primary_ekey())?;
        let image = read_encoded(&archives, &data_path, &entry)?;
        let root = RootHandler::dispatch(image, locale_mask)?;

        info!(
            "storage open: {} index entries, game {:?}, build {}",
            index_map.len(),
            root.game(),
            config.build_number
        );
        Ok(Self {
            inner: Some(StorageInner {
                data_path,
                root_path,
                config,
                locale_mask,
                tables,
                index_map,
                encoding,
                root,
                archives,
            }),
            ref_count: 1,
        })
    }

    /// Increase the reference count; each reference needs its own `close`.
    pub fn add_ref(&mut self) -> Result<()> {
        if self.inner.is_none() {
            return Err(CascError::InvalidHandle);
        }
        self.ref_count += 1;
        Ok(())
    }

    /// Drop one reference; the last one releases all owned state.
    pub fn close(&mut self) -> Result<()> {
        if self.inner.is_none() || self.ref_count == 0 {
            return Err(CascError::InvalidHandle);
        }
        self.ref_count -= 1;
        if self.ref_count == 0 {
            self.inner = None;
            debug!("storage closed");
        }
        Ok(())
    }

    fn inner(&self) -> Result<&StorageInner> {
        self.inner.as_ref().ok_or(CascError::InvalidHandle)
    }

    /// Query a numeric info class.
    pub fn info(&self, class: InfoClass) -> Result<u32> {
        let inner = self.inner()?;
        Ok(match class {
            InfoClass::FileCount => inner.index_map.len() as u32,
            InfoClass::Features => inner.root.features().bits(),
            InfoClass::GameInfo => inner.root.game() as u32,
            InfoClass::GameBuild => inner.config.build_number,
        })
    }

    /// Number of entries in the unified index map.
    pub fn file_count(&self) -> Result<usize> {
        Ok(self.inner()?.index_map.len())
    }

    pub fn features(&self) -> Result<RootFeatures> {
        Ok(self.inner()?.root.features())
    }

    pub fn game(&self) -> Result<GameId> {
        Ok(self.inner()?.root.game())
    }

    pub fn build_number(&self) -> Result<u32> {
        Ok(self.inner()?.config.build_number)
    }

    pub fn locale_mask(&self) -> Result<u32> {
        Ok(self.inner()?.locale_mask)
    }

    pub fn data_path(&self) -> Result<&Path> {
        Ok(&self.inner()?.data_path)
    }

    pub fn root_path(&self) -> Result<&Path> {
        Ok(&self.inner()?.root_path)
    }

    pub fn root(&self) -> Result<&RootHandler> {
        Ok(&self.inner()?.root)
    }

    /// Layout parameters of one bucket's index table.
    pub fn key_mapping(&self, bucket: u8) -> Result<&KeyMappingTable> {
        self.inner()?
            .tables
            .get(bucket as usize)
            .ok_or(CascError::InvalidParameter("bucket out of range"))
    }

    /// Resolve a content key through the encoding map.
    pub fn lookup_encoding(&self, content_key: &ContentKey) -> Option<&EncodingEntry> {
        self.inner.as_ref()?.encoding.lookup(content_key)
    }

    /// Resolve a truncated encoding key through the unified index map.
    pub fn lookup_index(&self, key: &IndexKey) -> Option<&IndexEntry> {
        self.inner.as_ref()?.index_map.lookup(key)
    }

    /// Read and decode the blob a full encoding key names.
    pub fn read_by_ekey(&self, ekey: &EKey) -> Result<Vec<u8>> {
        let inner = self.inner()?;
        let entry = resolve_ekey(&inner.index_map, ekey)?;
        read_encoded(&inner.archives, &inner.data_path, &entry)
    }

    /// Read a file's plaintext by its content key.
    pub fn read_by_content_key(&self, content_key: &ContentKey) -> Result<Vec<u8>> {
        let inner = self.inner()?;
        let encoding_entry = inner.encoding.lookup(content_key).ok_or_else(|| {
            CascError::EntryNotFound(format!("content key {content_key}"))
        })?;
        let entry = resolve_ekey(&inner.index_map, encoding_entry.primary_ekey())?;
        read_encoded(&inner.archives, &inner.data_path, &entry)
    }

    /// Read a file's plaintext by name, resolved through the root handler.
    pub fn read_by_name(&self, name: &str) -> Result<Vec<u8>> {
        let inner = self.inner()?;
        let content_key = *inner
            .root
            .lookup(name)
            .ok_or_else(|| CascError::EntryNotFound(format!("file name {name:?}")))?;
        self.read_by_content_key(&content_key)
    }
}

/// Index-map resolution with the bucket consistency check: the key's lead
/// nibble names the bucket that must own it.
fn resolve_ekey(index_map: &CombinedIndex, ekey: &EKey) -> Result<IndexEntry> {
    let entry = index_map
        .lookup(&ekey.index_key())
        .ok_or_else(|| CascError::EntryNotFound(format!("encoding key {ekey}")))?;
    if entry.bucket != ekey.bucket_index() {
        return Err(CascError::FileCorrupt(format!(
            "encoding key {ekey} found in bucket {:02x}, expected {:02x}",
            entry.bucket,
            ekey.bucket_index()
        )));
    }
    Ok(*entry)
}

/// Read one span from its archive and decode the frame, skipping the
/// per-blob entry header.
fn read_encoded(archives: &ArchiveMap, data_path: &Path, entry: &IndexEntry) -> Result<Vec<u8>> {
    let raw = read_span(archives, data_path, entry)?;
    if raw.len() < DATA_ENTRY_HEADER_SIZE {
        return Err(CascError::FileCorrupt(format!(
            "archive span for {} too small: {} bytes",
            entry.key,
            raw.len()
        )));
    }
    blte::decompress(&raw[DATA_ENTRY_HEADER_SIZE..])
}

/// Read the raw span, opening the archive on first use. The write lock
/// serializes archive access; handles keep their own positions.
fn read_span(archives: &ArchiveMap, data_path: &Path, entry: &IndexEntry) -> Result<Vec<u8>> {
    let mut archives = archives.write();
    let archive = match archives.entry(entry.location.archive_id) {
        Entry::Occupied(slot) => slot.into_mut(),
        Entry::Vacant(slot) => {
            let path = data_path
                .join("data")
                .join(Archive::file_name(entry.location.archive_id));
            slot.insert(Archive::open(entry.location.archive_id, path)?)
        }
    };
    archive.read_span(&entry.location)
}
