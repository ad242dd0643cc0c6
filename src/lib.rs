//! Read-only access to CASC (Content Addressable Storage Container)
//! storages as installed game clients keep them on disk.
//!
//! Opening a storage scans and verifies the per-bucket index files (both
//! the `data.iXY` and `XXYYYYYYYY.idx` generations), builds the unified
//! index map, loads the encoding file, and dispatches the root file to the
//! matching per-game handler. After that, file opens resolve
//! name → content key → encoding key → archive span in constant time.
//!
//! ```no_run
//! use casc_reader::{CascStorage, InfoClass};
//!
//! # fn example() -> casc_reader::Result<()> {
//! let mut storage = CascStorage::open("/games/wow/Data", 0)?;
//! println!("{} files", storage.info(InfoClass::FileCount)?);
//! let bytes = storage.read_by_name("Interface/FrameXML/Fonts.xml")?;
//! # let _ = bytes;
//! storage.close()?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod blte;
pub mod config;
pub mod encoding;
pub mod error;
pub mod index;
pub mod root;
pub mod storage;
pub mod types;
pub mod utils;

pub use error::{CascError, Result};
pub use storage::{CascStorage, InfoClass};
pub use types::{ArchiveLocation, ContentKey, EKey, GameId, IndexEntry, IndexKey, locale};

// Re-export commonly used types
pub use encoding::{EncodingEntry, EncodingFile};
pub use index::{CombinedIndex, IndexDirectory, IndexNameFormat, KeyMappingTable};
pub use root::{RootFeatures, RootHandler};
