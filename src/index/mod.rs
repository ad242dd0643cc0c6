//! Index file handling: directory scanning, parsing, and the unified map.

mod combined_index;
mod parser;
mod scanner;

pub use combined_index::CombinedIndex;
pub use parser::{INDEX_ENTRY_SIZE, IndexFormat, KeyMappingTable, MAX_INDEX_FILE_SIZE};
pub use scanner::{IndexDirectory, IndexNameFormat};
