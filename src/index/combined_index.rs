//! Unified lookup table over all bucket indices.

use crate::index::KeyMappingTable;
use crate::types::{IndexEntry, IndexKey};
use std::collections::HashMap;
use tracing::debug;

/// All bucket indices merged into one map keyed by truncated encoding key.
///
/// Built once during bootstrap and read-only afterwards.
pub struct CombinedIndex {
    entries: HashMap<IndexKey, IndexEntry>,
}

impl CombinedIndex {
    /// Merge the entries of every bucket table.
    ///
    /// Shipped game builds contain a handful of keys duplicated across
    /// buckets; the first entry seen wins and later ones are dropped.
    pub fn build(tables: &[KeyMappingTable]) -> Self {
        let total: usize = tables.iter().map(KeyMappingTable::entry_count).sum();
        let mut entries = HashMap::with_capacity(total);

        for table in tables {
            for entry in table.entries() {
                entries.entry(entry.key).or_insert(entry);
            }
        }

        debug!(
            "combined index holds {} of {} entries ({} duplicates)",
            entries.len(),
            total,
            total - entries.len()
        );
        Self { entries }
    }

    pub fn lookup(&self, key: &IndexKey) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }
}
