//! REMNANT - MemTable (In-Memory Sorted Map)
//! Holds the live contents of the engine. The WAL is replayed into it on open.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::types::{Key, Value};

/// In-memory sorted key-value store backed by a BTreeMap.
pub struct MemTable {
    /// Sorted map storing live key-value pairs.
    entries: BTreeMap<Key, Value>,
    /// Current approximate size in bytes.
    size_bytes: usize,
}

impl MemTable {
    /// Create a new, empty MemTable.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            size_bytes: 0,
        }
    }

    /// Returns the approximate size of the MemTable in bytes.
    pub fn size(&self) -> usize {
        self.size_bytes
    }

    /// Returns the number of entries in the MemTable.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the MemTable is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a key-value pair into the MemTable.
    /// If the key already exists, the old value is replaced.
    pub fn insert(&mut self, key: Key, value: Value) {
        let entry_size = key.len() + value.len();
        if let Some(old_val) = self.entries.get(&key) {
            self.size_bytes = self.size_bytes.saturating_sub(key.len() + old_val.len());
        }
        self.size_bytes += entry_size;
        self.entries.insert(key, value);
    }

    /// Get a value by key.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Remove a key. Returns true if it was present.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        match self.entries.remove(key) {
            Some(old_val) => {
                self.size_bytes = self.size_bytes.saturating_sub(key.len() + old_val.len());
                true
            }
            None => false,
        }
    }

    /// Iterate, in key order, over every entry whose key starts with `prefix`.
    pub fn range_prefix<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (&'a Key, &'a Value)> + 'a {
        self.entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
    }

    /// Iterate, in key order, over every entry with `start <= key <= end`.
    pub fn range_inclusive<'a>(
        &'a self,
        start: &'a [u8],
        end: &'a [u8],
    ) -> impl Iterator<Item = (&'a Key, &'a Value)> + 'a {
        // An inverted range is empty rather than a panic.
        let upper = end.max(start);
        self.entries
            .range::<[u8], _>((Bound::Included(start), Bound::Included(upper)))
            .take_while(move |(k, _)| k.as_slice() <= end)
    }

    /// Clear all entries from the MemTable and reset size.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.size_bytes = 0;
    }

    /// Returns a reference to the inner BTreeMap for iteration.
    pub fn entries(&self) -> &BTreeMap<Key, Value> {
        &self.entries
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
