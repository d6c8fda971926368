//! REMNANT - Collection Parent Index
//! The store tells an index manager about every collection it writes into,
//! so collection-group lookups can later find all parents of a collection id.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::error::{RemnantError, Result};
use crate::types::ResourcePath;

/// Receives one-way notifications from the document store.
pub trait IndexManager: Send + Sync {
    /// Record that documents exist directly under `collection_path`.
    fn add_to_collection_parent_index(&self, collection_path: &ResourcePath) -> Result<()>;
}

/// In-memory index: collection id -> every parent path it appears under.
///
/// `rooms/1/messages` is indexed as `messages -> {rooms/1}`.
#[derive(Default)]
pub struct MemoryIndexManager {
    parents: Mutex<HashMap<String, BTreeSet<ResourcePath>>>,
}

impl MemoryIndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parent paths of every collection named `collection_id`, sorted.
    pub fn collection_parents(&self, collection_id: &str) -> Result<Vec<ResourcePath>> {
        let parents = self
            .parents
            .lock()
            .map_err(|_| RemnantError::unavailable("index lock poisoned"))?;
        Ok(parents
            .get(collection_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

impl IndexManager for MemoryIndexManager {
    fn add_to_collection_parent_index(&self, collection_path: &ResourcePath) -> Result<()> {
        let Some(collection_id) = collection_path.last_segment() else {
            return Err(RemnantError::InvalidArgument(
                "the root path is not a collection".to_string(),
            ));
        };
        let mut parents = self
            .parents
            .lock()
            .map_err(|_| RemnantError::unavailable("index lock poisoned"))?;
        let added = parents
            .entry(collection_id.to_string())
            .or_default()
            .insert(collection_path.pop_last());
        if added {
            log::debug!("Collection parent index: new parent for '{}'", collection_path);
        }
        Ok(())
    }
}
