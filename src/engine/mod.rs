//! REMNANT - Storage Engine Module
//! The ordered key-value engine the document store is built on.

pub mod concurrent;
pub mod memtable;
pub mod wal;

use std::fs::OpenOptions;

use crate::config::Config;
use crate::error::Result;
use crate::types::{Key, Value};

use self::memtable::MemTable;
use self::wal::WriteAheadLog;

pub use self::concurrent::ConcurrentEngine;

const WAL_FILE: &str = "remnant.wal";

/// Transactional get/put/delete and ordered prefix scans over a byte-key space.
///
/// Every single-key call is atomic. Implementations report I/O failures as
/// `StorageUnavailable`.
pub trait OrderedStore: Send + Sync {
    /// Point lookup.
    fn get(&self, key: &[u8]) -> Result<Option<Value>>;

    /// Insert or overwrite a key.
    fn put(&self, key: Key, value: Value) -> Result<()>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: Key) -> Result<()>;

    /// Write `value` only if `check` accepts the current value for `key`.
    ///
    /// The check and the write are one atomic step. An error from `check` is
    /// returned as-is and nothing is written.
    fn put_if(
        &self,
        key: Key,
        value: Value,
        check: &dyn Fn(Option<&Value>) -> Result<()>,
    ) -> Result<()>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Key, Value)>>;

    /// All entries with `start <= key <= end`, in ascending key order.
    fn scan_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Key, Value)>>;
}

/// The core storage engine.
/// Coordinates the MemTable and the WAL to provide a durable ordered key-value store.
pub struct Engine {
    /// In-memory sorted table holding every live entry.
    memtable: MemTable,
    /// Write-ahead log for crash recovery.
    wal: WriteAheadLog,
    /// Engine configuration.
    config: Config,
}

impl Engine {
    /// Open or create an engine at the configured path.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        config.ensure_dirs()?;

        let wal_path = config.data_dir.join(WAL_FILE);
        let recovered = WriteAheadLog::recover(&wal_path)?;

        // Cut off a torn tail so new appends land after the last good record.
        if wal_path.exists() {
            let file = OpenOptions::new().write(true).open(&wal_path)?;
            if file.metadata()?.len() > recovered.valid_bytes {
                file.set_len(recovered.valid_bytes)?;
                file.sync_all()?;
            }
        }
        let wal = WriteAheadLog::open(wal_path, config.sync_writes)?;

        log::info!(
            "Remnant engine opened at {:?} ({} records replayed, {} live entries)",
            config.data_dir,
            recovered.records,
            recovered.memtable.len()
        );

        Ok(Self {
            memtable: recovered.memtable,
            wal,
            config,
        })
    }

    /// Insert a key-value pair into the engine.
    /// The write path: WAL (disk) -> MemTable (memory).
    pub fn put(&mut self, key: Key, value: Value) -> Result<()> {
        self.wal.append_put(&key, &value)?;
        self.memtable.insert(key, value);
        self.maybe_checkpoint()
    }

    /// Insert `value` after `check` has accepted the current value.
    pub fn put_if<F>(&mut self, key: Key, value: Value, check: F) -> Result<()>
    where
        F: FnOnce(Option<&Value>) -> Result<()>,
    {
        check(self.memtable.get(&key))?;
        self.put(key, value)
    }

    /// Delete a key. No-op (and no WAL record) if it is absent.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        if self.memtable.get(key).is_none() {
            return Ok(());
        }
        self.wal.append_delete(key)?;
        self.memtable.remove(key);
        self.maybe_checkpoint()
    }

    /// Get a value by key.
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.memtable.get(key).cloned()
    }

    /// All entries under `prefix`, sorted by key.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Key, Value)> {
        self.memtable
            .range_prefix(prefix)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Entries with `start <= key <= end`, sorted by key.
    pub fn scan_range(&self, start: &[u8], end: &[u8]) -> Vec<(Key, Value)> {
        self.memtable
            .range_inclusive(start, end)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.memtable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memtable.is_empty()
    }

    /// Current WAL size in bytes.
    pub fn wal_size(&self) -> u64 {
        self.wal.size()
    }

    /// Rewrite the WAL so it holds only live entries.
    pub fn checkpoint(&mut self) -> Result<()> {
        let before = self.wal.size();
        self.wal.rewrite(&self.memtable)?;
        log::info!(
            "WAL checkpoint: {} -> {} bytes ({} live entries)",
            before,
            self.wal.size(),
            self.memtable.len()
        );
        Ok(())
    }

    fn maybe_checkpoint(&mut self) -> Result<()> {
        // Only worth it when most of the log is overwritten history.
        if self.wal.size() >= self.config.wal_checkpoint_bytes
            && self.wal.size() as usize > 2 * self.memtable.size()
        {
            self.checkpoint()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(dir: &std::path::Path) -> Config {
        Config::new(dir).with_sync_writes(false)
    }

    #[test]
    fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::open(temp_config(dir.path())).unwrap();

        engine.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        assert_eq!(engine.get(b"a"), Some(b"1".to_vec()));
        engine.delete(b"a").unwrap();
        assert_eq!(engine.get(b"a"), None);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_delete_missing_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::open(temp_config(dir.path())).unwrap();
        engine.delete(b"ghost").unwrap();
        assert_eq!(engine.wal_size(), 0);
    }

    #[test]
    fn test_scan_prefix_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::open(temp_config(dir.path())).unwrap();
        engine.put(b"p/c".to_vec(), b"3".to_vec()).unwrap();
        engine.put(b"p/a".to_vec(), b"1".to_vec()).unwrap();
        engine.put(b"q/b".to_vec(), b"2".to_vec()).unwrap();

        let entries = engine.scan_prefix(b"p/");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, b"p/a");
        assert_eq!(entries[1].0, b"p/c");
    }

    #[test]
    fn test_scan_range_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::open(temp_config(dir.path())).unwrap();
        for k in [b"k1", b"k2", b"k3", b"k4"] {
            engine.put(k.to_vec(), b"v".to_vec()).unwrap();
        }

        let keys: Vec<Key> = engine
            .scan_range(b"k2", b"k3")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"k2".to_vec(), b"k3".to_vec()]);
        assert!(engine.scan_range(b"k4", b"k1").is_empty());
    }

    #[test]
    fn test_put_if_rejected_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::open(temp_config(dir.path())).unwrap();
        engine.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        let wal_before = engine.wal_size();

        let err = engine
            .put_if(b"a".to_vec(), b"2".to_vec(), |current| {
                assert_eq!(current, Some(&b"1".to_vec()));
                Err(crate::error::RemnantError::InvalidArgument("no".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, crate::error::RemnantError::InvalidArgument(_)));
        assert_eq!(engine.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(engine.wal_size(), wal_before);

        engine
            .put_if(b"b".to_vec(), b"3".to_vec(), |current| {
                assert!(current.is_none());
                Ok(())
            })
            .unwrap();
        assert_eq!(engine.get(b"b"), Some(b"3".to_vec()));
    }

    #[test]
    fn test_reopen_after_torn_write() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut engine = Engine::open(temp_config(dir.path())).unwrap();
            engine.put(b"kept".to_vec(), b"yes".to_vec()).unwrap();
        }
        let wal_path = dir.path().join(WAL_FILE);
        let mut bytes = std::fs::read(&wal_path).unwrap();
        bytes.extend_from_slice(&[1, 9, 0]); // half a record
        std::fs::write(&wal_path, &bytes).unwrap();

        {
            let mut engine = Engine::open(temp_config(dir.path())).unwrap();
            assert_eq!(engine.get(b"kept"), Some(b"yes".to_vec()));
            engine.put(b"next".to_vec(), b"ok".to_vec()).unwrap();
        }
        let engine = Engine::open(temp_config(dir.path())).unwrap();
        assert_eq!(engine.get(b"next"), Some(b"ok".to_vec()));
    }

    #[test]
    fn test_automatic_checkpoint_shrinks_wal() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path()).with_wal_checkpoint_bytes(512);
        let mut engine = Engine::open(config.clone()).unwrap();

        for i in 0..200 {
            engine
                .put(b"hot".to_vec(), format!("value_{:04}", i).into_bytes())
                .unwrap();
        }
        assert!(engine.wal_size() < 512 + 64);
        drop(engine);

        let engine = Engine::open(config).unwrap();
        assert_eq!(engine.get(b"hot"), Some(b"value_0199".to_vec()));
        assert_eq!(engine.len(), 1);
    }
}
