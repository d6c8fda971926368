//! REMNANT - Concurrent Engine Wrapper
//! Thread-safe wrapper around the engine using Arc + RwLock.
//!
//! ## Concurrency Model
//! - **Read operations** (`get`, `scan_prefix`, `scan_range`, `len`) take a **read lock**
//! - **Write operations** (`put`, `put_if`, `delete`, `checkpoint`) take a **write lock**
//! - Multiple concurrent readers allowed, writers block all
//!
//! Every `OrderedStore` call holds the lock for its whole duration, so each
//! one is isolated from concurrent writers.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::Config;
use crate::error::{RemnantError, Result};
use crate::types::{Key, Value};

use super::{Engine, OrderedStore};

/// Thread-safe handle to the engine. Clones share the same engine.
#[derive(Clone)]
pub struct ConcurrentEngine {
    inner: Arc<RwLock<Engine>>,
}

impl ConcurrentEngine {
    /// Open or create a concurrent engine.
    pub fn open(config: Config) -> Result<Self> {
        let engine = Engine::open(config)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(engine)),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Engine>> {
        self.inner
            .read()
            .map_err(|_| RemnantError::unavailable("engine lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Engine>> {
        self.inner
            .write()
            .map_err(|_| RemnantError::unavailable("engine lock poisoned"))
    }

    /// Get number of entries (read lock).
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Check if engine is empty (read lock).
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Get WAL size in bytes (read lock).
    pub fn wal_size(&self) -> Result<u64> {
        Ok(self.read()?.wal_size())
    }

    /// Compact the WAL down to live entries (write lock).
    pub fn checkpoint(&self) -> Result<()> {
        self.write()?.checkpoint()
    }
}

impl OrderedStore for ConcurrentEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        Ok(self.read()?.get(key))
    }

    fn put(&self, key: Key, value: Value) -> Result<()> {
        self.write()?.put(key, value)
    }

    fn delete(&self, key: Key) -> Result<()> {
        self.write()?.delete(&key)
    }

    fn put_if(
        &self,
        key: Key,
        value: Value,
        check: &dyn Fn(Option<&Value>) -> Result<()>,
    ) -> Result<()> {
        self.write()?.put_if(key, value, check)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Key, Value)>> {
        Ok(self.read()?.scan_prefix(prefix))
    }

    fn scan_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Key, Value)>> {
        Ok(self.read()?.scan_range(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn temp_config(dir: &std::path::Path) -> Config {
        Config::new(dir).with_sync_writes(false)
    }

    #[test]
    fn test_concurrent_put_get() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ConcurrentEngine::open(temp_config(dir.path())).unwrap();

        engine.put(b"test".to_vec(), b"value".to_vec()).unwrap();
        assert_eq!(engine.get(b"test").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn test_clone_and_share() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ConcurrentEngine::open(temp_config(dir.path())).unwrap();

        let engine_clone = engine.clone();
        engine_clone.put(b"shared".to_vec(), b"data".to_vec()).unwrap();

        // Original handle sees the update
        assert_eq!(engine.get(b"shared").unwrap(), Some(b"data".to_vec()));
    }

    #[test]
    fn test_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ConcurrentEngine::open(temp_config(dir.path())).unwrap();
        let mut handles = vec![];

        // Spawn 5 concurrent writers
        for i in 0..5 {
            let engine_clone = engine.clone();
            let handle = thread::spawn(move || {
                let key = format!("key_{}", i).into_bytes();
                let value = format!("value_{}", i).into_bytes();
                engine_clone.put(key, value).unwrap();
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len().unwrap(), 5);
        assert_eq!(engine.scan_prefix(b"key_").unwrap().len(), 5);
    }

    #[test]
    fn test_concurrent_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ConcurrentEngine::open(temp_config(dir.path())).unwrap();
        engine.put(b"initial".to_vec(), b"value".to_vec()).unwrap();

        let mut handles = vec![];

        // 5 readers
        for _ in 0..5 {
            let engine_clone = engine.clone();
            handles.push(thread::spawn(move || {
                assert_eq!(
                    engine_clone.get(b"initial").unwrap(),
                    Some(b"value".to_vec())
                );
            }));
        }

        // 5 writers
        for i in 0..5 {
            let engine_clone = engine.clone();
            handles.push(thread::spawn(move || {
                let key = format!("writer_{}", i).into_bytes();
                engine_clone.put(key, b"data".to_vec()).unwrap();
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len().unwrap(), 6);
    }

    #[test]
    fn test_checkpoint_through_handle() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ConcurrentEngine::open(temp_config(dir.path())).unwrap();
        for i in 0..20 {
            engine.put(b"k".to_vec(), vec![i; 8]).unwrap();
        }
        let before = engine.wal_size().unwrap();
        engine.checkpoint().unwrap();
        assert!(engine.wal_size().unwrap() < before);
        assert_eq!(engine.get(b"k").unwrap(), Some(vec![19; 8]));
    }
}
