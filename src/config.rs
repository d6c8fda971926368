//! REMNANT - Store Configuration
//! Defines tunable parameters for the engine and the document store.

use std::path::PathBuf;

use crate::error::{RemnantError, Result};

/// Configuration for the Remnant document store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for all data files (WAL, checkpoints).
    pub data_dir: PathBuf,

    /// WAL size in bytes after which it is rewritten with live entries only.
    pub wal_checkpoint_bytes: u64,

    /// Whether to sync WAL writes to disk immediately (fsync).
    pub sync_writes: bool,

    /// Worker threads used to decode rows during a collection scan.
    pub decode_workers: usize,

    /// Scans returning fewer rows than this are decoded on the calling thread.
    pub parallel_decode_threshold: usize,

    /// Reject an `add` whose read time is older than the one already stored.
    /// Off by default: the store is last-write-wins.
    pub reject_read_time_regression: bool,
}

impl Default for Config {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(4);
        Self {
            data_dir: PathBuf::from("./data"),
            wal_checkpoint_bytes: 16 * 1024 * 1024, // 16 MB
            sync_writes: true,
            decode_workers: workers,
            parallel_decode_threshold: 32,
            reject_read_time_regression: false,
        }
    }
}

impl Config {
    /// Create a new Config with a custom data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the WAL size that triggers a checkpoint.
    pub fn with_wal_checkpoint_bytes(mut self, bytes: u64) -> Self {
        self.wal_checkpoint_bytes = bytes;
        self
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Set the number of decode worker threads.
    pub fn with_decode_workers(mut self, workers: usize) -> Self {
        self.decode_workers = workers;
        self
    }

    pub fn with_parallel_decode_threshold(mut self, rows: usize) -> Self {
        self.parallel_decode_threshold = rows;
        self
    }

    pub fn with_reject_read_time_regression(mut self, reject: bool) -> Self {
        self.reject_read_time_regression = reject;
        self
    }

    /// Check that the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.decode_workers == 0 {
            return Err(RemnantError::Config(
                "decode_workers must be at least 1".to_string(),
            ));
        }
        if self.wal_checkpoint_bytes == 0 {
            return Err(RemnantError::Config(
                "wal_checkpoint_bytes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Ensure the data directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.decode_workers >= 1 && config.decode_workers <= 4);
        assert!(!config.reject_read_time_regression);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = Config::new("/tmp/x").with_decode_workers(0);
        assert!(matches!(config.validate(), Err(RemnantError::Config(_))));
    }
}
