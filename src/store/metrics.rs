//! REMNANT - Store Metrics & Observability
//! Provides atomic counters for tracking store operations
//! in a lock-free, thread-safe manner using `AtomicU64`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic operation counters for the remote document store.
///
/// All counters use `Ordering::Relaxed`; they are for observability, not synchronization.
#[derive(Debug)]
pub struct StoreMetrics {
    /// Total number of `add` operations.
    pub adds: AtomicU64,
    /// Total number of `remove` operations.
    pub removes: AtomicU64,
    /// Total number of `get` operations.
    pub gets: AtomicU64,
    /// Total number of `get_all` operations.
    pub batch_gets: AtomicU64,
    /// Total number of collection scans (`get_all_matching_query`).
    pub scans: AtomicU64,
    /// Rows read from the engine by batch gets and scans.
    pub rows_scanned: AtomicU64,
    /// Rows decoded on a pool worker instead of the calling thread.
    pub background_decodes: AtomicU64,
    /// Rows that failed to decode.
    pub corrupt_records: AtomicU64,
    /// Total bytes written (row keys + rows).
    pub bytes_written: AtomicU64,
    /// Timestamp when the store was opened.
    started: Instant,
}

impl StoreMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            adds: AtomicU64::new(0),
            removes: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            batch_gets: AtomicU64::new(0),
            scans: AtomicU64::new(0),
            rows_scanned: AtomicU64::new(0),
            background_decodes: AtomicU64::new(0),
            corrupt_records: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Record an add operation.
    pub fn record_add(&self, key_size: usize, row_size: usize) {
        self.adds.fetch_add(1, Ordering::Relaxed);
        self.bytes_written
            .fetch_add((key_size + row_size) as u64, Ordering::Relaxed);
    }

    pub fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch get that read `rows` rows.
    pub fn record_batch_get(&self, rows: usize) {
        self.batch_gets.fetch_add(1, Ordering::Relaxed);
        self.rows_scanned.fetch_add(rows as u64, Ordering::Relaxed);
    }

    /// Record a scan that read `rows` rows.
    pub fn record_scan(&self, rows: usize) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.rows_scanned.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_background_decode(&self) {
        self.background_decodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corrupt_record(&self) {
        self.corrupt_records.fetch_add(1, Ordering::Relaxed);
    }

    /// Get store uptime in seconds.
    pub fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Get total number of public operations.
    pub fn total_ops(&self) -> u64 {
        self.adds.load(Ordering::Relaxed)
            + self.removes.load(Ordering::Relaxed)
            + self.gets.load(Ordering::Relaxed)
            + self.batch_gets.load(Ordering::Relaxed)
            + self.scans.load(Ordering::Relaxed)
    }

    /// Format metrics as a human-readable report.
    pub fn report(&self) -> String {
        format!(
            "\n═══ REMNANT Store Metrics ═══\n\
             Operations:\n\
               adds:        {}\n\
               removes:     {}\n\
               gets:        {}\n\
               batch gets:  {}\n\
               scans:       {}\n\
             Decoding:\n\
               rows read:   {}\n\
               background:  {}\n\
               corrupt:     {}\n\
             I/O:\n\
               written:     {} bytes\n\
             Uptime: {:.2}s",
            self.adds.load(Ordering::Relaxed),
            self.removes.load(Ordering::Relaxed),
            self.gets.load(Ordering::Relaxed),
            self.batch_gets.load(Ordering::Relaxed),
            self.scans.load(Ordering::Relaxed),
            self.rows_scanned.load(Ordering::Relaxed),
            self.background_decodes.load(Ordering::Relaxed),
            self.corrupt_records.load(Ordering::Relaxed),
            self.bytes_written.load(Ordering::Relaxed),
            self.uptime_secs(),
        )
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_operations() {
        let m = StoreMetrics::new();

        m.record_add(5, 10);
        m.record_add(3, 7);
        m.record_get();
        m.record_remove();
        m.record_batch_get(4);
        m.record_scan(6);
        m.record_corrupt_record();

        assert_eq!(m.adds.load(Ordering::Relaxed), 2);
        assert_eq!(m.gets.load(Ordering::Relaxed), 1);
        assert_eq!(m.removes.load(Ordering::Relaxed), 1);
        assert_eq!(m.rows_scanned.load(Ordering::Relaxed), 10);
        assert_eq!(m.corrupt_records.load(Ordering::Relaxed), 1);
        assert_eq!(m.bytes_written.load(Ordering::Relaxed), 25);
        assert_eq!(m.total_ops(), 6);
    }

    #[test]
    fn test_report_format() {
        let m = StoreMetrics::default();
        m.record_add(10, 20);
        let report = m.report();
        assert!(report.contains("adds:"));
        assert!(report.contains("background:"));
        assert!(report.contains("written:"));
    }
}
