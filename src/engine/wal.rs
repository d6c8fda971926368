//! REMNANT - Write-Ahead Log (WAL)
//! Provides durability by logging all mutations to disk
//! before they are applied to the in-memory MemTable.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{RemnantError, Result};
use crate::types::{Key, Value};

use super::memtable::MemTable;

/// Operation type for WAL entries.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
enum OpType {
    Put = 1,
    Delete = 2,
}

impl OpType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(OpType::Put),
            2 => Some(OpType::Delete),
            _ => None,
        }
    }
}

/// Fixed bytes per record besides key and value: op + two lengths + crc.
const RECORD_OVERHEAD: usize = 1 + 4 + 4 + 4;

/// Write-Ahead Log for crash recovery and durability.
///
/// ## Binary Format (per entry)
/// ```text
/// [op_type: 1 byte][key_len: 4 bytes (LE)][key: N bytes][val_len: 4 bytes (LE)][value: M bytes][crc: 4 bytes]
/// ```
pub struct WriteAheadLog {
    /// Path to the WAL file on disk.
    path: PathBuf,
    /// File handle opened for appending.
    file: File,
    /// fsync after every append.
    sync_writes: bool,
    /// Current size of the log in bytes.
    size_bytes: u64,
}

/// Result of replaying a WAL file.
pub struct Recovered {
    pub memtable: MemTable,
    /// Length of the intact prefix of the file.
    pub valid_bytes: u64,
    /// Records replayed.
    pub records: usize,
}

impl WriteAheadLog {
    /// Open or create a WAL file at the specified path.
    pub fn open(path: PathBuf, sync_writes: bool) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size_bytes = file.metadata()?.len();

        Ok(Self {
            path,
            file,
            sync_writes,
            size_bytes,
        })
    }

    /// Returns the path to the WAL file.
    /// Returns the current size of the log in bytes.
    pub fn size(&self) -> u64 {
        self.size_bytes
    }

    /// Encode a PUT entry into the binary WAL format.
    fn encode_put(key: &[u8], value: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RECORD_OVERHEAD + key.len() + value.len());
        buf.push(OpType::Put as u8);
        buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
        buf.extend_from_slice(key);
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(value);
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Encode a DELETE entry into the binary WAL format.
    fn encode_delete(key: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RECORD_OVERHEAD + key.len());
        buf.push(OpType::Delete as u8);
        buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
        buf.extend_from_slice(key);
        buf.extend_from_slice(&0u32.to_le_bytes());
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    fn append(&mut self, encoded: &[u8]) -> Result<()> {
        self.file.write_all(encoded)?;
        if self.sync_writes {
            self.file.sync_all()?;
        }
        self.size_bytes += encoded.len() as u64;
        Ok(())
    }

    /// Append a PUT operation to the WAL.
    /// The write is persisted before the MemTable is updated in memory.
    pub fn append_put(&mut self, key: &Key, value: &Value) -> Result<()> {
        let encoded = Self::encode_put(key, value);
        self.append(&encoded)
    }

    /// Append a DELETE operation to the WAL.
    pub fn append_delete(&mut self, key: &[u8]) -> Result<()> {
        let encoded = Self::encode_delete(key);
        self.append(&encoded)
    }

    /// Replace the log with one PUT per live entry.
    ///
    /// The new log is written to a temp file, synced, then renamed over the
    /// old one, so a crash leaves either the old or the new log intact.
    pub fn rewrite(&mut self, memtable: &MemTable) -> Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        let mut size_bytes = 0u64;
        {
            let mut tmp = File::create(&tmp_path)?;
            for (key, value) in memtable.entries() {
                let encoded = Self::encode_put(key, value);
                tmp.write_all(&encoded)?;
                size_bytes += encoded.len() as u64;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.size_bytes = size_bytes;
        Ok(())
    }

    /// Replay a WAL file into a fresh MemTable.
    ///
    /// A record cut short at the end of the file is a torn write and is dropped.
    /// A complete record with a bad checksum means the log is corrupt.
    pub fn recover(path: &Path) -> Result<Recovered> {
        let mut memtable = MemTable::new();
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Recovered {
                    memtable,
                    valid_bytes: 0,
                    records: 0,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut offset = 0usize;
        let mut records = 0usize;
        while offset < data.len() {
            let Some((op, key, value, len)) = Self::decode_record(&data[offset..])? else {
                log::warn!(
                    "WAL {:?}: dropping torn record at offset {} ({} trailing bytes)",
                    path,
                    offset,
                    data.len() - offset
                );
                break;
            };
            match op {
                OpType::Put => memtable.insert(key, value),
                OpType::Delete => {
                    memtable.remove(&key);
                }
            }
            offset += len;
            records += 1;
        }

        Ok(Recovered {
            memtable,
            valid_bytes: offset as u64,
            records,
        })
    }

    /// Decode one record. `Ok(None)` means the buffer ends mid-record.
    fn decode_record(buf: &[u8]) -> Result<Option<(OpType, Key, Value, usize)>> {
        let read_u32 = |at: usize| -> Option<usize> {
            buf.get(at..at + 4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
        };

        let Some(&op_byte) = buf.first() else {
            return Ok(None);
        };
        let Some(key_len) = read_u32(1) else {
            return Ok(None);
        };
        let key_end = 5 + key_len;
        let Some(val_len) = read_u32(key_end) else {
            return Ok(None);
        };
        let val_end = key_end + 4 + val_len;
        let Some(crc) = read_u32(val_end) else {
            return Ok(None);
        };

        if crc32fast::hash(&buf[..val_end]) as usize != crc {
            return Err(RemnantError::RecoveryFailed(
                "WAL record checksum mismatch".to_string(),
            ));
        }
        let op = OpType::from_byte(op_byte).ok_or_else(|| {
            RemnantError::RecoveryFailed(format!("unknown WAL op type {}", op_byte))
        })?;

        let key = buf[5..key_end].to_vec();
        let value = buf[key_end + 4..val_end].to_vec();
        Ok(Some((op, key, value, val_end + 4)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_recover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wal");
        {
            let mut wal = WriteAheadLog::open(path.clone(), false).unwrap();
            wal.append_put(&b"a".to_vec(), &b"1".to_vec()).unwrap();
            wal.append_put(&b"b".to_vec(), &b"2".to_vec()).unwrap();
            wal.append_delete(b"a").unwrap();
        }
        let recovered = WriteAheadLog::recover(&path).unwrap();
        assert_eq!(recovered.records, 3);
        assert_eq!(recovered.memtable.get(b"a"), None);
        assert_eq!(recovered.memtable.get(b"b"), Some(&b"2".to_vec()));
    }

    #[test]
    fn test_recover_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let recovered = WriteAheadLog::recover(&dir.path().join("none.wal")).unwrap();
        assert!(recovered.memtable.is_empty());
        assert_eq!(recovered.valid_bytes, 0);
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("torn.wal");
        let good_len = {
            let mut wal = WriteAheadLog::open(path.clone(), false).unwrap();
            wal.append_put(&b"keep".to_vec(), &b"v".to_vec()).unwrap();
            let good = wal.size();
            wal.append_put(&b"lost".to_vec(), &b"value".to_vec()).unwrap();
            good
        };
        let full = fs::read(&path).unwrap();
        fs::write(&path, &full[..full.len() - 3]).unwrap();

        let recovered = WriteAheadLog::recover(&path).unwrap();
        assert_eq!(recovered.records, 1);
        assert_eq!(recovered.valid_bytes, good_len);
        assert_eq!(recovered.memtable.get(b"lost"), None);
    }

    #[test]
    fn test_checksum_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wal");
        {
            let mut wal = WriteAheadLog::open(path.clone(), false).unwrap();
            wal.append_put(&b"key".to_vec(), &b"value".to_vec()).unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        bytes[6] ^= 0xFF; // flip a key byte
        fs::write(&path, &bytes).unwrap();

        let result = WriteAheadLog::recover(&path);
        assert!(matches!(result, Err(RemnantError::RecoveryFailed(_))));
    }

    #[test]
    fn test_rewrite_keeps_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rw.wal");
        let mut wal = WriteAheadLog::open(path.clone(), false).unwrap();
        for i in 0..10 {
            wal.append_put(&b"k".to_vec(), &format!("v{}", i).into_bytes())
                .unwrap();
        }
        let before = wal.size();

        let mut table = MemTable::new();
        table.insert(b"k".to_vec(), b"v9".to_vec());
        wal.rewrite(&table).unwrap();
        assert!(wal.size() < before);

        wal.append_put(&b"j".to_vec(), &b"after".to_vec()).unwrap();
        let recovered = WriteAheadLog::recover(&path).unwrap();
        assert_eq!(recovered.memtable.get(b"k"), Some(&b"v9".to_vec()));
        assert_eq!(recovered.memtable.get(b"j"), Some(&b"after".to_vec()));
    }
}
