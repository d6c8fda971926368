//! REMNANT - Remote Document Store
//!
//! A persistent, versioned cache of server-authoritative documents, built on a
//! crash-recoverable ordered key-value engine.
//!
//! ## Features
//! - **Read times**: every cached document records when the server state was observed
//! - **Incremental catch-up**: collection scans can skip rows read before a given time
//! - **Tombstones**: deleted documents are cached distinctly from unknown ones
//! - **Batched lookups**: one range scan per collection, not one per key
//! - **Parallel decode**: large scans fan decoding out to a bounded worker pool
//! - **Write-Ahead Log**: CRC32-framed, replayed on open, checkpointed when it grows
//! - **Metrics**: Lock-free atomic counters for observability
//!
//! ## Example
//! ```no_run
//! use remnant::config::Config;
//! use remnant::document::Document;
//! use remnant::store::{Query, RemoteDocumentStore};
//! use remnant::types::{ObjectValue, ReadTime};
//!
//! let store = RemoteDocumentStore::open(Config::default()).unwrap();
//!
//! let key = "rooms/1".parse().unwrap();
//! let doc = Document::found(key, ReadTime::new(90, 0).unwrap(), ObjectValue::new());
//! store.add(&doc, ReadTime::new(100, 0).unwrap()).unwrap();
//!
//! let since = store.get_latest_read_time().unwrap();
//! let query = Query::collection("rooms".parse().unwrap()).unwrap();
//! let changed = store.get_all_matching_query(&query, since).unwrap();
//! assert!(changed.is_empty());
//! ```

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod store;
pub mod types;
