//! REMNANT - Remote Document Store
//! Persistent, versioned cache of server-authoritative documents.
//!
//! ## Row Layout
//! One engine entry per document:
//! ```text
//! key:   [table tag][encode(collection)][0x00][encode(document id)]
//! value: bincode(StoreRow { read_time_seconds, read_time_nanos, contents })
//! ```
//! A collection is therefore one contiguous, ordered key range.
//!
//! ## Read Path
//! - `get` is a single point lookup.
//! - `get_all` issues one range scan per distinct collection.
//! - `get_all_matching_query` scans one collection, filters on the row's read
//!   time, and decodes the survivors through a [`DecodePool`].
//!
//! The store keeps no authoritative state in memory. Every call goes to the engine.

pub mod codec;
pub mod decode_pool;
pub mod encoded_path;
pub mod index;
pub mod metrics;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::Config;
use crate::document::Document;
use crate::engine::{ConcurrentEngine, OrderedStore};
use crate::error::{RemnantError, Result};
use crate::types::{DocumentKey, FieldValue, Key, ReadTime, ResourcePath, Value};

use self::codec::{decode_document, encode_document, BincodeCodec, DocumentCodec, StoreRow};
use self::decode_pool::{DecodePool, Interrupter, Job};
use self::encoded_path::{collection_prefix, document_id_from_row_key, row_key, table_prefix};
use self::index::{IndexManager, MemoryIndexManager};
use self::metrics::StoreMetrics;

/// Shared document predicate, evaluated on pool workers.
pub type Predicate = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// Documents keyed and ordered by document key.
pub type DocumentMap = BTreeMap<DocumentKey, Document>;

/// A scan of one collection, optionally narrowed by a predicate.
#[derive(Clone)]
pub struct Query {
    path: ResourcePath,
    predicate: Option<Predicate>,
}

impl Query {
    /// Match every document directly inside `path`.
    pub fn collection(path: ResourcePath) -> Result<Self> {
        if path.len() % 2 == 0 {
            return Err(RemnantError::InvalidArgument(format!(
                "'{}' is not a collection path",
                path
            )));
        }
        Ok(Self {
            path,
            predicate: None,
        })
    }

    /// Add a predicate. Multiple predicates must all hold.
    pub fn with_predicate<F>(self, f: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate = match self.predicate {
            Some(existing) => Arc::new(move |doc: &Document| existing(doc) && f(doc)),
            None => Arc::new(f),
        };
        Self {
            path: self.path,
            predicate: Some(predicate),
        }
    }

    /// Require the field at dotted `field` path to equal `value`.
    pub fn field_equals(self, field: impl Into<String>, value: FieldValue) -> Self {
        let field = field.into();
        self.with_predicate(move |doc| doc.field(&field) == Some(&value))
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// True if `doc` lives directly in this collection and passes the predicate.
    pub fn matches(&self, doc: &Document) -> bool {
        self.path.is_immediate_parent_of(doc.key().path())
            && self.predicate.as_ref().map_or(true, |p| p(doc))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("path", &self.path)
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Cache of remote documents tagged with the time they were read.
///
/// Safe to share across threads. Point operations rely on the engine's own
/// per-call isolation; the store adds no lock of its own.
pub struct RemoteDocumentStore {
    engine: Arc<dyn OrderedStore>,
    codec: Arc<dyn DocumentCodec>,
    index: Arc<dyn IndexManager>,
    metrics: Arc<StoreMetrics>,
    decode_workers: usize,
    parallel_decode_threshold: usize,
    reject_read_time_regression: bool,
}

impl RemoteDocumentStore {
    /// Build a store over explicit collaborators.
    pub fn new(
        engine: Arc<dyn OrderedStore>,
        codec: Arc<dyn DocumentCodec>,
        index: Arc<dyn IndexManager>,
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            codec,
            index,
            metrics: Arc::new(StoreMetrics::new()),
            decode_workers: config.decode_workers,
            parallel_decode_threshold: config.parallel_decode_threshold,
            reject_read_time_regression: config.reject_read_time_regression,
        })
    }

    /// Open the bundled engine at `config.data_dir` with the default codec
    /// and an in-memory collection parent index.
    pub fn open(config: Config) -> Result<Self> {
        let engine = ConcurrentEngine::open(config.clone())?;
        Self::new(
            Arc::new(engine),
            Arc::new(BincodeCodec::new()),
            Arc::new(MemoryIndexManager::new()),
            &config,
        )
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Store `document` as read at `read_time`, replacing any previous row.
    pub fn add(&self, document: &Document, read_time: ReadTime) -> Result<()> {
        if read_time.is_none() {
            return Err(RemnantError::InvalidArgument(format!(
                "cannot add {} with a read time of NONE",
                document.key()
            )));
        }
        let contents = encode_document(self.codec.as_ref(), document)?;
        let key = row_key(document.key());
        let row = StoreRow::new(read_time, contents).to_bytes()?;
        let (key_len, row_len) = (key.len(), row.len());

        if self.reject_read_time_regression {
            let check = |existing: Option<&Value>| -> Result<()> {
                let Some(existing) = existing else {
                    return Ok(());
                };
                let previous = self.parse_row(existing)?.read_time()?;
                if read_time < previous {
                    return Err(RemnantError::InvalidArgument(format!(
                        "read time {} for {} is older than stored {}",
                        read_time,
                        document.key(),
                        previous
                    )));
                }
                Ok(())
            };
            self.engine.put_if(key, row, &check)?;
        } else {
            self.engine.put(key, row)?;
        }
        self.metrics.record_add(key_len, row_len);

        let collection = document.key().collection_path();
        if let Err(e) = self.index.add_to_collection_parent_index(&collection) {
            log::warn!("Collection parent index update failed for '{}': {}", collection, e);
        }
        log::debug!("add {} at {}", document.key(), read_time);
        Ok(())
    }

    /// Delete the row for `key`. Removing an absent key is a no-op.
    pub fn remove(&self, key: &DocumentKey) -> Result<()> {
        self.metrics.record_remove();
        self.engine.delete(row_key(key))?;
        log::debug!("remove {}", key);
        Ok(())
    }

    /// Point lookup. A missing row yields `Document::Invalid`.
    pub fn get(&self, key: &DocumentKey) -> Result<Document> {
        self.metrics.record_get();
        match self.engine.get(&row_key(key))? {
            Some(bytes) => self.decode_row(&bytes, key),
            None => Ok(Document::invalid(key.clone())),
        }
    }

    /// Batched lookup with one range scan per distinct collection.
    ///
    /// Each scan covers only the key range spanned by that collection's
    /// requested ids.
    ///
    /// Every requested key is present in the result; keys with no row map to
    /// `Document::Invalid`.
    pub fn get_all<'a, I>(&self, keys: I) -> Result<DocumentMap>
    where
        I: IntoIterator<Item = &'a DocumentKey>,
    {
        let mut results = DocumentMap::new();
        let mut by_collection: BTreeMap<ResourcePath, HashSet<String>> = BTreeMap::new();
        for key in keys {
            by_collection
                .entry(key.collection_path())
                .or_default()
                .insert(key.document_id().to_string());
            results.insert(key.clone(), Document::invalid(key.clone()));
        }

        let mut rows_read = 0;
        for (collection, ids) in &by_collection {
            // Encoding preserves order, so the requested rows lie between the
            // smallest and largest requested row key.
            let requested: BTreeSet<Key> = ids
                .iter()
                .map(|id| child_key(collection, id.clone()).map(|k| row_key(&k)))
                .collect::<Result<_>>()?;
            let (Some(first), Some(last)) = (requested.first(), requested.last()) else {
                continue;
            };
            let prefix = collection_prefix(collection);
            for (raw_key, bytes) in self.engine.scan_range(first, last)? {
                rows_read += 1;
                if !requested.contains(&raw_key) {
                    continue;
                }
                let id = self.note_corruption(document_id_from_row_key(&raw_key, &prefix))?;
                let key = child_key(collection, id)?;
                let document = self.decode_row(&bytes, &key)?;
                results.insert(key, document);
            }
        }

        self.metrics.record_batch_get(rows_read);
        log::debug!(
            "get_all: {} keys across {} collections, {} rows read",
            results.len(),
            by_collection.len(),
            rows_read
        );
        Ok(results)
    }

    /// Found documents in `query`'s collection that match it, ordered by key.
    ///
    /// With `since_read_time` of `NONE` every row is considered; otherwise only
    /// rows read strictly after it. All-or-nothing: a corrupt row fails the scan.
    pub fn get_all_matching_query(
        &self,
        query: &Query,
        since_read_time: ReadTime,
    ) -> Result<DocumentMap> {
        self.get_all_matching_query_interruptible(query, since_read_time, &Interrupter::new())
    }

    /// Same as [`get_all_matching_query`](Self::get_all_matching_query), but the
    /// decode join gives up with `Interrupted` once `interrupter` fires.
    pub fn get_all_matching_query_interruptible(
        &self,
        query: &Query,
        since_read_time: ReadTime,
        interrupter: &Interrupter,
    ) -> Result<DocumentMap> {
        let prefix = collection_prefix(query.path());
        // The engine hands back the whole range at once, so the scan is
        // filtered up front and decoding starts once the row count is known.
        // That count decides between the pool and the calling thread.
        let mut pending = Vec::new();
        for (raw_key, bytes) in self.engine.scan_prefix(&prefix)? {
            let row = self.parse_row(&bytes)?;
            let read_time = self.note_corruption(row.read_time())?;
            if !since_read_time.is_none() && read_time <= since_read_time {
                continue;
            }
            let id = self.note_corruption(document_id_from_row_key(&raw_key, &prefix))?;
            pending.push((child_key(query.path(), id)?, row.contents, read_time));
        }
        self.metrics.record_scan(pending.len());

        let matches = Arc::new(Mutex::new(DocumentMap::new()));
        let background = pending.len() >= self.parallel_decode_threshold;
        let last = pending.len().saturating_sub(1);
        let mut pool = DecodePool::with_interrupter(self.decode_workers, interrupter.clone());

        for (i, (key, contents, read_time)) in pending.into_iter().enumerate() {
            let job = self.match_job(key, contents, read_time, query.clone(), Arc::clone(&matches));
            // The final row runs here; handing it off would only add latency.
            if background && i != last {
                self.metrics.record_background_decode();
                pool.submit(job);
            } else {
                pool.run_inline(job);
            }
        }
        pool.drain()?;
        drop(pool);

        let result = std::mem::take(&mut *matches.lock().unwrap_or_else(PoisonError::into_inner));
        log::debug!(
            "query {} since {}: {} matching documents",
            query.path(),
            since_read_time,
            result.len()
        );
        Ok(result)
    }

    /// Highest read time across all rows, or `NONE` for an empty store.
    pub fn get_latest_read_time(&self) -> Result<ReadTime> {
        let mut latest = ReadTime::NONE;
        for (_, bytes) in self.engine.scan_prefix(&table_prefix())? {
            let read_time = self.note_corruption(self.parse_row(&bytes)?.read_time())?;
            latest = latest.max(read_time);
        }
        Ok(latest)
    }

    fn match_job(
        &self,
        key: DocumentKey,
        contents: Vec<u8>,
        read_time: ReadTime,
        query: Query,
        matches: Arc<Mutex<DocumentMap>>,
    ) -> Job {
        let codec = Arc::clone(&self.codec);
        let metrics = Arc::clone(&self.metrics);
        Box::new(move || -> Result<()> {
            let document = decode_contents(codec.as_ref(), &metrics, &contents, read_time, &key)?;
            if document.is_found_document() && query.matches(&document) {
                matches
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, document);
            }
            Ok(())
        })
    }

    fn parse_row(&self, bytes: &[u8]) -> Result<StoreRow> {
        self.note_corruption(StoreRow::from_bytes(bytes))
    }

    fn decode_row(&self, bytes: &[u8], expected: &DocumentKey) -> Result<Document> {
        let row = self.parse_row(bytes)?;
        let read_time = self.note_corruption(row.read_time())?;
        decode_contents(
            self.codec.as_ref(),
            &self.metrics,
            &row.contents,
            read_time,
            expected,
        )
    }

    fn note_corruption<T>(&self, result: Result<T>) -> Result<T> {
        track_corruption(&self.metrics, result)
    }
}

fn track_corruption<T>(metrics: &StoreMetrics, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_corruption() {
            metrics.record_corrupt_record();
            log::error!("{}", e);
        }
    }
    result
}

/// Decode a payload and make sure it belongs to the row it was stored under.
fn decode_contents(
    codec: &dyn DocumentCodec,
    metrics: &StoreMetrics,
    contents: &[u8],
    read_time: ReadTime,
    expected: &DocumentKey,
) -> Result<Document> {
    let decoded = decode_document(codec, contents, read_time).and_then(|document| {
        if document.key() == expected {
            Ok(document)
        } else {
            Err(RemnantError::CorruptRecord(format!(
                "row {} holds a payload for {}",
                expected,
                document.key()
            )))
        }
    });
    track_corruption(metrics, decoded)
}

fn child_key(collection: &ResourcePath, id: String) -> Result<DocumentKey> {
    DocumentKey::from_path(collection.child(id))
        .map_err(|e| RemnantError::CorruptRecord(format!("row key: {}", e)))
}
