//! REMNANT - Document Model
//! A cached document is exactly one of: found, deleted (tombstone), or invalid (unknown).

use crate::types::{field_at, DocumentKey, FieldValue, ObjectValue, ReadTime};

/// A document as seen by the cache.
///
/// `version` is the server commit version carried in the payload.
/// `read_time` is when the cache observed that state; it comes from the stored row.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// The document exists and has content.
    Found {
        key: DocumentKey,
        version: ReadTime,
        data: ObjectValue,
        read_time: ReadTime,
    },
    /// The document is known to be deleted as of `read_time`.
    Deleted {
        key: DocumentKey,
        version: ReadTime,
        read_time: ReadTime,
    },
    /// The cache holds no information about this key.
    Invalid { key: DocumentKey },
}

impl Document {
    /// A found document with no read time attached yet.
    pub fn found(key: DocumentKey, version: ReadTime, data: ObjectValue) -> Self {
        Document::Found {
            key,
            version,
            data,
            read_time: ReadTime::NONE,
        }
    }

    /// A tombstone with no read time attached yet.
    pub fn deleted(key: DocumentKey, version: ReadTime) -> Self {
        Document::Deleted {
            key,
            version,
            read_time: ReadTime::NONE,
        }
    }

    pub fn invalid(key: DocumentKey) -> Self {
        Document::Invalid { key }
    }

    pub fn key(&self) -> &DocumentKey {
        match self {
            Document::Found { key, .. }
            | Document::Deleted { key, .. }
            | Document::Invalid { key } => key,
        }
    }

    /// Read time of a found or deleted document, `NONE` for invalid.
    pub fn read_time(&self) -> ReadTime {
        match self {
            Document::Found { read_time, .. } | Document::Deleted { read_time, .. } => *read_time,
            Document::Invalid { .. } => ReadTime::NONE,
        }
    }

    pub fn version(&self) -> ReadTime {
        match self {
            Document::Found { version, .. } | Document::Deleted { version, .. } => *version,
            Document::Invalid { .. } => ReadTime::NONE,
        }
    }

    pub fn data(&self) -> Option<&ObjectValue> {
        match self {
            Document::Found { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Field lookup by dotted path. `None` unless the document is found.
    pub fn field(&self, path: &str) -> Option<&FieldValue> {
        self.data().and_then(|data| field_at(data, path))
    }

    /// Re-tag with a read time. Invalid documents carry none and are returned unchanged.
    pub fn with_read_time(self, read_time: ReadTime) -> Self {
        match self {
            Document::Found {
                key, version, data, ..
            } => Document::Found {
                key,
                version,
                data,
                read_time,
            },
            Document::Deleted { key, version, .. } => Document::Deleted {
                key,
                version,
                read_time,
            },
            invalid @ Document::Invalid { .. } => invalid,
        }
    }

    pub fn is_found_document(&self) -> bool {
        matches!(self, Document::Found { .. })
    }

    pub fn is_no_document(&self) -> bool {
        matches!(self, Document::Deleted { .. })
    }

    /// True for found and deleted documents.
    pub fn is_valid_document(&self) -> bool {
        !matches!(self, Document::Invalid { .. })
    }
}
