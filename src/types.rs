//! REMNANT - Core Type Definitions
//! Defines the paths, keys, timestamps and field values shared across the store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RemnantError, Result};

/// Key type for the underlying engine.
/// Using Vec<u8> allows arbitrary binary keys.
pub type Key = Vec<u8>;

/// Value type for the underlying engine.
/// Using Vec<u8> allows arbitrary binary values.
pub type Value = Vec<u8>;

/// A slash-separated hierarchical path, e.g. `rooms/1/messages`.
///
/// Ordering is lexicographic segment by segment, which is exactly what the
/// derived `Ord` on `Vec<String>` provides.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    /// The empty (root) path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(RemnantError::InvalidArgument(
                "path segments must be non-empty".to_string(),
            ));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the final segment, or `None` for the root path.
    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Returns a copy of this path with the last segment removed.
    pub fn pop_last(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    /// Returns a copy of this path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// True if `other` is exactly one segment below this path.
    pub fn is_immediate_parent_of(&self, other: &ResourcePath) -> bool {
        other.segments.len() == self.segments.len() + 1
            && other.segments.starts_with(&self.segments)
    }
}

impl FromStr for ResourcePath {
    type Err = RemnantError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        Self::from_segments(trimmed.split('/'))
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Identifies a single document: a path with an even, non-zero segment count.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    path: ResourcePath,
}

impl DocumentKey {
    pub fn from_path(path: ResourcePath) -> Result<Self> {
        if path.is_empty() || path.len() % 2 != 0 {
            return Err(RemnantError::InvalidArgument(format!(
                "'{}' is not a document path (needs an even number of segments)",
                path
            )));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// The parent collection of this document.
    pub fn collection_path(&self) -> ResourcePath {
        self.path.pop_last()
    }

    /// The final path segment.
    pub fn document_id(&self) -> &str {
        self.path.last_segment().unwrap_or_default()
    }
}

impl FromStr for DocumentKey {
    type Err = RemnantError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_path(s.parse()?)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

const NANOS_PER_SECOND: i32 = 1_000_000_000;

/// Server timestamp at which a document's state was observed.
///
/// `ReadTime::NONE` means "never read" and sorts before every real read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReadTime {
    seconds: i64,
    nanos: i32,
}

impl ReadTime {
    pub const NONE: ReadTime = ReadTime {
        seconds: 0,
        nanos: 0,
    };

    /// Create a real read time. Must be strictly after `NONE`.
    pub fn new(seconds: i64, nanos: i32) -> Result<Self> {
        let ts = Self::from_parts(seconds, nanos)?;
        if ts == Self::NONE {
            return Err(RemnantError::InvalidArgument(
                "read time must be after the epoch".to_string(),
            ));
        }
        Ok(ts)
    }

    /// Rebuild a read time from its persisted columns. Accepts `NONE`.
    pub fn from_parts(seconds: i64, nanos: i32) -> Result<Self> {
        if !(0..NANOS_PER_SECOND).contains(&nanos) {
            return Err(RemnantError::InvalidArgument(format!(
                "nanos out of range: {}",
                nanos
            )));
        }
        if seconds < 0 {
            return Err(RemnantError::InvalidArgument(format!(
                "seconds must not be negative: {}",
                seconds
            )));
        }
        Ok(Self { seconds, nanos })
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn nanos(&self) -> i32 {
        self.nanos
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl Default for ReadTime {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for ReadTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "NONE")
        } else {
            write!(f, "({}s, {}ns)", self.seconds, self.nanos)
        }
    }
}

/// A single field value inside a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<FieldValue>),
    Map(ObjectValue),
}

/// Document content: field name -> value, ordered by name.
pub type ObjectValue = BTreeMap<String, FieldValue>;

/// Look up a dotted field path (`a.b.c`) inside an object.
pub fn field_at<'a>(data: &'a ObjectValue, path: &str) -> Option<&'a FieldValue> {
    let mut parts = path.split('.');
    let mut current = data.get(parts.next()?)?;
    for part in parts {
        match current {
            FieldValue::Map(inner) => current = inner.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}
