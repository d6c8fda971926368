//! REMNANT - Path Key Encoding
//!
//! Encodes resource paths into byte keys that sort the same way the paths do.
//!
//! Each segment is written with `0x00` and `0x01` escaped, then terminated:
//! ```text
//! 0x00        -> 0x01 0x10
//! 0x01        -> 0x01 0x11
//! any other b -> b
//! end         -> 0x01 0x01
//! ```
//! The terminator sorts below every escape and every plain byte, so a
//! segment sorts before any longer segment it prefixes. Encoded output never
//! contains a raw `0x00`, which lets the row layout use it as a partition mark.

use crate::error::{RemnantError, Result};
use crate::types::{DocumentKey, ResourcePath};

const ESCAPE: u8 = 0x01;
const ENCODED_SEPARATOR: u8 = 0x01;
const ENCODED_NUL: u8 = 0x10;
const ENCODED_ESCAPE: u8 = 0x11;

/// Leading byte of every remote-document row key.
pub const REMOTE_DOCUMENTS_TABLE: u8 = 0x02;
/// Separates the collection part of a row key from the document id.
pub const PARTITION_MARK: u8 = 0x00;

fn encode_segment_into(segment: &str, out: &mut Vec<u8>) {
    for &b in segment.as_bytes() {
        match b {
            0x00 => out.extend_from_slice(&[ESCAPE, ENCODED_NUL]),
            ESCAPE => out.extend_from_slice(&[ESCAPE, ENCODED_ESCAPE]),
            _ => out.push(b),
        }
    }
    out.extend_from_slice(&[ESCAPE, ENCODED_SEPARATOR]);
}

/// Encode a single segment, terminator included.
pub fn encode_segment(segment: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(segment.len() + 2);
    encode_segment_into(segment, &mut out);
    out
}

/// Encode a full path. The root path encodes to the empty string.
pub fn encode_path(path: &ResourcePath) -> Vec<u8> {
    let mut out = Vec::new();
    for segment in path.segments() {
        encode_segment_into(segment, &mut out);
    }
    out
}

/// Decode bytes produced by [`encode_path`].
pub fn decode_path(encoded: &[u8]) -> Result<ResourcePath> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;
    while i < encoded.len() {
        let b = encoded[i];
        if b != ESCAPE {
            current.push(b);
            i += 1;
            continue;
        }
        let next = encoded.get(i + 1).copied().ok_or_else(|| {
            RemnantError::CorruptRecord("encoded path ends inside an escape".to_string())
        })?;
        match next {
            ENCODED_SEPARATOR => {
                let segment = String::from_utf8(std::mem::take(&mut current)).map_err(|_| {
                    RemnantError::CorruptRecord("encoded path segment is not UTF-8".to_string())
                })?;
                segments.push(segment);
            }
            ENCODED_NUL => current.push(0x00),
            ENCODED_ESCAPE => current.push(ESCAPE),
            other => {
                return Err(RemnantError::CorruptRecord(format!(
                    "invalid escape 0x{:02x} in encoded path",
                    other
                )))
            }
        }
        i += 2;
    }
    if !current.is_empty() {
        return Err(RemnantError::CorruptRecord(
            "encoded path is missing its final terminator".to_string(),
        ));
    }
    ResourcePath::from_segments(segments)
        .map_err(|_| RemnantError::CorruptRecord("encoded path has an empty segment".to_string()))
}

/// Prefix selecting exactly the rows that are direct children of `collection`.
pub fn collection_prefix(collection: &ResourcePath) -> Vec<u8> {
    let mut out = vec![REMOTE_DOCUMENTS_TABLE];
    out.extend_from_slice(&encode_path(collection));
    out.push(PARTITION_MARK);
    out
}

/// Prefix covering every remote-document row.
pub fn table_prefix() -> Vec<u8> {
    vec![REMOTE_DOCUMENTS_TABLE]
}

/// Engine key for a document: `table ++ encode(collection) ++ mark ++ encode(id)`.
pub fn row_key(key: &DocumentKey) -> Vec<u8> {
    let mut out = collection_prefix(&key.collection_path());
    encode_segment_into(key.document_id(), &mut out);
    out
}

/// Read the document id back out of a row key found under `prefix`.
pub fn document_id_from_row_key(row_key: &[u8], prefix: &[u8]) -> Result<String> {
    let suffix = row_key.strip_prefix(prefix).ok_or_else(|| {
        RemnantError::CorruptRecord("row key is outside the scanned collection".to_string())
    })?;
    let path = decode_path(suffix)?;
    match path.segments() {
        [id] => Ok(id.clone()),
        _ => Err(RemnantError::CorruptRecord(format!(
            "row key holds {} id segments, expected 1",
            path.len()
        ))),
    }
}
