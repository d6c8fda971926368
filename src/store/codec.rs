//! REMNANT - Document Codec
//! Converts documents to and from their persisted bytes, and frames rows for the engine.
//!
//! ## Payload Format ([`BincodeCodec`])
//! ```text
//! [magic: 1 byte][format: 1 byte][bincode body: N bytes][crc32 over all previous bytes: 4 bytes (LE)]
//! ```
//! The read time is not part of the payload. It lives in the row and is
//! attached by [`decode_document`].

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::{RemnantError, Result};
use crate::types::{DocumentKey, ObjectValue, ReadTime, ResourcePath};

const PAYLOAD_MAGIC: u8 = 0xD7;
const PAYLOAD_FORMAT: u8 = 1;
const PAYLOAD_HEADER: usize = 2;
const PAYLOAD_TRAILER: usize = 4;

/// Serializer seam between in-memory documents and persisted bytes.
pub trait DocumentCodec: Send + Sync {
    /// Encode a found or deleted document. The read time is not encoded.
    fn encode(&self, document: &Document) -> Result<Vec<u8>>;

    /// Decode content only. The returned document carries `ReadTime::NONE`.
    fn decode(&self, bytes: &[u8]) -> Result<Document>;
}

/// Encode through `codec`, refusing documents the cache knows nothing about.
pub fn encode_document(codec: &dyn DocumentCodec, document: &Document) -> Result<Vec<u8>> {
    if !document.is_valid_document() {
        return Err(RemnantError::InvalidArgument(format!(
            "cannot encode invalid document {}",
            document.key()
        )));
    }
    codec.encode(document)
}

/// Decode `bytes` through `codec` and tag the result with `read_time`.
pub fn decode_document(
    codec: &dyn DocumentCodec,
    bytes: &[u8],
    read_time: ReadTime,
) -> Result<Document> {
    let document = codec.decode(bytes)?;
    if !document.is_valid_document() {
        return Err(RemnantError::CorruptRecord(format!(
            "payload for {} decoded to an invalid document",
            document.key()
        )));
    }
    Ok(document.with_read_time(read_time))
}

#[derive(Serialize, Deserialize)]
enum PersistedDocument {
    Found {
        path: ResourcePath,
        version: ReadTime,
        data: ObjectValue,
    },
    NoDocument {
        path: ResourcePath,
        version: ReadTime,
    },
}

/// Default codec: serde + bincode body with a CRC32 trailer.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl BincodeCodec {
    pub fn new() -> Self {
        Self
    }

    fn corrupt(msg: impl Into<String>) -> RemnantError {
        RemnantError::CorruptRecord(msg.into())
    }

    fn restore_key(path: ResourcePath) -> Result<DocumentKey> {
        let path = ResourcePath::from_segments(path.segments().iter().cloned())
            .map_err(|_| Self::corrupt("payload path has an empty segment"))?;
        DocumentKey::from_path(path).map_err(|e| Self::corrupt(e.to_string()))
    }

    fn restore_version(version: ReadTime) -> Result<ReadTime> {
        ReadTime::from_parts(version.seconds(), version.nanos())
            .map_err(|e| Self::corrupt(format!("payload version: {}", e)))
    }
}

impl DocumentCodec for BincodeCodec {
    fn encode(&self, document: &Document) -> Result<Vec<u8>> {
        let persisted = match document {
            Document::Found {
                key, version, data, ..
            } => PersistedDocument::Found {
                path: key.path().clone(),
                version: *version,
                data: data.clone(),
            },
            Document::Deleted { key, version, .. } => PersistedDocument::NoDocument {
                path: key.path().clone(),
                version: *version,
            },
            Document::Invalid { key } => {
                return Err(RemnantError::InvalidArgument(format!(
                    "cannot encode invalid document {}",
                    key
                )))
            }
        };

        let body = bincode::serialize(&persisted)
            .map_err(|e| RemnantError::InvalidArgument(format!("unencodable document: {}", e)))?;
        let mut buf = BytesMut::with_capacity(PAYLOAD_HEADER + body.len() + PAYLOAD_TRAILER);
        buf.put_u8(PAYLOAD_MAGIC);
        buf.put_u8(PAYLOAD_FORMAT);
        buf.put_slice(&body);
        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);
        Ok(buf.to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        if bytes.len() < PAYLOAD_HEADER + PAYLOAD_TRAILER {
            return Err(Self::corrupt(format!(
                "payload too short: {} bytes",
                bytes.len()
            )));
        }
        let (framed, mut trailer) = bytes.split_at(bytes.len() - PAYLOAD_TRAILER);
        if framed[0] != PAYLOAD_MAGIC {
            return Err(Self::corrupt(format!("bad payload magic 0x{:02x}", framed[0])));
        }
        if framed[1] != PAYLOAD_FORMAT {
            return Err(Self::corrupt(format!(
                "unsupported payload format {}",
                framed[1]
            )));
        }
        if crc32fast::hash(framed) != trailer.get_u32_le() {
            return Err(Self::corrupt("payload checksum mismatch"));
        }

        let persisted: PersistedDocument = bincode::deserialize(&framed[PAYLOAD_HEADER..])?;
        Ok(match persisted {
            PersistedDocument::Found {
                path,
                version,
                data,
            } => Document::found(
                Self::restore_key(path)?,
                Self::restore_version(version)?,
                data,
            ),
            PersistedDocument::NoDocument { path, version } => {
                Document::deleted(Self::restore_key(path)?, Self::restore_version(version)?)
            }
        })
    }
}

/// On-disk unit for one document: read-time columns plus the opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRow {
    pub read_time_seconds: i64,
    pub read_time_nanos: i32,
    pub contents: Vec<u8>,
}

impl StoreRow {
    pub fn new(read_time: ReadTime, contents: Vec<u8>) -> Self {
        Self {
            read_time_seconds: read_time.seconds(),
            read_time_nanos: read_time.nanos(),
            contents,
        }
    }

    /// The row's read time. A persisted `NONE` or out-of-range value is corrupt.
    pub fn read_time(&self) -> Result<ReadTime> {
        ReadTime::new(self.read_time_seconds, self.read_time_nanos)
            .map_err(|e| RemnantError::CorruptRecord(format!("row read time: {}", e)))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| RemnantError::InvalidArgument(format!("unencodable row: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;

    fn sample() -> Document {
        let mut data = ObjectValue::new();
        data.insert("name".to_string(), FieldValue::String("lobby".to_string()));
        data.insert("size".to_string(), FieldValue::Integer(12));
        Document::found(
            "rooms/1".parse().unwrap(),
            ReadTime::new(50, 7).unwrap(),
            data,
        )
    }

    #[test]
    fn test_found_document_keeps_content() {
        let codec = BincodeCodec::new();
        let bytes = encode_document(&codec, &sample()).unwrap();
        let read_time = ReadTime::new(100, 0).unwrap();
        let decoded = decode_document(&codec, &bytes, read_time).unwrap();

        assert_eq!(decoded, sample().with_read_time(read_time));
    }

    #[test]
    fn test_deleted_document() {
        let codec = BincodeCodec::new();
        let version = ReadTime::new(9, 0).unwrap();
        let tombstone = Document::deleted("rooms/2".parse().unwrap(), version);
        let bytes = codec.encode(&tombstone).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert!(decoded.is_no_document());
        assert_eq!(decoded.read_time(), ReadTime::NONE);
    }

    #[test]
    fn test_invalid_document_rejected() {
        let codec = BincodeCodec::new();
        let invalid = Document::invalid("rooms/3".parse().unwrap());
        assert!(matches!(
            encode_document(&codec, &invalid),
            Err(RemnantError::InvalidArgument(_))
        ));
        assert!(matches!(
            codec.encode(&invalid),
            Err(RemnantError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let codec = BincodeCodec::new();
        let bytes = codec.encode(&sample()).unwrap();
        for cut in [0, 3, bytes.len() / 2, bytes.len() - 1] {
            let err = codec.decode(&bytes[..cut]).unwrap_err();
            assert!(err.is_corruption(), "cut at {}: {:?}", cut, err);
        }
    }

    #[test]
    fn test_flipped_byte_is_corrupt() {
        let codec = BincodeCodec::new();
        let mut bytes = codec.encode(&sample()).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x55;
        assert!(codec.decode(&bytes).unwrap_err().is_corruption());
    }

    #[test]
    fn test_row_roundtrip_and_validation() {
        let row = StoreRow::new(ReadTime::new(200, 5).unwrap(), vec![1, 2, 3]);
        let parsed = StoreRow::from_bytes(&row.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, row);
        assert_eq!(parsed.read_time().unwrap(), ReadTime::new(200, 5).unwrap());

        let zero = StoreRow::new(ReadTime::NONE, vec![]);
        assert!(zero.read_time().unwrap_err().is_corruption());
        assert!(StoreRow::from_bytes(&[1, 2]).unwrap_err().is_corruption());
    }
}
