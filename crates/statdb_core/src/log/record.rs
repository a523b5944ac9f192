//! Commit log record types and serialization.

use crate::bucket::Records;
use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;
use std::collections::BTreeMap;

/// Magic bytes opening every commit log record.
pub const LOG_MAGIC: [u8; 4] = *b"SDBL";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// Header fields covered by the header checksum: magic (4) + version (2) +
/// type (1) + length (4).
pub const HEADER_FIELDS_SIZE: usize = 11;

/// Envelope header: the header fields followed by their CRC32 (4).
pub const HEADER_SIZE: usize = HEADER_FIELDS_SIZE + CRC_SIZE;

/// Trailing CRC32 size.
pub const CRC_SIZE: usize = 4;

/// Type of a commit log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// The operations of one committed write transaction.
    Commit = 1,
    /// The full store contents, written by compaction.
    Snapshot = 2,
}

impl RecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Commit),
            2 => Some(Self::Snapshot),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A single mutation inside a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// A bucket came into existence.
    CreateBucket {
        /// Bucket name.
        bucket: String,
    },
    /// A bucket and all of its records were removed.
    DeleteBucket {
        /// Bucket name.
        bucket: String,
    },
    /// A key was inserted or overwritten.
    Put {
        /// Bucket name.
        bucket: String,
        /// Record key.
        key: Vec<u8>,
        /// Record value.
        value: Vec<u8>,
    },
    /// A key was removed.
    Delete {
        /// Bucket name.
        bucket: String,
        /// Record key.
        key: Vec<u8>,
    },
}

impl Op {
    const CREATE_BUCKET: u8 = 1;
    const DELETE_BUCKET: u8 = 2;
    const PUT: u8 = 3;
    const DELETE: u8 = 4;

    fn encode_into(&self, buf: &mut Vec<u8>) -> CoreResult<()> {
        match self {
            Self::CreateBucket { bucket } => {
                buf.push(Self::CREATE_BUCKET);
                put_bytes(buf, bucket.as_bytes())?;
            }
            Self::DeleteBucket { bucket } => {
                buf.push(Self::DELETE_BUCKET);
                put_bytes(buf, bucket.as_bytes())?;
            }
            Self::Put { bucket, key, value } => {
                buf.push(Self::PUT);
                put_bytes(buf, bucket.as_bytes())?;
                put_bytes(buf, key)?;
                put_bytes(buf, value)?;
            }
            Self::Delete { bucket, key } => {
                buf.push(Self::DELETE);
                put_bytes(buf, bucket.as_bytes())?;
                put_bytes(buf, key)?;
            }
        }
        Ok(())
    }

    fn decode_from(reader: &mut PayloadReader<'_>) -> CoreResult<Self> {
        let tag = reader.u8()?;
        let bucket = reader.string()?;
        match tag {
            Self::CREATE_BUCKET => Ok(Self::CreateBucket { bucket }),
            Self::DELETE_BUCKET => Ok(Self::DeleteBucket { bucket }),
            Self::PUT => Ok(Self::Put {
                bucket,
                key: reader.bytes()?,
                value: reader.bytes()?,
            }),
            Self::DELETE => Ok(Self::Delete {
                bucket,
                key: reader.bytes()?,
            }),
            other => Err(CoreError::corrupted(format!("unknown operation tag {other}"))),
        }
    }
}

/// A record in the commit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// One committed write transaction.
    Commit {
        /// Sequence number assigned to the commit.
        sequence: SequenceNumber,
        /// Operations in the order they were performed.
        ops: Vec<Op>,
    },
    /// Complete store contents as of `sequence`.
    Snapshot {
        /// Sequence number the snapshot reflects.
        sequence: SequenceNumber,
        /// Every bucket with its records.
        buckets: BTreeMap<String, Records>,
    },
}

impl LogRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Commit { .. } => RecordType::Commit,
            Self::Snapshot { .. } => RecordType::Snapshot,
        }
    }

    /// Returns the sequence number carried by the record.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        match self {
            Self::Commit { sequence, .. } | Self::Snapshot { sequence, .. } => *sequence,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// Returns an error if a name, key or value exceeds the 4 GiB length field.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();

        match self {
            Self::Commit { sequence, ops } => {
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
                put_len(&mut buf, ops.len())?;
                for op in ops {
                    op.encode_into(&mut buf)?;
                }
            }
            Self::Snapshot { sequence, buckets } => {
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
                put_len(&mut buf, buckets.len())?;
                for (name, records) in buckets {
                    put_bytes(&mut buf, name.as_bytes())?;
                    put_len(&mut buf, records.len())?;
                    for (key, value) in records {
                        put_bytes(&mut buf, key)?;
                        put_bytes(&mut buf, value)?;
                    }
                }
            }
        }

        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corrupted`] if the payload is truncated, carries
    /// trailing bytes, or contains an unknown operation.
    pub fn decode_payload(record_type: RecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut reader = PayloadReader::new(payload);
        let sequence = SequenceNumber::new(reader.u64()?);

        let record = match record_type {
            RecordType::Commit => {
                let count = reader.u32()?;
                let mut ops = Vec::new();
                for _ in 0..count {
                    ops.push(Op::decode_from(&mut reader)?);
                }
                Self::Commit { sequence, ops }
            }
            RecordType::Snapshot => {
                let bucket_count = reader.u32()?;
                let mut buckets = BTreeMap::new();
                for _ in 0..bucket_count {
                    let name = reader.string()?;
                    let record_count = reader.u32()?;
                    let mut records = Records::new();
                    for _ in 0..record_count {
                        let key = reader.bytes()?;
                        let value = reader.bytes()?;
                        records.insert(key, value);
                    }
                    buckets.insert(name, records);
                }
                Self::Snapshot { sequence, buckets }
            }
        };

        reader.finish(record_type)?;
        Ok(record)
    }

    /// Serializes the record with its envelope and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_argument("commit too large for one log record"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&LOG_MAGIC);
        data.extend_from_slice(&LOG_VERSION.to_le_bytes());
        data.push(self.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        let header_crc = compute_crc32(&data);
        data.extend_from_slice(&header_crc.to_le_bytes());
        data.extend_from_slice(&payload);

        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }
}

fn put_len(buf: &mut Vec<u8>, len: usize) -> CoreResult<()> {
    let len = u32::try_from(len)
        .map_err(|_| CoreError::invalid_argument(format!("length {len} exceeds u32 range")))?;
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> CoreResult<()> {
    put_len(buf, bytes.len())?;
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Bounds-checked reader over a record payload.
struct PayloadReader<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, pos: 0 }
    }

    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.payload.len())
            .ok_or_else(|| CoreError::corrupted("unexpected end of record payload"))?;
        let slice = &self.payload[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn bytes(&mut self) -> CoreResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> CoreResult<String> {
        String::from_utf8(self.bytes()?)
            .map_err(|_| CoreError::corrupted("bucket name is not valid UTF-8"))
    }

    fn finish(&self, record_type: RecordType) -> CoreResult<()> {
        if self.pos == self.payload.len() {
            Ok(())
        } else {
            Err(CoreError::corrupted(format!(
                "trailing bytes in {record_type:?} record: used {}, payload {}",
                self.pos,
                self.payload.len()
            )))
        }
    }
}

/// Computes CRC32 checksum (IEEE polynomial).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_commit() -> LogRecord {
        LogRecord::Commit {
            sequence: SequenceNumber::new(7),
            ops: vec![
                Op::CreateBucket {
                    bucket: "awless".into(),
                },
                Op::Put {
                    bucket: "awless".into(),
                    key: b"counter".to_vec(),
                    value: b"5".to_vec(),
                },
                Op::Delete {
                    bucket: "awless".into(),
                    key: b"stale".to_vec(),
                },
                Op::DeleteBucket {
                    bucket: "scratch".into(),
                },
            ],
        }
    }

    #[test]
    fn commit_record_roundtrip() {
        let record = sample_commit();
        let payload = record.encode_payload().unwrap();
        let decoded = LogRecord::decode_payload(RecordType::Commit, &payload).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn snapshot_keeps_empty_buckets() {
        let mut buckets = BTreeMap::new();
        buckets.insert("empty".to_string(), Records::new());
        let mut records = Records::new();
        records.insert(b"k".to_vec(), Vec::new());
        buckets.insert("awless".to_string(), records);

        let record = LogRecord::Snapshot {
            sequence: SequenceNumber::new(3),
            buckets,
        };
        let payload = record.encode_payload().unwrap();
        let decoded = LogRecord::decode_payload(RecordType::Snapshot, &payload).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn truncated_payload_is_corruption() {
        let payload = sample_commit().encode_payload().unwrap();
        let result = LogRecord::decode_payload(RecordType::Commit, &payload[..payload.len() - 1]);
        assert!(matches!(result, Err(CoreError::Corrupted { .. })));
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let mut payload = sample_commit().encode_payload().unwrap();
        payload.push(0);
        let result = LogRecord::decode_payload(RecordType::Commit, &payload);
        assert!(matches!(result, Err(CoreError::Corrupted { .. })));
    }

    #[test]
    fn envelope_layout() {
        let data = sample_commit().encode().unwrap();
        assert_eq!(&data[0..4], &LOG_MAGIC);
        assert_eq!(u16::from_le_bytes([data[4], data[5]]), LOG_VERSION);
        assert_eq!(data[6], RecordType::Commit.as_byte());

        let len = u32::from_le_bytes([data[7], data[8], data[9], data[10]]) as usize;
        assert_eq!(data.len(), HEADER_SIZE + len + CRC_SIZE);

        let header_crc =
            u32::from_le_bytes(data[HEADER_FIELDS_SIZE..HEADER_SIZE].try_into().unwrap());
        assert_eq!(header_crc, compute_crc32(&data[..HEADER_FIELDS_SIZE]));

        let body_end = data.len() - CRC_SIZE;
        let stored = u32::from_le_bytes(data[body_end..].try_into().unwrap());
        assert_eq!(stored, compute_crc32(&data[..body_end]));
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
