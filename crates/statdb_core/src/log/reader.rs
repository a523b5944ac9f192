//! Commit log scanning for recovery.

use crate::error::{CoreError, CoreResult};
use crate::log::record::{
    compute_crc32, LogRecord, RecordType, CRC_SIZE, HEADER_FIELDS_SIZE, HEADER_SIZE, LOG_MAGIC,
    LOG_VERSION,
};

/// Result of scanning a commit log.
#[derive(Debug, Default)]
pub struct LogScan {
    /// Complete records in log order.
    pub records: Vec<LogRecord>,
    /// Number of bytes covered by complete records.
    pub valid_len: u64,
    /// Bytes after `valid_len` belonging to a record that was never finished.
    pub torn_bytes: u64,
}

impl LogScan {
    /// Returns true if the log ends in a partially written record.
    #[must_use]
    pub fn is_torn(&self) -> bool {
        self.torn_bytes > 0
    }
}

/// Parses every complete record in `data`.
///
/// A record cut short by a crash ends the scan cleanly and is reported
/// through [`LogScan::torn_bytes`]. A tail counts as torn only if it is a
/// header prefix starting with the magic, or an intact header whose payload
/// runs past the end of the data. Anything else is fatal.
///
/// # Errors
///
/// - [`CoreError::ChecksumMismatch`] if a complete record fails its CRC
/// - [`CoreError::Corrupted`] on bad magic, a damaged header, unknown type,
///   a future format version, or an undecodable payload
pub fn scan(data: &[u8]) -> CoreResult<LogScan> {
    let mut scan = LogScan::default();
    let mut pos = 0usize;

    while pos < data.len() {
        let remaining = &data[pos..];

        let magic_len = remaining.len().min(LOG_MAGIC.len());
        if remaining[..magic_len] != LOG_MAGIC[..magic_len] {
            return Err(CoreError::corrupted(format!("invalid record magic at offset {pos}")));
        }
        if remaining.len() < HEADER_SIZE {
            break;
        }

        let fields = &remaining[..HEADER_FIELDS_SIZE];
        let mut stored = [0u8; CRC_SIZE];
        stored.copy_from_slice(&remaining[HEADER_FIELDS_SIZE..HEADER_SIZE]);
        if u32::from_le_bytes(stored) != compute_crc32(fields) {
            return Err(CoreError::corrupted(format!(
                "record header checksum mismatch at offset {pos}"
            )));
        }

        let version = u16::from_le_bytes([fields[4], fields[5]]);
        if version > LOG_VERSION {
            return Err(CoreError::corrupted(format!(
                "unsupported log version {version} at offset {pos}"
            )));
        }

        let record_type = RecordType::from_byte(fields[6]).ok_or_else(|| {
            CoreError::corrupted(format!("unknown record type {} at offset {pos}", fields[6]))
        })?;

        let len = u32::from_le_bytes([fields[7], fields[8], fields[9], fields[10]]) as usize;
        let total = HEADER_SIZE + len + CRC_SIZE;
        if remaining.len() < total {
            break;
        }

        let body = &remaining[..HEADER_SIZE + len];
        stored.copy_from_slice(&remaining[HEADER_SIZE + len..total]);
        let expected = u32::from_le_bytes(stored);
        let actual = compute_crc32(body);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch {
                offset: pos as u64,
                expected,
                actual,
            });
        }

        let record = LogRecord::decode_payload(record_type, &body[HEADER_SIZE..])?;
        scan.records.push(record);
        pos += total;
    }

    scan.valid_len = pos as u64;
    scan.torn_bytes = (data.len() - pos) as u64;
    Ok(scan)
}
