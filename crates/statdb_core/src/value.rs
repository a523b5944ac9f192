//! Typed value encodings.
//!
//! The byte store treats values as opaque. This module fixes how the typed
//! accessors turn strings, integers, timestamps and blobs into value bytes:
//!
//! | Encoding | Rust type | Stored bytes |
//! |----------|-----------|--------------|
//! | `Bytes`  | `Vec<u8>` | verbatim |
//! | `Str`    | `String`  | raw UTF-8 |
//! | `Int`    | `i64`     | base-10 ASCII, e.g. `"-12"` |
//! | `Time`   | `DateTime<FixedOffset>` | versioned big-endian binary |
//!
//! An empty value always decodes to the type's zero value, so a missing key
//! and an empty one read the same.
//!
//! ## Timestamp Format
//!
//! ```text
//! | version (1) | seconds since 0001-01-01 UTC, i64 (8) | nanos, i32 (4) | offset minutes, i16 (2) | [offset seconds, i8 (1)] |
//! ```
//!
//! All integers are big-endian. An offset of `-1` minutes marks UTC. Version
//! 2 adds the trailing seconds byte and is written only when the zone offset
//! is not a whole number of minutes.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use std::fmt;
use std::num::ParseIntError;
use thiserror::Error;

/// Seconds between 0001-01-01T00:00:00Z and the Unix epoch.
const UNIX_TO_INTERNAL: i64 = 62_135_596_800;

const TIME_VERSION_V1: u8 = 1;
const TIME_VERSION_V2: u8 = 2;
const TIME_V1_LEN: usize = 15;
const TIME_V2_LEN: usize = 16;

/// Offset minutes value that stands for UTC.
const UTC_MARKER: i16 = -1;

const ZERO_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1, 1, 1) {
    Some(date) => date,
    None => panic!("year 1 is within chrono's range"),
};

/// Errors converting between typed values and value bytes.
#[derive(Debug, Error)]
pub enum ValueError {
    /// Stored string is not UTF-8.
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Stored or supplied integer text is not base-10.
    #[error("invalid integer {text:?}: {source}")]
    Integer {
        /// The offending text.
        text: String,
        /// Underlying parse failure.
        #[source]
        source: ParseIntError,
    },

    /// Timestamp bytes or text are malformed, or the zone is unencodable.
    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    /// Supplied blob text is not hex.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// The closed set of value encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Opaque bytes.
    Bytes,
    /// UTF-8 string.
    Str,
    /// Decimal integer.
    Int,
    /// Binary timestamp.
    Time,
}

impl Encoding {
    /// Returns the lowercase name of the encoding.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bytes => "bytes",
            Self::Str => "string",
            Self::Int => "int",
            Self::Time => "time",
        }
    }

    /// Parses human-readable text into value bytes.
    ///
    /// Bytes are given as hex, times as RFC 3339.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not valid for this encoding.
    pub fn parse_text(self, text: &str) -> Result<Vec<u8>, ValueError> {
        match self {
            Self::Bytes => Ok(hex::decode(text)?),
            Self::Str => text.to_string().encode(),
            Self::Int => parse_int(text)?.encode(),
            Self::Time => DateTime::parse_from_rfc3339(text)
                .map_err(|e| ValueError::Timestamp(e.to_string()))?
                .encode(),
        }
    }

    /// Renders value bytes as human-readable text.
    ///
    /// Inverse of [`Encoding::parse_text`].
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` do not decode under this encoding.
    pub fn render(self, bytes: &[u8]) -> Result<String, ValueError> {
        match self {
            Self::Bytes => Ok(hex::encode(bytes)),
            Self::Str => String::decode(bytes),
            Self::Int => i64::decode(bytes).map(|v| v.to_string()),
            Self::Time => DateTime::<FixedOffset>::decode(bytes).map(|t| t.to_rfc3339()),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Rust type with a fixed value encoding.
pub trait StoredValue: Sized {
    /// The encoding used for this type.
    const ENCODING: Encoding;

    /// Encodes the value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value has no representation.
    fn encode(&self) -> Result<Vec<u8>, ValueError>;

    /// Decodes value bytes. Empty input yields the zero value.
    ///
    /// # Errors
    ///
    /// Returns an error if non-empty `bytes` are malformed.
    fn decode(bytes: &[u8]) -> Result<Self, ValueError>;
}

impl StoredValue for Vec<u8> {
    const ENCODING: Encoding = Encoding::Bytes;

    fn encode(&self) -> Result<Vec<u8>, ValueError> {
        Ok(self.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self, ValueError> {
        Ok(bytes.to_vec())
    }
}

impl StoredValue for String {
    const ENCODING: Encoding = Encoding::Str;

    fn encode(&self) -> Result<Vec<u8>, ValueError> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self, ValueError> {
        Ok(std::str::from_utf8(bytes)?.to_string())
    }
}

impl StoredValue for i64 {
    const ENCODING: Encoding = Encoding::Int;

    fn encode(&self) -> Result<Vec<u8>, ValueError> {
        Ok(self.to_string().into_bytes())
    }

    fn decode(bytes: &[u8]) -> Result<Self, ValueError> {
        if bytes.is_empty() {
            return Ok(0);
        }
        let text = std::str::from_utf8(bytes)?;
        parse_int(text)
    }
}

impl StoredValue for DateTime<FixedOffset> {
    const ENCODING: Encoding = Encoding::Time;

    fn encode(&self) -> Result<Vec<u8>, ValueError> {
        encode_time(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, ValueError> {
        if bytes.is_empty() {
            return Ok(zero_time());
        }
        decode_time(bytes)
    }
}

fn parse_int(text: &str) -> Result<i64, ValueError> {
    text.parse().map_err(|source| ValueError::Integer {
        text: text.to_string(),
        source,
    })
}

/// Returns the zero timestamp, `0001-01-01T00:00:00Z`.
#[must_use]
pub fn zero_time() -> DateTime<FixedOffset> {
    ZERO_DATE.and_time(NaiveTime::MIN).and_utc().fixed_offset()
}

/// Returns true if `time` is the zero timestamp.
#[must_use]
pub fn is_zero_time(time: &DateTime<FixedOffset>) -> bool {
    time.timestamp() == -UNIX_TO_INTERNAL && time.timestamp_subsec_nanos() == 0
}

/// Encodes a timestamp in the binary timestamp format.
///
/// A zero offset is written as UTC.
///
/// # Errors
///
/// Returns [`ValueError::Timestamp`] for an offset that truncates to exactly
/// -1 minute, which would be read back as UTC.
pub fn encode_time(time: &DateTime<FixedOffset>) -> Result<Vec<u8>, ValueError> {
    let offset = time.offset().local_minus_utc();

    let (version, offset_min, offset_sec) = if offset == 0 {
        (TIME_VERSION_V1, UTC_MARKER, 0_i8)
    } else {
        let minutes = offset / 60;
        if minutes == i32::from(UTC_MARKER) {
            return Err(ValueError::Timestamp(format!(
                "zone offset {offset}s cannot be encoded"
            )));
        }
        let minutes = i16::try_from(minutes)
            .map_err(|_| ValueError::Timestamp(format!("zone offset {offset}s out of range")))?;
        // |offset % 60| < 60, always fits
        let seconds = (offset % 60) as i8;
        let version = if seconds == 0 {
            TIME_VERSION_V1
        } else {
            TIME_VERSION_V2
        };
        (version, minutes, seconds)
    };

    let sec = time.timestamp() + UNIX_TO_INTERNAL;
    // chrono keeps leap-second nanos below 2e9
    let nsec = time.timestamp_subsec_nanos() as i32;

    let mut buf = Vec::with_capacity(TIME_V2_LEN);
    buf.push(version);
    buf.extend_from_slice(&sec.to_be_bytes());
    buf.extend_from_slice(&nsec.to_be_bytes());
    buf.extend_from_slice(&offset_min.to_be_bytes());
    if version == TIME_VERSION_V2 {
        buf.extend_from_slice(&offset_sec.to_be_bytes());
    }
    Ok(buf)
}

/// Decodes a timestamp from the binary timestamp format.
///
/// # Errors
///
/// Returns [`ValueError::Timestamp`] on an unknown version, a wrong length or
/// out-of-range fields.
pub fn decode_time(bytes: &[u8]) -> Result<DateTime<FixedOffset>, ValueError> {
    let Some(&version) = bytes.first() else {
        return Err(ValueError::Timestamp("no data".into()));
    };

    let expected_len = match version {
        TIME_VERSION_V1 => TIME_V1_LEN,
        TIME_VERSION_V2 => TIME_V2_LEN,
        other => {
            return Err(ValueError::Timestamp(format!("unsupported version {other}")));
        }
    };
    if bytes.len() != expected_len {
        return Err(ValueError::Timestamp(format!(
            "expected {expected_len} bytes for version {version}, got {}",
            bytes.len()
        )));
    }

    let sec = i64::from_be_bytes(fixed(&bytes[1..9]));
    let nsec = i32::from_be_bytes(fixed(&bytes[9..13]));
    let offset_min = i16::from_be_bytes(fixed(&bytes[13..15]));

    let mut offset = i32::from(offset_min) * 60;
    if version == TIME_VERSION_V2 {
        offset += i32::from(i8::from_be_bytes([bytes[15]]));
    }
    if offset == i32::from(UTC_MARKER) * 60 {
        offset = 0;
    }

    let nsec = u32::try_from(nsec)
        .map_err(|_| ValueError::Timestamp(format!("negative nanoseconds {nsec}")))?;
    let unix = sec
        .checked_sub(UNIX_TO_INTERNAL)
        .ok_or_else(|| ValueError::Timestamp(format!("seconds {sec} out of range")))?;
    let utc = DateTime::<Utc>::from_timestamp(unix, nsec)
        .ok_or_else(|| ValueError::Timestamp(format!("instant {sec}.{nsec:09} out of range")))?;
    let zone = FixedOffset::east_opt(offset)
        .ok_or_else(|| ValueError::Timestamp(format!("zone offset {offset}s out of range")))?;

    Ok(utc.with_timezone(&zone))
}

fn fixed<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::anonymous_id;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn empty_decodes_to_zero_values() {
        assert_eq!(Vec::<u8>::decode(b"").unwrap(), Vec::<u8>::new());
        assert_eq!(String::decode(b"").unwrap(), "");
        assert_eq!(i64::decode(b"").unwrap(), 0);
        assert!(is_zero_time(&DateTime::<FixedOffset>::decode(b"").unwrap()));
    }

    #[test]
    fn int_is_decimal_ascii() {
        assert_eq!((-12_i64).encode().unwrap(), b"-12");
        assert_eq!(i64::decode(b"42").unwrap(), 42);
    }

    #[test]
    fn non_numeric_int_fails() {
        let err = i64::decode(b"twelve").unwrap_err();
        assert!(matches!(err, ValueError::Integer { ref text, .. } if text == "twelve"));
    }

    #[test]
    fn invalid_utf8_fails() {
        assert!(matches!(
            String::decode(&[0xff, 0xfe]),
            Err(ValueError::Utf8(_))
        ));
    }

    #[test]
    fn zero_time_encodes_as_zero_seconds() {
        let bytes = encode_time(&zero_time()).unwrap();
        assert_eq!(bytes.len(), TIME_V1_LEN);
        assert_eq!(bytes[0], TIME_VERSION_V1);
        assert_eq!(&bytes[1..13], &[0u8; 12]);
        assert_eq!(&bytes[13..15], &[0xff, 0xff]);
        assert_eq!(zero_time().to_rfc3339(), "0001-01-01T00:00:00+00:00");
    }

    #[test]
    fn utc_time_layout() {
        let time = Utc
            .with_ymd_and_hms(1970, 1, 1, 0, 0, 1)
            .unwrap()
            .fixed_offset();
        let bytes = encode_time(&time).unwrap();

        let mut expected = vec![TIME_VERSION_V1];
        expected.extend_from_slice(&(UNIX_TO_INTERNAL + 1).to_be_bytes());
        expected.extend_from_slice(&0_i32.to_be_bytes());
        expected.extend_from_slice(&(-1_i16).to_be_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn offset_with_seconds_uses_v2() {
        let zone = FixedOffset::east_opt(5 * 3600 + 30 * 60 + 15).unwrap();
        let time = zone.with_ymd_and_hms(2017, 6, 1, 12, 0, 0).unwrap();

        let bytes = encode_time(&time).unwrap();
        assert_eq!(bytes.len(), TIME_V2_LEN);
        assert_eq!(bytes[0], TIME_VERSION_V2);

        let back = decode_time(&bytes).unwrap();
        assert_eq!(back, time);
        assert_eq!(back.offset(), time.offset());
    }

    #[test]
    fn negative_offset_round_trips() {
        let zone = FixedOffset::west_opt(7 * 3600).unwrap();
        let time = zone.with_ymd_and_hms(2016, 11, 3, 8, 15, 0).unwrap();
        let back = decode_time(&encode_time(&time).unwrap()).unwrap();
        assert_eq!(back.offset().local_minus_utc(), -7 * 3600);
        assert_eq!(back, time);
    }

    #[test]
    fn minus_one_minute_offset_rejected() {
        let zone = FixedOffset::west_opt(60).unwrap();
        let time = zone.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(encode_time(&time), Err(ValueError::Timestamp(_))));
    }

    #[test]
    fn malformed_time_rejected() {
        assert!(decode_time(&[3; 15]).is_err());
        assert!(decode_time(&[TIME_VERSION_V1; 10]).is_err());
        assert!(decode_time(&[TIME_VERSION_V2; 15]).is_err());
    }

    #[test]
    fn text_round_trip_per_encoding() {
        assert_eq!(Encoding::Int.parse_text("7").unwrap(), b"7");
        assert_eq!(Encoding::Bytes.render(&[0xde, 0xad]).unwrap(), "dead");
        assert_eq!(Encoding::Bytes.parse_text("dead").unwrap(), vec![0xde, 0xad]);

        let bytes = Encoding::Time.parse_text("2017-02-03T04:05:06+01:00").unwrap();
        assert_eq!(
            Encoding::Time.render(&bytes).unwrap(),
            "2017-02-03T04:05:06+01:00"
        );

        assert!(Encoding::Int.parse_text("x").is_err());
        assert!(Encoding::Time.parse_text("yesterday").is_err());
    }

    proptest! {
        #[test]
        fn string_round_trip(s in ".*") {
            prop_assert_eq!(String::decode(&s.encode().unwrap()).unwrap(), s);
        }

        #[test]
        fn int_round_trip(n in any::<i64>()) {
            prop_assert_eq!(i64::decode(&n.encode().unwrap()).unwrap(), n);
        }

        #[test]
        fn time_round_trip(
            secs in -62_135_596_800_i64..253_402_300_799,
            nanos in 0u32..1_000_000_000,
            offset_min in -1439_i32..1440,
        ) {
            prop_assume!(offset_min != -1);
            let zone = FixedOffset::east_opt(offset_min * 60).unwrap();
            let time = DateTime::<Utc>::from_timestamp(secs, nanos).unwrap().with_timezone(&zone);
            let back = decode_time(&encode_time(&time).unwrap()).unwrap();
            prop_assert_eq!(back, time);
            prop_assert_eq!(back.offset(), time.offset());
        }

        #[test]
        fn anonymous_id_is_deterministic(salt in ".*", seed in ".*") {
            let id = anonymous_id(&salt, &seed);
            prop_assert_eq!(&id, &anonymous_id(&salt, &seed));
            prop_assert_eq!(id.len(), 64);
        }

        #[test]
        fn distinct_seeds_give_distinct_ids(salt in ".*", a in ".*", b in ".*") {
            prop_assume!(a != b);
            prop_assert_ne!(anonymous_id(&salt, &a), anonymous_id(&salt, &b));
        }
    }
}
