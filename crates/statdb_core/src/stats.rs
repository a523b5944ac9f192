//! Typed access to the reserved `awless` bucket.
//!
//! [`StatsDb`] is the handle a CLI keeps for its identity and usage state.
//! Opening one runs bootstrap, so the identity keys are always present on a
//! returned handle. Every typed call runs in its own transaction; use
//! [`StatsDb::store`] when several keys must change atomically.
//!
//! ```rust
//! use statdb_core::{Config, StaticIdentity, StatsDb, AWLESS_ID_KEY};
//!
//! let db = StatsDb::open_in_memory(&Config::default(), &StaticIdentity::new("u-1", "a-1")).unwrap();
//! assert_eq!(db.get_string(AWLESS_ID_KEY).unwrap().len(), 64);
//!
//! db.set_int("INSTANCE_COUNT", 5).unwrap();
//! assert_eq!(db.increment("INSTANCE_COUNT", 1).unwrap(), 6);
//! assert_eq!(db.get_int("MISSING").unwrap(), 0);
//! ```

use crate::bootstrap::{self, BootstrapReport, BootstrapState, IdentityProvider};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use crate::value::StoredValue;
use chrono::{DateTime, FixedOffset};
use statdb_storage::InMemoryBackend;
use std::path::Path;
use tracing::debug;

/// Name of the reserved bucket.
pub const AWLESS_BUCKET: &str = "awless";

/// Key of the anonymous installation id.
pub const AWLESS_ID_KEY: &str = "AWLESS_ID_KEY";

/// Key of the anonymized account id.
pub const AWLESS_AID_KEY: &str = "AWLESS_AID_KEY";

/// Identity and usage state of a CLI installation.
#[derive(Debug)]
pub struct StatsDb {
    store: Store,
    bootstrap: BootstrapReport,
}

impl StatsDb {
    /// Opens the store at `path` and bootstraps the identity keys.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Store::open`] or from bootstrap, including
    /// [`CoreError::IdentityUnavailable`]. On error the file lock is released.
    pub fn open(
        path: &Path,
        config: &Config,
        provider: &dyn IdentityProvider,
    ) -> CoreResult<Self> {
        let store = Store::open(path, config)?;
        Self::with_store(store, provider)
    }

    /// Opens an in-memory store and bootstraps it.
    ///
    /// # Errors
    ///
    /// Returns an error if bootstrap fails.
    pub fn open_in_memory(config: &Config, provider: &dyn IdentityProvider) -> CoreResult<Self> {
        let store = Store::open_with_backend(config.clone(), Box::new(InMemoryBackend::new()))?;
        Self::with_store(store, provider)
    }

    /// Bootstraps an already open store and wraps it.
    ///
    /// # Errors
    ///
    /// Returns an error if bootstrap fails.
    pub fn with_store(store: Store, provider: &dyn IdentityProvider) -> CoreResult<Self> {
        let bootstrap = bootstrap::bootstrap(&store, provider, &store.config().salt)?;
        Ok(Self { store, bootstrap })
    }

    /// Returns the raw value of `key`, empty if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] on a closed store.
    pub fn get_bytes(&self, key: &str) -> CoreResult<Vec<u8>> {
        self.store.view(|tx| {
            Ok(tx
                .bucket(AWLESS_BUCKET)
                .and_then(|b| b.get(key.as_bytes()))
                .map(<[u8]>::to_vec)
                .unwrap_or_default())
        })
    }

    /// Reads `key` as `T`, yielding the zero value if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Parse`] or [`CoreError::Decode`] if the stored
    /// value does not decode as `T`.
    pub fn get<T: StoredValue>(&self, key: &str) -> CoreResult<T> {
        let bytes = self.get_bytes(key)?;
        T::decode(&bytes).map_err(|e| CoreError::from_value(key, e))
    }

    /// Reads `key` as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Decode`] on invalid UTF-8.
    pub fn get_string(&self, key: &str) -> CoreResult<String> {
        self.get(key)
    }

    /// Reads `key` as a decimal integer, 0 if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Parse`] if the stored text is not an integer.
    pub fn get_int(&self, key: &str) -> CoreResult<i64> {
        self.get(key)
    }

    /// Reads `key` as a timestamp, the zero timestamp if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Decode`] on malformed timestamp bytes.
    pub fn get_time(&self, key: &str) -> CoreResult<DateTime<FixedOffset>> {
        self.get(key)
    }

    /// Stores raw bytes under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` is empty or the commit fails.
    pub fn set_bytes(&self, key: &str, value: &[u8]) -> CoreResult<()> {
        self.store.update(|tx| {
            tx.create_bucket_if_absent(AWLESS_BUCKET)?
                .put(key.as_bytes(), value)
        })
    }

    /// Stores `value` under `key` in the encoding of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the value cannot be encoded,
    /// or any error from the commit.
    pub fn set<T: StoredValue>(&self, key: &str, value: &T) -> CoreResult<()> {
        let bytes = value.encode().map_err(|e| {
            CoreError::invalid_argument(format!("{key}: not storable as {}: {e}", T::ENCODING))
        })?;
        self.set_bytes(key, &bytes)
    }

    /// Stores a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn set_string(&self, key: &str, value: &str) -> CoreResult<()> {
        self.set_bytes(key, value.as_bytes())
    }

    /// Stores an integer as decimal text.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn set_int(&self, key: &str, value: i64) -> CoreResult<()> {
        self.set(key, &value)
    }

    /// Stores a timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for a zone offset of exactly
    /// minus one minute.
    pub fn set_time(&self, key: &str, value: &DateTime<FixedOffset>) -> CoreResult<()> {
        self.set(key, value)
    }

    /// Adds `delta` to the integer counter at `key` and returns the result.
    ///
    /// The read and the write happen in one write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Parse`] if the current value is not an integer
    /// and [`CoreError::InvalidArgument`] on overflow.
    pub fn increment(&self, key: &str, delta: i64) -> CoreResult<i64> {
        self.store.update(|tx| {
            let mut bucket = tx.create_bucket_if_absent(AWLESS_BUCKET)?;
            let current = i64::decode(bucket.get(key.as_bytes()).unwrap_or_default())
                .map_err(|e| CoreError::from_value(key, e))?;
            let next = current.checked_add(delta).ok_or_else(|| {
                CoreError::invalid_argument(format!("{key}: {current} + {delta} overflows"))
            })?;
            bucket.put(key.as_bytes(), next.to_string().as_bytes())?;
            Ok(next)
        })
    }

    /// Lists the keys of the reserved bucket in order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] on a closed store.
    pub fn keys(&self) -> CoreResult<Vec<String>> {
        self.store.view(|tx| {
            Ok(tx
                .bucket(AWLESS_BUCKET)
                .map(|b| {
                    b.keys()
                        .map(|k| String::from_utf8_lossy(k).into_owned())
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    /// Deletes a whole bucket. Deleting a missing bucket succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn delete_bucket(&self, name: &str) -> CoreResult<()> {
        let existed = self.store.update(|tx| Ok(tx.delete_bucket(name)))?;
        debug!(bucket = name, existed, "bucket deleted");
        Ok(())
    }

    /// Deletes the reserved bucket, identity keys included.
    ///
    /// The next open bootstraps again.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn reset(&self) -> CoreResult<()> {
        self.delete_bucket(AWLESS_BUCKET)
    }

    /// Reports which identity keys are currently present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreClosed`] on a closed store.
    pub fn bootstrap_state(&self) -> CoreResult<BootstrapState> {
        bootstrap::bootstrap_state(&self.store)
    }

    /// Returns what bootstrap did when this handle was opened.
    #[must_use]
    pub fn bootstrap_report(&self) -> &BootstrapReport {
        &self.bootstrap
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Closes the store and releases the file lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> CoreResult<()> {
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{anonymous_id, StaticIdentity};
    use crate::value::is_zero_time;
    use chrono::TimeZone;

    fn db() -> StatsDb {
        StatsDb::open_in_memory(&Config::default(), &StaticIdentity::new("u-1", "a-1")).unwrap()
    }

    #[test]
    fn open_bootstraps_with_configured_salt() {
        let config = Config::default().salt("s");
        let db = StatsDb::open_in_memory(&config, &StaticIdentity::new("u-1", "a-1")).unwrap();

        assert_eq!(db.get_string(AWLESS_ID_KEY).unwrap(), anonymous_id("s", "u-1"));
        assert_eq!(db.get_string(AWLESS_AID_KEY).unwrap(), anonymous_id("s", "a-1"));
        assert_eq!(db.bootstrap_report().before, BootstrapState::Uninitialized);
    }

    #[test]
    fn absent_keys_read_as_zero_values() {
        let db = db();
        assert!(db.get_bytes("nope").unwrap().is_empty());
        assert_eq!(db.get_string("nope").unwrap(), "");
        assert_eq!(db.get_int("nope").unwrap(), 0);
        assert!(is_zero_time(&db.get_time("nope").unwrap()));
    }

    #[test]
    fn typed_round_trips() {
        let db = db();

        db.set_string("REGION", "eu-west-1").unwrap();
        db.set_int("COUNT", -12).unwrap();
        db.set_bytes("BLOB", &[0, 1, 2]).unwrap();
        let zone = FixedOffset::east_opt(3600).unwrap();
        let when = zone.with_ymd_and_hms(2017, 3, 1, 9, 30, 0).unwrap();
        db.set_time("SENT_AT", &when).unwrap();

        assert_eq!(db.get_string("REGION").unwrap(), "eu-west-1");
        assert_eq!(db.get_int("COUNT").unwrap(), -12);
        assert_eq!(db.get_bytes("COUNT").unwrap(), b"-12");
        assert_eq!(db.get_bytes("BLOB").unwrap(), vec![0, 1, 2]);
        assert_eq!(db.get_time("SENT_AT").unwrap(), when);
    }

    #[test]
    fn non_integer_value_is_parse_error() {
        let db = db();
        db.set_string("COUNT", "lots").unwrap();

        match db.get_int("COUNT") {
            Err(CoreError::Parse { key, value, .. }) => {
                assert_eq!(key, "COUNT");
                assert_eq!(value, "lots");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(matches!(
            db.increment("COUNT", 1),
            Err(CoreError::Parse { .. })
        ));
    }

    #[test]
    fn malformed_time_is_decode_error() {
        let db = db();
        db.set_bytes("SENT_AT", b"garbage").unwrap();
        assert!(matches!(
            db.get_time("SENT_AT"),
            Err(CoreError::Decode { .. })
        ));
    }

    #[test]
    fn increment_counts_from_zero() {
        let db = db();
        assert_eq!(db.increment("RUNS", 1).unwrap(), 1);
        assert_eq!(db.increment("RUNS", 4).unwrap(), 5);
        assert_eq!(db.get_int("RUNS").unwrap(), 5);

        db.set_int("RUNS", i64::MAX).unwrap();
        assert!(matches!(
            db.increment("RUNS", 1),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert_eq!(db.get_int("RUNS").unwrap(), i64::MAX);
    }

    #[test]
    fn keys_are_sorted() {
        let db = db();
        db.set_int("B", 1).unwrap();
        db.set_int("A", 1).unwrap();
        assert_eq!(
            db.keys().unwrap(),
            vec!["A", AWLESS_AID_KEY, AWLESS_ID_KEY, "B"]
        );
    }

    #[test]
    fn reset_clears_everything() {
        let db = db();
        db.set_int("RUNS", 3).unwrap();

        db.reset().unwrap();
        db.reset().unwrap();

        assert!(db.keys().unwrap().is_empty());
        assert_eq!(db.bootstrap_state().unwrap(), BootstrapState::Uninitialized);
        assert_eq!(db.get_int("RUNS").unwrap(), 0);
    }

    #[test]
    fn unrepresentable_offset_names_the_encoding() {
        let db = db();
        let zone = FixedOffset::west_opt(60).unwrap();
        let when = zone.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let err = db.set_time("SENT_AT", &when).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
        assert!(err.to_string().contains("not storable as time"), "{err}");
        assert_eq!(db.get_bytes("SENT_AT").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn empty_key_rejected_on_write() {
        let db = db();
        assert!(matches!(
            db.set_int("", 1),
            Err(CoreError::InvalidArgument { .. })
        ));
    }
}
