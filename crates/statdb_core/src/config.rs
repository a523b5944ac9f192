//! Store configuration.

use std::time::Duration;

/// Salt mixed into anonymized identifiers when none is configured.
pub const DEFAULT_SALT: &str = "statdb.anonymous-id.v1";

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long `open` waits for another holder to release the store lock.
    pub acquire_timeout: Duration,

    /// Pause between lock attempts while waiting.
    pub lock_retry_interval: Duration,

    /// Whether to fsync the log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Whether to create missing parent directories of the store file.
    pub create_dirs: bool,

    /// Permission bits for a newly created store file (Unix only).
    pub file_mode: u32,

    /// Compact the log at open once it grows past this many bytes.
    pub auto_compact_bytes: Option<u64>,

    /// Salt prepended to seeds before hashing them into anonymized ids.
    pub salt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(1),
            lock_retry_interval: Duration::from_millis(50),
            sync_on_commit: true,
            create_dirs: true,
            file_mode: 0o600,
            auto_compact_bytes: None,
            salt: DEFAULT_SALT.to_string(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lock acquisition timeout.
    #[must_use]
    pub const fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets the pause between lock attempts.
    #[must_use]
    pub const fn lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    /// Sets whether to fsync on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether to create missing parent directories.
    #[must_use]
    pub const fn create_dirs(mut self, value: bool) -> Self {
        self.create_dirs = value;
        self
    }

    /// Sets the permission bits used when creating the store file.
    #[must_use]
    pub const fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Enables compaction at open once the log exceeds `bytes`.
    #[must_use]
    pub const fn auto_compact_bytes(mut self, bytes: Option<u64>) -> Self {
        self.auto_compact_bytes = bytes;
        self
    }

    /// Sets the anonymization salt.
    #[must_use]
    pub fn salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }
}
