//! First-run population of the identity keys.
//!
//! A fresh store has neither [`AWLESS_ID_KEY`] nor [`AWLESS_AID_KEY`]. On
//! open, each missing key is filled with the salted SHA-256 of a seed from an
//! [`IdentityProvider`]: the user id for the installation id, the account id
//! for the account id. All missing keys are written in one transaction, and a
//! key that is already set is never overwritten.

use crate::error::CoreResult;
use crate::stats::{AWLESS_AID_KEY, AWLESS_BUCKET, AWLESS_ID_KEY};
use crate::store::Store;
use crate::transaction::Transaction;
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt;
use tracing::{debug, info};

/// The identity collaborator failed to produce a seed.
#[derive(Debug)]
pub struct IdentityError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl IdentityError {
    /// Creates an error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for IdentityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Supplies the real identifiers that bootstrap anonymizes.
pub trait IdentityProvider {
    /// Returns the user identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier cannot be determined.
    fn user_id(&self) -> Result<String, IdentityError>;

    /// Returns the account identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier cannot be determined.
    fn account_id(&self) -> Result<String, IdentityError>;
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for &T {
    fn user_id(&self) -> Result<String, IdentityError> {
        (**self).user_id()
    }

    fn account_id(&self) -> Result<String, IdentityError> {
        (**self).account_id()
    }
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for Box<T> {
    fn user_id(&self) -> Result<String, IdentityError> {
        (**self).user_id()
    }

    fn account_id(&self) -> Result<String, IdentityError> {
        (**self).account_id()
    }
}

/// An identity provider returning fixed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity {
    user_id: String,
    account_id: String,
}

impl StaticIdentity {
    /// Creates a provider for the given identifiers.
    pub fn new(user_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            account_id: account_id.into(),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn user_id(&self) -> Result<String, IdentityError> {
        Ok(self.user_id.clone())
    }

    fn account_id(&self) -> Result<String, IdentityError> {
        Ok(self.account_id.clone())
    }
}

/// Derives an anonymized identifier: lowercase hex of `SHA-256(salt ‖ seed)`.
#[must_use]
pub fn anonymous_id(salt: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(seed.as_bytes());
    hex::encode(hasher.finalize())
}

/// How far bootstrap has progressed in a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Neither identity key is set.
    Uninitialized,
    /// Exactly one identity key is set.
    Partial,
    /// Both identity keys are set.
    Initialized,
}

impl BootstrapState {
    fn from_presence(has_id: bool, has_aid: bool) -> Self {
        match (has_id, has_aid) {
            (true, true) => Self::Initialized,
            (false, false) => Self::Uninitialized,
            _ => Self::Partial,
        }
    }
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Partial => "partial",
            Self::Initialized => "initialized",
        })
    }
}

/// What a bootstrap run found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    /// State found before bootstrap ran.
    pub before: BootstrapState,
    /// Keys that were written, in write order.
    pub written: Vec<&'static str>,
}

impl BootstrapReport {
    /// Returns true if anything was written.
    #[must_use]
    pub fn wrote_anything(&self) -> bool {
        !self.written.is_empty()
    }
}

fn is_set(tx: &dyn Transaction, key: &str) -> bool {
    tx.bucket(AWLESS_BUCKET)
        .and_then(|b| b.get(key.as_bytes()))
        .is_some_and(|v| !v.is_empty())
}

/// Reports which identity keys are present.
///
/// # Errors
///
/// Returns [`CoreError::StoreClosed`](crate::CoreError::StoreClosed) on a closed store.
pub fn bootstrap_state(store: &Store) -> CoreResult<BootstrapState> {
    store.view(|tx| {
        Ok(BootstrapState::from_presence(
            is_set(tx, AWLESS_ID_KEY),
            is_set(tx, AWLESS_AID_KEY),
        ))
    })
}

/// Fills every missing identity key.
///
/// Runs inside one write transaction. Seeds are requested only for the keys
/// that are missing.
///
/// # Errors
///
/// - [`CoreError::IdentityUnavailable`](crate::CoreError::IdentityUnavailable)
///   if the provider fails; nothing is written
/// - any error from committing the transaction
pub fn bootstrap(
    store: &Store,
    provider: &dyn IdentityProvider,
    salt: &str,
) -> CoreResult<BootstrapReport> {
    let mut tx = store.begin_write()?;

    let has_id = is_set(&tx, AWLESS_ID_KEY);
    let has_aid = is_set(&tx, AWLESS_AID_KEY);
    let before = BootstrapState::from_presence(has_id, has_aid);

    if before == BootstrapState::Initialized {
        debug!("identity keys present");
        return Ok(BootstrapReport {
            before,
            written: Vec::new(),
        });
    }

    let mut pending = Vec::with_capacity(2);
    if !has_id {
        pending.push((AWLESS_ID_KEY, anonymous_id(salt, &provider.user_id()?)));
    }
    if !has_aid {
        pending.push((AWLESS_AID_KEY, anonymous_id(salt, &provider.account_id()?)));
    }

    let mut bucket = tx.create_bucket_if_absent(AWLESS_BUCKET)?;
    for (key, value) in &pending {
        bucket.put(key.as_bytes(), value.as_bytes())?;
    }
    tx.commit()?;

    let written: Vec<&'static str> = pending.into_iter().map(|(key, _)| key).collect();
    info!(state = %before, keys = ?written, "identity bootstrapped");

    Ok(BootstrapReport { before, written })
}
