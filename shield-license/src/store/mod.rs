//! Secure persistent storage for the activation record.
//!
//! [`SecureStore`] is the narrow interface the engine consumes: small opaque
//! values addressed by symbolic [`StoreKey`]s. Implementations must be
//! synchronous from the caller's point of view; a platform whose secure
//! storage is asynchronous hides that inside its adapter.
//!
//! The record is always written through [`SecureStore::write_batch`], which
//! must apply all of its writes or none of them. A crash or refused write in
//! the middle of a save never leaves half a record behind.

mod file;
mod memory;
mod record;

pub use file::EncryptedFileStore;
pub use memory::MemoryStore;
pub use record::RecordStore;

use thiserror::Error;

/// Symbolic keys of the persisted activation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    ActivationStatus,
    ActivationDate,
    ExpiryDate,
    DeviceId,
    LicenseKey,
    LastServerCheck,
    LastKnownDate,
    GraceStart,
    ClockAnomalies,
    RetiredKeys,
}

impl StoreKey {
    /// Every key of the record.
    pub const ALL: [StoreKey; 10] = [
        StoreKey::DeviceId,
        StoreKey::ActivationDate,
        StoreKey::ExpiryDate,
        StoreKey::LicenseKey,
        StoreKey::LastServerCheck,
        StoreKey::LastKnownDate,
        StoreKey::GraceStart,
        StoreKey::ClockAnomalies,
        StoreKey::RetiredKeys,
        StoreKey::ActivationStatus,
    ];

    /// Stable storage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ActivationStatus => "shield_activation_status",
            Self::ActivationDate => "shield_activation_date",
            Self::ExpiryDate => "shield_expiry_date",
            Self::DeviceId => "shield_device_id",
            Self::LicenseKey => "shield_license_key",
            Self::LastServerCheck => "shield_last_server_check",
            Self::LastKnownDate => "shield_last_known_date",
            Self::GraceStart => "shield_grace_start",
            Self::ClockAnomalies => "shield_clock_anomalies",
            Self::RetiredKeys => "shield_retired_keys",
        }
    }
}

/// Errors from a secure store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A value failed authentication or could not be sealed.
    #[error("crypto error: {0}")]
    Crypto(#[from] shield_crypto::CryptoError),

    /// The store file could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value does not decode to the expected type.
    #[error("corrupt value for {key}: {reason}")]
    Corrupt { key: &'static str, reason: String },

    /// The backing store refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// One change inside a [`SecureStore::write_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreWrite<'a> {
    Set(StoreKey, &'a [u8]),
    Delete(StoreKey),
}

impl StoreWrite<'_> {
    #[must_use]
    pub fn key(&self) -> StoreKey {
        match self {
            Self::Set(key, _) | Self::Delete(key) => *key,
        }
    }
}

/// Key-value storage with confidentiality and integrity for small values.
pub trait SecureStore: Send + Sync {
    /// Reads a value; `None` when the key was never written or was deleted.
    fn get(&self, key: StoreKey) -> StoreResult<Option<Vec<u8>>>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: StoreKey, value: &[u8]) -> StoreResult<()>;

    /// Removes a value. Removing an absent key succeeds.
    fn delete(&self, key: StoreKey) -> StoreResult<()>;

    /// Applies every write, or none of them when an error is returned.
    fn write_batch(&self, writes: &[StoreWrite<'_>]) -> StoreResult<()>;
}

impl<S: SecureStore + ?Sized> SecureStore for std::sync::Arc<S> {
    fn get(&self, key: StoreKey) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: StoreKey, value: &[u8]) -> StoreResult<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: StoreKey) -> StoreResult<()> {
        (**self).delete(key)
    }

    fn write_batch(&self, writes: &[StoreWrite<'_>]) -> StoreResult<()> {
        (**self).write_batch(writes)
    }
}
