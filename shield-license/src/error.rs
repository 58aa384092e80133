//! Error types for the licensing module.

use thiserror::Error;

/// Licensing-specific errors.
///
/// Only [`LicenseError::StorageUnavailable`] (and [`LicenseError::Config`] at
/// construction time) ever escape [`crate::ActivationEngine::evaluate`]. The
/// remaining variants describe conditions the engine folds into state
/// transitions; they surface through the strict parsing API and in
/// diagnostic reason strings.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Invalid license key format.
    #[error("invalid license key format: {0}")]
    InvalidKeyFormat(String),

    /// Ed25519 signature verification failed.
    #[error("license key signature invalid")]
    InvalidSignature,

    /// Payload JSON is malformed or missing required fields.
    #[error("invalid license payload: {0}")]
    InvalidPayload(String),

    /// The key is bound to another device.
    #[error("license key is bound to device {bound}, this device is {actual}")]
    DeviceMismatch { bound: String, actual: String },

    /// The key's own term ended before it was presented.
    #[error("license key term ended on {0}")]
    KeyExpired(String),

    /// The key previously expired or was revoked on this installation.
    #[error("license key has been retired on this device")]
    KeyRetired,

    /// The device clock moved in a way that cannot be trusted.
    #[error("clock anomaly: {0}")]
    ClockAnomaly(String),

    /// Heartbeat server could not be reached.
    #[error("heartbeat unreachable: {0}")]
    HeartbeatUnreachable(String),

    /// License revoked by the heartbeat server.
    #[error("license has been revoked")]
    Revoked,

    /// The secure store could not be read or written.
    #[error("secure storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<crate::store::StoreError> for LicenseError {
    fn from(err: crate::store::StoreError) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
