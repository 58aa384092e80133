//! Error types for the sealing layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while sealing or opening store values.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Sealing failed.
    #[error("seal failed: {0}")]
    Seal(String),

    /// Opening failed (wrong key, wrong slot, or tampered data).
    #[error("open failed: {0}")]
    Open(String),

    /// Salt bytes had the wrong length.
    #[error("invalid salt length: expected {expected}, got {actual}")]
    InvalidSaltLength { expected: usize, actual: usize },
}
