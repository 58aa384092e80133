//! The key that unlocks an activation store.
//!
//! A host supplies one application secret. The store key is that secret run
//! through Argon2id with the store's own salt, after a fixed context prefix,
//! so the same secret used by the host for something else never yields the
//! same 256-bit key.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Store key length (ChaCha20 key size).
pub const KEY_SIZE: usize = 32;

/// Store salt length.
pub const SALT_SIZE: usize = 16;

/// Mixed in ahead of the secret.
const KDF_CONTEXT: &[u8] = b"shield-store-key/v1\0";

/// Key sealing the activation record at rest.
///
/// Held only in memory and wiped when dropped. `Debug` never prints it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SealingKey {
    bytes: [u8; KEY_SIZE],
}

impl SealingKey {
    /// Wraps key material the host already manages.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// A fresh random key, for hosts that keep the key in a platform keychain.
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealingKey([REDACTED])")
    }
}

/// Per-store salt. Written once next to the store file and never rotated,
/// since rotating it would orphan the sealed record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Salt {
    bytes: [u8; SALT_SIZE],
}

impl Salt {
    /// Salt for a store being created.
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self { bytes }
    }

    /// Salt read back from the salt file. A truncated or padded file is an
    /// error rather than a different key.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        <[u8; SALT_SIZE]>::try_from(bytes)
            .map(Self::from_bytes)
            .map_err(|_| CryptoError::InvalidSaltLength {
                expected: SALT_SIZE,
                actual: bytes.len(),
            })
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.bytes
    }
}

/// Argon2id costs for opening a store.
///
/// The key is derived once per engine start, so the default spends
/// 19 MiB and two passes on it.
#[derive(Clone, Debug)]
pub struct KdfParams {
    /// KiB.
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_cost: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Minimal costs for tests and throwaway stores.
    pub fn fast() -> Self {
        Self {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn argon2(&self) -> CryptoResult<Argon2<'static>> {
        let params = Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Derives the store key from the host's application secret.
pub fn derive_key(secret: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<SealingKey> {
    let mut input = Zeroizing::new(Vec::with_capacity(KDF_CONTEXT.len() + secret.len()));
    input.extend_from_slice(KDF_CONTEXT);
    input.extend_from_slice(secret.as_bytes());

    let mut key = SealingKey::from_bytes([0u8; KEY_SIZE]);
    params
        .argon2()?
        .hash_password_into(&input, salt.as_bytes(), &mut key.bytes)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Shorthand for [`SealingKey::random`].
pub fn generate_random_key() -> SealingKey {
    SealingKey::random()
}
