//! Value sealing using ChaCha20-Poly1305.
//!
//! The slot name is passed as associated data: it is authenticated but not
//! encrypted, and opening with a different slot name fails.

use crate::error::{CryptoError, CryptoResult};
use crate::key::SealingKey;
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A sealed value with the nonce needed to open it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedValue {
    /// The nonce used for sealing (unique per seal).
    pub nonce: [u8; NONCE_SIZE],
    /// The ciphertext, auth tag included.
    pub ciphertext: Vec<u8>,
}

impl SealedValue {
    /// Returns the total encoded size.
    pub fn len(&self) -> usize {
        NONCE_SIZE + self.ciphertext.len()
    }

    /// Returns true if the ciphertext is empty.
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Encodes as base64 of `nonce || ciphertext`.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(self.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        STANDARD.encode(&bytes)
    }

    /// Decodes from base64 of `nonce || ciphertext`.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Open(format!("invalid base64: {e}")))?;

        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Open("sealed value too short".to_string()));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
        let ciphertext = bytes[NONCE_SIZE..].to_vec();

        Ok(Self { nonce, ciphertext })
    }
}

/// Seals `plaintext` for the slot named `slot`.
pub fn seal(key: &SealingKey, slot: &str, plaintext: &[u8]) -> CryptoResult<SealedValue> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: slot.as_bytes(),
            },
        )
        .map_err(|e| CryptoError::Seal(e.to_string()))?;

    Ok(SealedValue {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Opens a value sealed for `slot`.
pub fn open(key: &SealingKey, slot: &str, sealed: &SealedValue) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(&sealed.nonce);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: sealed.ciphertext.as_ref(),
                aad: slot.as_bytes(),
            },
        )
        .map_err(|_| {
            CryptoError::Open(format!(
                "authentication failed for slot '{slot}' (wrong key or tampered data)"
            ))
        })
}

/// Seals bytes and returns the base64 encoding.
pub fn seal_string(key: &SealingKey, slot: &str, plaintext: &[u8]) -> CryptoResult<String> {
    Ok(seal(key, slot, plaintext)?.to_base64())
}

/// Opens a base64-encoded sealed value.
pub fn open_string(key: &SealingKey, slot: &str, encoded: &str) -> CryptoResult<Vec<u8>> {
    let sealed = SealedValue::from_base64(encoded)?;
    open(key, slot, &sealed)
}
