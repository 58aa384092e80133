//! At-rest sealing for the Shield activation store.
//!
//! A sealed value is ChaCha20-Poly1305 ciphertext with a slot label bound in
//! as associated data: a value sealed under one label never opens under
//! another. The activation store seals its entire entry map under a single
//! label, so no individual entry can be edited, dropped, or replaced.
//!
//! The store key is derived with Argon2id from an application secret and a
//! per-store random salt.

mod cipher;
mod error;
mod key;

pub use cipher::{open, open_string, seal, seal_string, SealedValue, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, generate_random_key, KdfParams, Salt, SealingKey, KEY_SIZE, SALT_SIZE};
