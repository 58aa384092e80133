//! Encrypted single-file store.
//!
//! Layout inside the store directory:
//!
//! - `shield.salt`: 16 random bytes, the Argon2id salt for the store key
//! - `shield.store`: JSON object `{ "version": 2, "sealed": "<base64>" }`
//!
//! `sealed` is the whole entry map (storage name to base64 value) as one
//! ChaCha20-Poly1305 ciphertext. Editing, removing, or swapping any entry
//! needs the key; a file changed without it fails to open as a whole.
//! Every mutation rewrites the file through a temp file and a rename, so a
//! batch lands completely or not at all.

use super::{SecureStore, StoreError, StoreKey, StoreResult, StoreWrite};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use shield_crypto::{derive_key, open_string, seal_string, KdfParams, Salt, SealingKey};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

const STORE_FILE: &str = "shield.store";
const SALT_FILE: &str = "shield.salt";
const FORMAT_VERSION: u32 = 2;

/// Associated data of the sealed entry map.
const SEALED_SLOT: &str = "shield.store/entries";

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    sealed: String,
}

type Entries = BTreeMap<String, String>;

/// A [`SecureStore`] persisted as one sealed JSON file.
pub struct EncryptedFileStore {
    path: PathBuf,
    key: SealingKey,
    io_lock: Mutex<()>,
}

impl std::fmt::Debug for EncryptedFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl EncryptedFileStore {
    /// Opens (or creates) the store in `dir`, deriving the key from `secret`.
    pub fn open(dir: &Path, secret: &str) -> StoreResult<Self> {
        Self::open_with_params(dir, secret, &KdfParams::default())
    }

    /// Like [`Self::open`] with explicit Argon2id costs.
    pub fn open_with_params(dir: &Path, secret: &str, params: &KdfParams) -> StoreResult<Self> {
        if secret.is_empty() {
            return Err(StoreError::Unavailable("store secret must not be empty".into()));
        }
        fs::create_dir_all(dir)?;
        let salt = load_or_create_salt(&dir.join(SALT_FILE))?;
        let key = derive_key(secret, &salt, params)?;
        debug!(dir = %dir.display(), "opened encrypted store");
        Ok(Self::with_key(dir, key))
    }

    /// Uses an already derived key. The directory must exist.
    #[must_use]
    pub fn with_key(dir: &Path, key: SealingKey) -> Self {
        Self {
            path: dir.join(STORE_FILE),
            key,
            io_lock: Mutex::new(()),
        }
    }

    /// Path of the sealed store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> StoreResult<Entries> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };
        let file: StoreFile = serde_json::from_slice(&bytes)?;
        if file.version != FORMAT_VERSION {
            return Err(StoreError::Unavailable(format!(
                "unsupported store version {}",
                file.version
            )));
        }
        let plain = open_string(&self.key, SEALED_SLOT, &file.sealed).inspect_err(|e| {
            warn!(path = %self.path.display(), error = %e, "store file failed to open");
        })?;
        Ok(serde_json::from_slice(&plain)?)
    }

    fn write_entries(&self, entries: &Entries) -> StoreResult<()> {
        let plain = serde_json::to_vec(entries)?;
        let file = StoreFile {
            version: FORMAT_VERSION,
            sealed: seal_string(&self.key, SEALED_SLOT, &plain)?,
        };
        let json = serde_json::to_vec_pretty(&file)?;

        let tmp = self.path.with_extension("store.tmp");
        {
            let mut out = fs::File::create(&tmp)?;
            out.write_all(&json)?;
            out.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Read-modify-write of the whole entry map under the I/O lock.
    fn update(&self, apply: impl FnOnce(&mut Entries) -> bool) -> StoreResult<()> {
        let _guard = self.guard()?;
        let mut entries = self.read_entries()?;
        if apply(&mut entries) {
            self.write_entries(&entries)?;
        }
        Ok(())
    }

    fn guard(&self) -> StoreResult<MutexGuard<'_, ()>> {
        self.io_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

impl SecureStore for EncryptedFileStore {
    fn get(&self, key: StoreKey) -> StoreResult<Option<Vec<u8>>> {
        let _guard = self.guard()?;
        self.read_entries()?
            .get(key.name())
            .map(|encoded| {
                STANDARD.decode(encoded).map_err(|e| StoreError::Corrupt {
                    key: key.name(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn set(&self, key: StoreKey, value: &[u8]) -> StoreResult<()> {
        self.write_batch(&[StoreWrite::Set(key, value)])
    }

    fn delete(&self, key: StoreKey) -> StoreResult<()> {
        self.write_batch(&[StoreWrite::Delete(key)])
    }

    fn write_batch(&self, writes: &[StoreWrite<'_>]) -> StoreResult<()> {
        self.update(|entries| {
            let mut changed = false;
            for write in writes {
                let name = write.key().name().to_string();
                changed |= match *write {
                    StoreWrite::Set(_, value) => {
                        let encoded = STANDARD.encode(value);
                        entries.insert(name, encoded.clone()).as_ref() != Some(&encoded)
                    }
                    StoreWrite::Delete(_) => entries.remove(&name).is_some(),
                };
            }
            changed
        })
    }
}

fn load_or_create_salt(path: &Path) -> StoreResult<Salt> {
    match fs::read(path) {
        Ok(bytes) => Ok(Salt::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let salt = Salt::random();
            fs::write(path, salt.as_bytes())?;
            debug!(path = %path.display(), "created store salt");
            Ok(salt)
        }
        Err(e) => Err(e.into()),
    }
}
