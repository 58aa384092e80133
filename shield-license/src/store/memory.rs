//! In-process store for tests and ephemeral hosts.

use super::{SecureStore, StoreError, StoreKey, StoreResult, StoreWrite};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A `HashMap`-backed [`SecureStore`] with failure injection.
///
/// Offers no at-rest protection; production hosts use
/// [`super::EncryptedFileStore`] or a platform keychain adapter.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<StoreKey, Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `get` fail (or succeed again).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `set`/`delete`/`write_batch` fail (or succeed
    /// again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of keys currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    /// True when no key is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<StoreKey, Vec<u8>>>> {
        self.values
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

impl SecureStore for MemoryStore {
    fn get(&self, key: StoreKey) -> StoreResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("read of {} refused", key.name())));
        }
        Ok(self.lock()?.get(&key).cloned())
    }

    fn set(&self, key: StoreKey, value: &[u8]) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("write of {} refused", key.name())));
        }
        self.lock()?.insert(key, value.to_vec());
        Ok(())
    }

    fn delete(&self, key: StoreKey) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("delete of {} refused", key.name())));
        }
        self.lock()?.remove(&key);
        Ok(())
    }

    fn write_batch(&self, writes: &[StoreWrite<'_>]) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "batch of {} writes refused",
                writes.len()
            )));
        }
        let mut values = self.lock()?;
        for write in writes {
            match *write {
                StoreWrite::Set(key, value) => {
                    values.insert(key, value.to_vec());
                }
                StoreWrite::Delete(key) => {
                    values.remove(&key);
                }
            }
        }
        Ok(())
    }
}
