//! Process-local secret store for tests and ephemeral runs.

use crate::{SecureStorage, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory [`SecureStorage`]. Clones share the same entries.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the platform store were locked.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn entries(&self) -> StorageResult<MutexGuard<'_, HashMap<String, String>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Platform("secret store is locked".to_string()));
        }
        self.data
            .lock()
            .map_err(|_| StorageError::Platform("memory storage poisoned".to_string()))
    }
}

impl SecureStorage for MemoryStorage {
    fn set(&self, account: &str, value: &str) -> StorageResult<()> {
        self.entries()?.insert(account.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, account: &str) -> StorageResult<Option<String>> {
        Ok(self.entries()?.get(account).cloned())
    }

    fn delete(&self, account: &str) -> StorageResult<bool> {
        Ok(self.entries()?.remove(account).is_some())
    }
}
