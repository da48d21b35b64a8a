//! Storage trait definitions.

use crate::StorageResult;

/// A string-valued secret store addressed by account name.
pub trait SecureStorage: Send + Sync {
    /// Store a value, replacing any existing one.
    fn set(&self, account: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value.
    fn get(&self, account: &str) -> StorageResult<Option<String>>;

    /// Delete a value. Returns whether anything was removed.
    fn delete(&self, account: &str) -> StorageResult<bool>;

    /// Check if an account has a value.
    fn has(&self, account: &str) -> StorageResult<bool> {
        Ok(self.get(account)?.is_some())
    }
}
