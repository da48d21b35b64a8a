//! macOS Keychain backend.

use crate::{SecureStorage, StorageError, StorageResult};
use security_framework::base::Error as SecurityError;
use security_framework::passwords::{
    delete_generic_password, get_generic_password, set_generic_password,
};
use tracing::debug;

/// `errSecItemNotFound`
const ITEM_NOT_FOUND: i32 = -25300;

/// Generic-password items in the login keychain, one per account.
pub struct KeychainStorage {
    service: String,
}

impl KeychainStorage {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }
}

fn is_not_found(e: &SecurityError) -> bool {
    e.code() == ITEM_NOT_FOUND
}

impl SecureStorage for KeychainStorage {
    fn set(&self, account: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service, account = %account, "Writing keychain item");

        set_generic_password(&self.service, account, value.as_bytes())
            .map_err(|e| StorageError::Platform(format!("Failed to set keychain item: {}", e)))
    }

    fn get(&self, account: &str) -> StorageResult<Option<String>> {
        debug!(service = %self.service, account = %account, "Reading keychain item");

        match get_generic_password(&self.service, account) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageError::Encoding(e.to_string())),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to read keychain item: {}",
                e
            ))),
        }
    }

    fn delete(&self, account: &str) -> StorageResult<bool> {
        debug!(service = %self.service, account = %account, "Deleting keychain item");

        match delete_generic_password(&self.service, account) {
            Ok(()) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to delete keychain item: {}",
                e
            ))),
        }
    }
}
