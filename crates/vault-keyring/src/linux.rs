//! Linux Secret Service backend.

use crate::{SecureStorage, StorageError, StorageResult};
use secret_service::blocking::{Collection, Item, SecretService};
use secret_service::EncryptionType;
use std::collections::HashMap;
use tracing::debug;

/// Secret Service (GNOME Keyring, KWallet) store. Items are tagged with
/// `service` and `account` attributes.
pub struct SecretServiceStorage {
    service: String,
}

impl SecretServiceStorage {
    pub fn new(service: &str) -> StorageResult<Self> {
        SecretService::connect(EncryptionType::Dh).map_err(|e| {
            StorageError::Platform(format!("Failed to connect to Secret Service: {}", e))
        })?;

        Ok(Self {
            service: service.to_string(),
        })
    }

    fn with_collection<T>(
        &self,
        f: impl FnOnce(&Collection<'_>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let ss = SecretService::connect(EncryptionType::Dh).map_err(platform)?;
        let collection = ss.get_default_collection().map_err(platform)?;

        if collection.is_locked().map_err(platform)? {
            collection.unlock().map_err(|e| {
                StorageError::Platform(format!("Failed to unlock collection: {}", e))
            })?;
        }

        f(&collection)
    }

    fn attributes<'a>(&'a self, account: &'a str) -> HashMap<&'a str, &'a str> {
        HashMap::from([("service", self.service.as_str()), ("account", account)])
    }

    fn find<'a>(
        &self,
        collection: &'a Collection<'a>,
        account: &str,
    ) -> StorageResult<Option<Item<'a>>> {
        let mut items = collection
            .search_items(self.attributes(account))
            .map_err(platform)?;
        Ok(if items.is_empty() {
            None
        } else {
            Some(items.swap_remove(0))
        })
    }
}

fn platform(e: secret_service::Error) -> StorageError {
    StorageError::Platform(e.to_string())
}

impl SecureStorage for SecretServiceStorage {
    fn set(&self, account: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service, account = %account, "Writing secret service item");

        self.with_collection(|collection| {
            let label = format!("{} ({})", self.service, account);
            collection
                .create_item(&label, self.attributes(account), value.as_bytes(), true, "text/plain")
                .map_err(platform)?;
            Ok(())
        })
    }

    fn get(&self, account: &str) -> StorageResult<Option<String>> {
        debug!(service = %self.service, account = %account, "Reading secret service item");

        self.with_collection(|collection| match self.find(collection, account)? {
            Some(item) => {
                let secret = item.get_secret().map_err(platform)?;
                String::from_utf8(secret)
                    .map(Some)
                    .map_err(|e| StorageError::Encoding(e.to_string()))
            }
            None => Ok(None),
        })
    }

    fn delete(&self, account: &str) -> StorageResult<bool> {
        debug!(service = %self.service, account = %account, "Deleting secret service item");

        self.with_collection(|collection| match self.find(collection, account)? {
            Some(item) => {
                item.delete().map_err(platform)?;
                Ok(true)
            }
            None => Ok(false),
        })
    }
}
