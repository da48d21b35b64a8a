//! Windows Credential Vault backend.

use crate::{SecureStorage, StorageError, StorageResult};
use tracing::debug;
use windows::core::HSTRING;
use windows::Security::Credentials::{PasswordCredential, PasswordVault};

/// `ERROR_NOT_FOUND` as an HRESULT.
const NOT_FOUND: u32 = 0x8007_0490;

/// Credential Vault store; the service is the credential resource and the
/// account is the user name.
pub struct CredentialStorage {
    resource: HSTRING,
}

impl CredentialStorage {
    pub fn new(service: &str) -> StorageResult<Self> {
        vault()?;
        Ok(Self {
            resource: HSTRING::from(service),
        })
    }

    fn retrieve(&self, vault: &PasswordVault, account: &str) -> StorageResult<Option<PasswordCredential>> {
        match vault.Retrieve(&self.resource, &HSTRING::from(account)) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) if e.code().0 as u32 == NOT_FOUND => Ok(None),
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to retrieve credential: {}",
                e
            ))),
        }
    }
}

fn vault() -> StorageResult<PasswordVault> {
    PasswordVault::new()
        .map_err(|e| StorageError::Platform(format!("Failed to access Credential Vault: {}", e)))
}

fn platform(e: windows::core::Error) -> StorageError {
    StorageError::Platform(e.to_string())
}

impl SecureStorage for CredentialStorage {
    fn set(&self, account: &str, value: &str) -> StorageResult<()> {
        debug!(resource = %self.resource, account = %account, "Writing credential");

        let vault = vault()?;
        if let Some(existing) = self.retrieve(&vault, account)? {
            vault.Remove(&existing).map_err(platform)?;
        }

        let credential = PasswordCredential::CreatePasswordCredential(
            &self.resource,
            &HSTRING::from(account),
            &HSTRING::from(value),
        )
        .map_err(platform)?;
        vault.Add(&credential).map_err(platform)
    }

    fn get(&self, account: &str) -> StorageResult<Option<String>> {
        debug!(resource = %self.resource, account = %account, "Reading credential");

        let vault = vault()?;
        match self.retrieve(&vault, account)? {
            Some(credential) => {
                credential.RetrievePassword().map_err(platform)?;
                let password = credential.Password().map_err(platform)?;
                Ok(Some(password.to_string()))
            }
            None => Ok(None),
        }
    }

    fn delete(&self, account: &str) -> StorageResult<bool> {
        debug!(resource = %self.resource, account = %account, "Deleting credential");

        let vault = vault()?;
        match self.retrieve(&vault, account)? {
            Some(credential) => {
                vault.Remove(&credential).map_err(platform)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
