//! Device-bound key management for deskvault.
//!
//! The database key lives in the OS secret store:
//! - **macOS**: Keychain via `security-framework`
//! - **Linux**: Secret Service (GNOME Keyring / KWallet) via `secret-service`
//! - **Windows**: Credential Vault via `windows`
//!
//! [`KeyManager`] generates the key on first run, binds it to the current
//! device, and hands the same key back on every later run.

mod device;
mod manager;
mod memory;
mod traits;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "windows")]
mod windows;

pub use device::DeviceIdentity;
pub use manager::{EncryptionKey, KeyError, KeyManager, KeyResult, KeyStatus, KEY_LEN};
pub use memory::MemoryStorage;
pub use traits::SecureStorage;

use thiserror::Error;

/// Service name for every secret-store entry.
pub const SERVICE_NAME: &str = "com.deskvault.store";

/// Account under which the database key is stored.
pub const DATABASE_KEY_ACCOUNT: &str = "database-key";

/// Error type for secret-store operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Platform-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Stored value is not valid UTF-8
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// No secret store on this platform
    #[error("No secure storage available on this platform")]
    Unsupported,
}

/// Result type for secret-store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the platform secret store for `service`.
pub fn create_storage(service: &str) -> StorageResult<Box<dyn SecureStorage>> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(macos::KeychainStorage::new(service)))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::SecretServiceStorage::new(service)?))
    }

    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(windows::CredentialStorage::new(service)?))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        let _ = service;
        Err(StorageError::Unsupported)
    }
}
