//! Encrypted domain store for deskvault.
//!
//! `SecureDatabase` sits on top of the `AsyncDatabase` controller and the
//! device-bound key from the `KeyManager`. It provides:
//! - Workspace CRUD, with name uniqueness and cascading file deletion
//! - Content-addressed file storage: SHA-256 dedup and zstd compression
//! - Preferences, optionally encrypted per value with ChaCha20-Poly1305
//! - Instructions CRUD
//! - Read access to the audit log written by the schema's triggers
//!
//! Hashing, compression and encryption run on the caller's task; only SQL is
//! sent to the database worker.

mod audit;
mod error;
mod files;
mod instructions;
mod models;
mod preferences;
mod workspaces;

#[cfg(test)]
mod tests;

pub use error::{StoreError, StoreResult};
pub use files::{content_hash, is_binary, ContentBlob};
pub use models::{
    AuditLogEntry, AuditOperation, ContentStats, FileRecord, Instruction, Preference, Workspace,
};

use std::path::Path;
use tracing::info;
use vault_database::{AsyncDatabase, DatabaseConfig, DatabaseError, DatabaseKey};
use vault_keyring::KeyManager;

/// The secure store.
pub struct SecureDatabase {
    db: AsyncDatabase,
    key: DatabaseKey,
}

impl SecureDatabase {
    /// Open the store at `path`, unlocking it with the device key.
    ///
    /// The key is generated and persisted on first run. Fails instead of
    /// falling back to an unencrypted database when the secret store is
    /// unavailable, the stored key is unusable, or it does not unlock the file.
    pub async fn open(path: &Path, keys: &KeyManager, config: DatabaseConfig) -> StoreResult<Self> {
        let key = keys.get_or_create_key()?;
        let key = DatabaseKey::from_bytes(*key.as_bytes());

        let db = AsyncDatabase::open(path, Some(key.clone()), config)
            .await
            .map_err(|e| match e {
                DatabaseError::KeyMismatch => StoreError::KeyMismatch,
                other => StoreError::Database(other),
            })?;

        info!(device_tag = %keys.device().tag(), "Secure store opened");
        Ok(Self { db, key })
    }

    /// The underlying controller, for diagnostics and raw queries.
    pub fn database(&self) -> &AsyncDatabase {
        &self.db
    }

    pub async fn close(&self) -> StoreResult<()> {
        self.db.close().await?;
        Ok(())
    }

    pub(crate) fn key(&self) -> &DatabaseKey {
        &self.key
    }
}
