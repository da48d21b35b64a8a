//! Behavioural tests for the secure store.
//!
//! - `opening.rs`    - key lifecycle against the database file
//! - `workspaces.rs` - CRUD, uniqueness, folders, cascade delete
//! - `files.rs`      - dedup, isolation, blob pruning
//! - `preferences.rs`- plain and encrypted values
//! - `records.rs`    - instructions and the audit log

mod preferences;
mod workspaces;

use crate::SecureDatabase;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use vault_database::{DatabaseConfig, RetryPolicy};
use vault_keyring::{DeviceIdentity, KeyManager, MemoryStorage};

pub(super) fn fast_config() -> DatabaseConfig {
    DatabaseConfig {
        retry: RetryPolicy {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            ..RetryPolicy::default()
        },
        health_check_interval: Duration::ZERO,
        restart_base_delay: Duration::from_millis(10),
        restart_max_delay: Duration::from_millis(40),
        ..DatabaseConfig::default()
    }
}

pub(super) fn keys(storage: &MemoryStorage) -> KeyManager {
    KeyManager::new(Box::new(storage.clone()), DeviceIdentity::new("tester@workstation"))
}

pub(super) fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("deskvault.db")
}

pub(super) async fn open_store(dir: &TempDir, storage: &MemoryStorage) -> SecureDatabase {
    SecureDatabase::open(&store_path(dir), &keys(storage), fast_config())
        .await
        .unwrap()
}

pub(super) struct Fixture {
    pub dir: TempDir,
    pub storage: MemoryStorage,
    pub store: SecureDatabase,
}

pub(super) async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let storage = MemoryStorage::new();
    let store = open_store(&dir, &storage).await;
    Fixture {
        dir,
        storage,
        store,
    }
}

pub(super) async fn workspace(store: &SecureDatabase, name: &str) -> String {
    store
        .create_workspace(name, None, &json!({}))
        .await
        .unwrap()
        .id
}
