//! Store setup from configuration.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use vault_config::{Config, DatabaseSettings, Paths};
use vault_database::{DatabaseConfig, RetryPolicy, Timeouts};
use vault_keyring::KeyManager;
use vault_store::SecureDatabase;

/// Runtime controller settings from the `database` config section.
pub fn database_config(settings: &DatabaseSettings) -> DatabaseConfig {
    let ms = Duration::from_millis;
    DatabaseConfig {
        timeouts: Timeouts {
            read: ms(settings.read_timeout_ms),
            write: ms(settings.write_timeout_ms),
            bulk_read: ms(settings.bulk_read_timeout_ms),
            schema: ms(settings.schema_timeout_ms),
        },
        retry: RetryPolicy {
            max_attempts: settings.max_retries.max(1),
            base_delay: ms(settings.retry_base_delay_ms),
            max_delay: ms(settings.retry_max_delay_ms),
            ..RetryPolicy::default()
        },
        health_check_interval: ms(settings.health_check_interval_ms),
        max_restarts: settings.max_restarts,
        restart_base_delay: ms(settings.restart_base_delay_ms),
        restart_max_delay: ms(settings.restart_max_delay_ms),
        termination_attempts: settings.termination_attempts,
        ..DatabaseConfig::default()
    }
}

/// Open the secure store under `paths` with the platform secret store.
pub async fn open_store(paths: &Paths, config: &Config) -> anyhow::Result<Arc<SecureDatabase>> {
    let keys = KeyManager::platform().context("Failed to access the secret store")?;
    let store = SecureDatabase::open(&paths.database_file(), &keys, database_config(&config.database))
        .await
        .context("Failed to open the secure store")?;
    Ok(Arc::new(store))
}
