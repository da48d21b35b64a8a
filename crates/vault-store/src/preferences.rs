//! Preferences, optionally encrypted per value.
//!
//! The `encrypted` column says how `value` is stored: plain JSON text, or
//! `nonce:ciphertext` of the JSON text under the database key.

use crate::error::require;
use crate::models::{datetime, now};
use crate::{Preference, SecureDatabase, StoreError, StoreResult};
use tracing::debug;
use vault_database::{decrypt_value, encrypt_value, sql_params, Row};

impl SecureDatabase {
    pub async fn set_preference(
        &self,
        key: &str,
        value: &serde_json::Value,
        encrypted: bool,
    ) -> StoreResult<()> {
        require("key", key)?;
        let json = serde_json::to_string(value)?;
        let stored = if encrypted {
            encrypt_value(self.key(), &json)?
        } else {
            json
        };

        self.db
            .run(
                "INSERT INTO preferences (key, value, encrypted, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     encrypted = excluded.encrypted,
                     updated_at = excluded.updated_at",
                sql_params![key, stored, encrypted, now()],
            )
            .await?;

        debug!(key, encrypted, "Preference set");
        Ok(())
    }

    /// The decoded value, `None` if the key was never set.
    pub async fn get_preference(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        Ok(self.get_preference_entry(key).await?.map(|p| p.value))
    }

    pub async fn get_preference_entry(&self, key: &str) -> StoreResult<Option<Preference>> {
        let row: Option<Row> = self
            .db
            .get(
                "SELECT key, value, encrypted, updated_at FROM preferences WHERE key = ?1",
                sql_params![key],
            )
            .await?;
        row.map(|row| self.decode_preference(&row)).transpose()
    }

    /// All preferences by key, with encrypted values decrypted.
    pub async fn list_preferences(&self) -> StoreResult<Vec<Preference>> {
        let rows: Vec<Row> = self
            .db
            .all(
                "SELECT key, value, encrypted, updated_at FROM preferences ORDER BY key",
                sql_params![],
            )
            .await?;
        rows.iter().map(|row| self.decode_preference(row)).collect()
    }

    pub async fn delete_preference(&self, key: &str) -> StoreResult<()> {
        let result = self
            .db
            .run("DELETE FROM preferences WHERE key = ?1", sql_params![key])
            .await?;
        if result.changes == 0 {
            return Err(StoreError::not_found("preference", key));
        }
        debug!(key, "Preference deleted");
        Ok(())
    }

    fn decode_preference(&self, row: &Row) -> StoreResult<Preference> {
        let encrypted: bool = row.get("encrypted")?;
        let stored: String = row.get("value")?;
        let json = if encrypted {
            decrypt_value(self.key(), &stored)?
        } else {
            stored
        };
        Ok(Preference {
            key: row.get("key")?,
            value: serde_json::from_str(&json)?,
            encrypted,
            updated_at: datetime(row, "updated_at")?,
        })
    }
}
