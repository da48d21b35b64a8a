//! Read access to the audit log.
//!
//! Rows are written by triggers on the audited tables, in the same
//! transaction as the mutation. Nothing here writes to the log.

use crate::{AuditLogEntry, SecureDatabase, StoreResult};
use vault_database::sql_params;

impl SecureDatabase {
    /// The most recent `limit` entries, newest first.
    pub async fn list_audit_log(&self, limit: u32) -> StoreResult<Vec<AuditLogEntry>> {
        Ok(self
            .db
            .all(
                "SELECT id, operation, table_name, record_id, timestamp
                 FROM audit_log ORDER BY id DESC LIMIT ?1",
                sql_params![limit],
            )
            .await?)
    }

    /// History of one record, oldest first.
    pub async fn audit_log_for(&self, table: &str, record_id: &str) -> StoreResult<Vec<AuditLogEntry>> {
        Ok(self
            .db
            .all(
                "SELECT id, operation, table_name, record_id, timestamp
                 FROM audit_log WHERE table_name = ?1 AND record_id = ?2 ORDER BY id",
                sql_params![table, record_id],
            )
            .await?)
    }
}
