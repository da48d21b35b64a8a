//! Domain types and their row mappings.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use vault_database::{DatabaseError, DatabaseResult, FromRow, Row};

/// A named, reloadable snapshot of a file selection and its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub folder_path: Option<String>,
    /// Opaque to the store.
    pub state: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// A file in a workspace. Content lives in the blob named by `content_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub workspace_id: String,
    pub path: String,
    pub size: i64,
    pub is_binary: bool,
    pub token_count: Option<i64>,
    pub content_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// Totals over the content-addressed blob table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStats {
    pub blob_count: i64,
    pub file_count: i64,
    pub original_bytes: i64,
    pub compressed_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub key: String,
    pub value: serde_json::Value,
    pub encrypted: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: String,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of mutation recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditOperation {
    Insert,
    Update,
    Delete,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub operation: AuditOperation,
    pub table_name: String,
    pub record_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Current time in the fixed-width form stored in every timestamp column.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(column: &str, value: &str) -> DatabaseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidData(format!("{column}: {e}")))
}

pub(crate) fn datetime(row: &Row, column: &str) -> DatabaseResult<DateTime<Utc>> {
    parse_datetime(column, &row.get::<String>(column)?)
}

impl FromRow for Workspace {
    fn from_row(row: &Row) -> DatabaseResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            folder_path: row.get("folder_path")?,
            state: serde_json::from_str(&row.get::<String>("state")?)?,
            created_at: datetime(row, "created_at")?,
            updated_at: datetime(row, "updated_at")?,
            last_accessed: datetime(row, "last_accessed")?,
        })
    }
}

impl FromRow for FileRecord {
    fn from_row(row: &Row) -> DatabaseResult<Self> {
        Ok(Self {
            workspace_id: row.get("workspace_id")?,
            path: row.get("path")?,
            size: row.get("size")?,
            is_binary: row.get("is_binary")?,
            token_count: row.get("token_count")?,
            content_hash: row.get("content_hash")?,
            updated_at: datetime(row, "updated_at")?,
        })
    }
}

impl FromRow for ContentStats {
    fn from_row(row: &Row) -> DatabaseResult<Self> {
        Ok(Self {
            blob_count: row.get("blob_count")?,
            file_count: row.get("file_count")?,
            original_bytes: row.get("original_bytes")?,
            compressed_bytes: row.get("compressed_bytes")?,
        })
    }
}

impl FromRow for Instruction {
    fn from_row(row: &Row) -> DatabaseResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            content: row.get("content")?,
            created_at: datetime(row, "created_at")?,
            updated_at: datetime(row, "updated_at")?,
        })
    }
}

impl FromRow for AuditLogEntry {
    fn from_row(row: &Row) -> DatabaseResult<Self> {
        let operation: String = row.get("operation")?;
        Ok(Self {
            id: row.get("id")?,
            operation: AuditOperation::parse(&operation).ok_or_else(|| {
                DatabaseError::InvalidData(format!("unknown audit operation {operation}"))
            })?,
            table_name: row.get("table_name")?,
            record_id: row.get("record_id")?,
            timestamp: datetime(row, "timestamp")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let earlier = "2024-01-02T03:04:05.000006Z";
        let later = "2024-01-02T03:04:05.000010Z";
        assert!(earlier < later);
        assert!(parse_datetime("t", earlier).unwrap() < parse_datetime("t", later).unwrap());
        assert_eq!(now().len(), earlier.len());
    }

    #[test]
    fn test_audit_timestamp_format_parses() {
        // Format written by the audit triggers.
        assert!(parse_datetime("timestamp", "2024-05-06T07:08:09.123Z").is_ok());
    }

    #[test]
    fn test_audit_operation_round_trip() {
        for op in [AuditOperation::Insert, AuditOperation::Update, AuditOperation::Delete] {
            assert_eq!(AuditOperation::parse(op.as_str()), Some(op));
        }
        assert_eq!(AuditOperation::parse("TRUNCATE"), None);
    }
}
