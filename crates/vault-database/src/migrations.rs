//! Database migrations.
//!
//! Migrations are applied in order by the worker right after the connection
//! is opened and tracked in the `migrations` table. Each one runs in its own
//! transaction.

use crate::{DatabaseError, DatabaseResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

type Migration = fn(&Connection) -> rusqlite::Result<()>;

const MIGRATIONS: &[(i32, &str, Migration)] = &[
    (1, "initial_schema", migrate_v1_initial_schema),
    (2, "audit_triggers", migrate_v2_audit_triggers),
];

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )
    .map_err(migration_error)?;

    let current_version = schema_version(conn)?;
    if current_version > CURRENT_VERSION {
        return Err(DatabaseError::Migration(format!(
            "database schema v{current_version} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    debug!(current_version, target_version = CURRENT_VERSION, "Checking migrations");

    for (version, name, migrate) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }
        info!(version, name, "Applying migration");

        let tx = conn.unchecked_transaction().map_err(migration_error)?;
        migrate(&tx).map_err(migration_error)?;
        tx.execute(
            "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
            rusqlite::params![version, name],
        )
        .map_err(migration_error)?;
        tx.commit().map_err(migration_error)?;
    }

    Ok(())
}

/// Highest applied migration, 0 for a fresh file.
pub fn schema_version(conn: &Connection) -> DatabaseResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )
    .map_err(migration_error)
}

fn migration_error(e: rusqlite::Error) -> DatabaseError {
    DatabaseError::Migration(e.to_string())
}

/// V1: workspaces, content-addressed files, preferences, instructions, audit log.
fn migrate_v1_initial_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS workspaces (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            folder_path TEXT,
            state TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_accessed TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_workspaces_last_accessed
            ON workspaces(last_accessed);
        CREATE INDEX IF NOT EXISTS idx_workspaces_folder_path
            ON workspaces(folder_path);

        CREATE TABLE IF NOT EXISTS file_contents (
            hash TEXT PRIMARY KEY,
            compressed_content BLOB NOT NULL,
            original_size INTEGER NOT NULL,
            compressed_size INTEGER NOT NULL,
            compression_ratio REAL NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS files (
            workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            size INTEGER NOT NULL,
            is_binary INTEGER NOT NULL DEFAULT 0,
            token_count INTEGER,
            content_hash TEXT NOT NULL REFERENCES file_contents(hash),
            updated_at TEXT NOT NULL,
            PRIMARY KEY (workspace_id, path)
        );

        CREATE INDEX IF NOT EXISTS idx_files_content_hash
            ON files(content_hash);

        CREATE TABLE IF NOT EXISTS preferences (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            encrypted INTEGER NOT NULL DEFAULT 0 CHECK (encrypted IN (0, 1)),
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS instructions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            operation TEXT NOT NULL CHECK (operation IN ('INSERT', 'UPDATE', 'DELETE')),
            table_name TEXT NOT NULL,
            record_id TEXT NOT NULL,
            timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_audit_log_record
            ON audit_log(table_name, record_id);
        ",
    )
}

/// V2: audit rows are written by triggers, inside the mutating statement's transaction.
fn migrate_v2_audit_triggers(conn: &Connection) -> rusqlite::Result<()> {
    for (table, id_column) in [
        ("workspaces", "id"),
        ("preferences", "key"),
        ("instructions", "id"),
    ] {
        for (operation, row) in [("INSERT", "NEW"), ("UPDATE", "NEW"), ("DELETE", "OLD")] {
            let trigger = format!(
                "CREATE TRIGGER IF NOT EXISTS audit_{table}_{op}
                 AFTER {operation} ON {table}
                 BEGIN
                     INSERT INTO audit_log (operation, table_name, record_id)
                     VALUES ('{operation}', '{table}', {row}.{id_column});
                 END;",
                op = operation.to_lowercase(),
            );
            conn.execute_batch(&trigger)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn test_migrations_run_successfully() {
        let conn = migrated();
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_VERSION);

        for table in [
            "workspaces",
            "files",
            "file_contents",
            "preferences",
            "instructions",
            "audit_log",
        ] {
            let exists = count(
                &conn,
                &format!(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '{table}'"
                ),
            );
            assert_eq!(exists, 1, "missing table {table}");
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = migrated();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM migrations"), 2);
    }

    #[test]
    fn test_triggers_write_audit_rows() {
        let conn = migrated();
        conn.execute_batch(
            "INSERT INTO workspaces (id, name, created_at, updated_at, last_accessed)
                 VALUES ('w1', 'alpha', 't', 't', 't');
             UPDATE workspaces SET name = 'beta' WHERE id = 'w1';
             DELETE FROM workspaces WHERE id = 'w1';
             INSERT INTO preferences (key, value, updated_at) VALUES ('theme', '\"dark\"', 't');",
        )
        .unwrap();

        let ops: Vec<String> = conn
            .prepare("SELECT operation || ':' || table_name || ':' || record_id FROM audit_log ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            ops,
            vec![
                "INSERT:workspaces:w1",
                "UPDATE:workspaces:w1",
                "DELETE:workspaces:w1",
                "INSERT:preferences:theme",
            ]
        );
    }

    #[test]
    fn test_files_cascade_with_workspace() {
        let conn = migrated();
        conn.execute_batch(
            "INSERT INTO workspaces (id, name, created_at, updated_at, last_accessed)
                 VALUES ('w1', 'alpha', 't', 't', 't');
             INSERT INTO file_contents (hash, compressed_content, original_size, compressed_size, compression_ratio)
                 VALUES ('h', x'00', 1, 1, 1.0);
             INSERT INTO files (workspace_id, path, size, content_hash, updated_at)
                 VALUES ('w1', '/a.ts', 1, 'h', 't');
             DELETE FROM workspaces WHERE id = 'w1';",
        )
        .unwrap();
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM files"), 0);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let conn = migrated();
        conn.execute("INSERT INTO migrations (version, name) VALUES (99, 'future')", [])
            .unwrap();
        assert!(matches!(run_migrations(&conn), Err(DatabaseError::Migration(_))));
    }
}
