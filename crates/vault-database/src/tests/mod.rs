//! Integration tests for the database controller.
//!
//! - `lifecycle.rs`    - open, encryption at rest, key mismatch, close
//! - `contention.rs`   - lock contention from another connection
//! - `recovery.rs`     - worker crashes, restarts, restart budget
//! - `timeouts.rs`     - timeout isolation and abandoned requests
//! - `transactions.rs` - atomicity, savepoints, transaction retries
//! - `statements.rs`   - prepared statements across restarts

mod contention;
mod lifecycle;
mod timeouts;

use crate::{sql_params, AsyncDatabase, DatabaseConfig, DatabaseError, DatabaseKey, ErrorCause, RetryPolicy, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub(super) fn test_key() -> DatabaseKey {
    DatabaseKey::from_bytes([7u8; 32])
}

/// Short delays so restart and retry paths finish quickly.
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
        startup_timeout: Duration::from_secs(10),
        ..DatabaseConfig::default()
    }
}

pub(super) fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("data").join("test.db")
}

pub(super) async fn open_with(path: &Path, config: DatabaseConfig) -> AsyncDatabase {
    AsyncDatabase::open(path, Some(test_key()), config).await.unwrap()
}

pub(super) async fn open_temp() -> (TempDir, AsyncDatabase) {
    let dir = tempfile::tempdir().unwrap();
    let db = open_with(&db_path(&dir), fast_config()).await;
    db.exec("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)")
        .await
        .unwrap();
    (dir, db)
}

pub(super) async fn count_items(db: &AsyncDatabase) -> i64 {
    db.get::<i64>("SELECT COUNT(*) FROM items", sql_params![])
        .await
        .unwrap()
        .unwrap()
}

/// Recursive CTE that keeps the worker busy for a noticeable time.
pub(super) const SLOW_COUNT: &str = "WITH RECURSIVE c(x) AS (
        SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 5000000
    ) SELECT COUNT(*) FROM c";

#[tokio::test]
async fn basic_workflow() {
    let (_dir, db) = open_temp().await;

    let inserted = db
        .run("INSERT INTO items (name) VALUES (?1)", sql_params!["alpha"])
        .await
        .unwrap();
    assert_eq!(inserted.changes, 1);
    assert_eq!(inserted.last_insert_id, 1);

    db.run("INSERT INTO items (name) VALUES (?1)", sql_params!["beta"])
        .await
        .unwrap();

    let row: Row = db
        .get("SELECT id, name FROM items WHERE name = ?1", sql_params!["beta"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get::<i64>("id").unwrap(), 2);

    let names: Vec<String> = db
        .all("SELECT name FROM items ORDER BY id", sql_params![])
        .await
        .unwrap();
    assert_eq!(names, vec!["alpha", "beta"]);

    let missing: Option<Row> = db
        .get("SELECT * FROM items WHERE name = 'nope'", sql_params![])
        .await
        .unwrap();
    assert!(missing.is_none());

    db.close().await.unwrap();
}

#[tokio::test]
async fn sql_errors_fail_without_retry() {
    let (_dir, db) = open_temp().await;

    let err = db
        .run("INSERT INTO no_such_table (x) VALUES (1)", sql_params![])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DatabaseError::Query {
            cause: ErrorCause::Sql,
            ..
        }
    ));

    db.run("INSERT INTO items (name) VALUES ('dup')", sql_params![])
        .await
        .unwrap();
    let err = db
        .run("INSERT INTO items (name) VALUES ('dup')", sql_params![])
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
    assert_eq!(db.stats().restarts, 0);
}

#[tokio::test]
async fn sequential_operations_are_ordered() {
    let (_dir, db) = open_temp().await;

    for i in 0..50 {
        db.run(
            "INSERT INTO items (name) VALUES (?1)",
            sql_params![format!("item-{i:02}")],
        )
        .await
        .unwrap();
    }
    let names: Vec<String> = db
        .all("SELECT name FROM items ORDER BY id", sql_params![])
        .await
        .unwrap();
    let expected: Vec<String> = (0..50).map(|i| format!("item-{i:02}")).collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn concurrent_callers_share_one_worker() {
    let (_dir, db) = open_temp().await;

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let db = db.clone();
            tokio::spawn(async move {
                db.run(
                    "INSERT INTO items (name) VALUES (?1)",
                    sql_params![format!("n{i}")],
                )
                .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(count_items(&db).await, 20);
    assert_eq!(db.stats().pending, 0);
}
