use super::{count_items, db_path, fast_config, open_with, test_key};
use crate::{sql_params, AsyncDatabase, DatabaseError, ErrorCause, RetryPolicy};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Opens the controller with a short busy timeout so lock contention
/// surfaces as `SQLITE_BUSY` instead of blocking inside SQLite.
async fn open_contended(dir: &TempDir, max_attempts: u32) -> AsyncDatabase {
    let mut config = fast_config();
    config.retry = RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        ..RetryPolicy::default()
    };
    let db = open_with(&db_path(dir), config).await;
    db.exec("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)")
        .await
        .unwrap();
    db.exec("PRAGMA busy_timeout = 10").await.unwrap();
    db
}

/// A second connection on the same file, holding the write lock.
fn hold_write_lock(path: &Path) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(&format!("PRAGMA key = {};", test_key().pragma_literal()))
        .unwrap();
    conn.execute_batch("BEGIN EXCLUSIVE; INSERT INTO items (name) VALUES ('other');")
        .unwrap();
    conn
}

#[tokio::test]
async fn busy_write_is_retried_until_the_lock_clears() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_contended(&dir, 50).await;

    let other = hold_write_lock(&db_path(&dir));
    let release = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(150));
        other.execute_batch("COMMIT").unwrap();
    });

    let inserted = db
        .run("INSERT INTO items (name) VALUES ('mine')", sql_params![])
        .await
        .unwrap();
    release.join().unwrap();

    assert_eq!(inserted.changes, 1);
    assert_eq!(count_items(&db).await, 2);
    assert_eq!(db.stats().restarts, 0);
    db.close().await.unwrap();
}

#[tokio::test]
async fn persistent_busy_exhausts_retries() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_contended(&dir, 3).await;
    let other = hold_write_lock(&db_path(&dir));

    let err = db
        .run("INSERT INTO items (name) VALUES ('mine')", sql_params![])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DatabaseError::RetriesExhausted { attempts: 3, .. }
    ));
    assert_eq!(err.cause(), Some(ErrorCause::Busy));

    // Dropping the holder rolls back its insert.
    drop(other);
    assert_eq!(count_items(&db).await, 0);
    db.run("INSERT INTO items (name) VALUES ('mine')", sql_params![])
        .await
        .unwrap();
    assert_eq!(count_items(&db).await, 1);
    assert_eq!(db.stats().restarts, 0);
    db.close().await.unwrap();
}
