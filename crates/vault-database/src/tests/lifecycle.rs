use super::{count_items, db_path, fast_config, open_temp, open_with, test_key, SLOW_COUNT};
use crate::{
    sql_params, AsyncDatabase, DatabaseConfig, DatabaseError, DatabaseEvent, DatabaseKey,
    Lifecycle, CURRENT_VERSION,
};
use std::time::Duration;

#[tokio::test]
async fn open_creates_parent_dirs_and_migrates() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    assert!(!path.parent().unwrap().exists());

    let db = open_with(&path, fast_config()).await;
    assert!(path.exists());
    assert_eq!(db.lifecycle(), Lifecycle::Ready);

    let version: i64 = db
        .get("SELECT MAX(version) FROM migrations", sql_params![])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(version, i64::from(CURRENT_VERSION));
    db.close().await.unwrap();
}

#[tokio::test]
async fn data_survives_reopen_with_same_key() {
    let (dir, db) = open_temp().await;
    db.run("INSERT INTO items (name) VALUES ('kept')", sql_params![])
        .await
        .unwrap();
    db.close().await.unwrap();

    let db = open_with(&db_path(&dir), fast_config()).await;
    assert_eq!(count_items(&db).await, 1);
    db.close().await.unwrap();
}

#[tokio::test]
async fn wrong_key_is_a_key_mismatch() {
    let (dir, db) = open_temp().await;
    db.close().await.unwrap();

    let other = DatabaseKey::from_bytes([9u8; 32]);
    let err = AsyncDatabase::open(&db_path(&dir), Some(other), fast_config())
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::KeyMismatch), "got {err:?}");

    let err = AsyncDatabase::open(&db_path(&dir), None, fast_config())
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::KeyMismatch), "got {err:?}");
}

#[tokio::test]
async fn file_is_encrypted_at_rest() {
    let (dir, db) = open_temp().await;
    db.run(
        "INSERT INTO items (name) VALUES (?1)",
        sql_params!["plaintext-marker-4711"],
    )
    .await
    .unwrap();
    db.close().await.unwrap();

    let bytes = std::fs::read(db_path(&dir)).unwrap();
    assert!(!bytes.starts_with(b"SQLite format 3\0"));
    let marker = b"plaintext-marker-4711";
    assert!(!bytes.windows(marker.len()).any(|w| w == marker));
}

#[tokio::test]
async fn close_rejects_later_calls() {
    let (_dir, db) = open_temp().await;
    let mut events = db.subscribe();

    db.close().await.unwrap();
    assert_eq!(db.lifecycle(), Lifecycle::Closed);
    assert_eq!(events.recv().await.unwrap(), DatabaseEvent::Closed);

    let err = db
        .run("INSERT INTO items (name) VALUES ('late')", sql_params![])
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Closed));
    assert!(matches!(db.health_check().await, Err(DatabaseError::Closed)));

    // Closing twice is a no-op.
    db.close().await.unwrap();
}

#[tokio::test]
async fn close_rejects_in_flight_requests() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        termination_timeout: Duration::from_secs(30),
        ..fast_config()
    };
    let db = open_with(&db_path(&dir), config).await;

    let slow = tokio::spawn({
        let db = db.clone();
        async move { db.get::<i64>(SLOW_COUNT, sql_params![]).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    db.close().await.unwrap();
    let err = slow.await.unwrap().unwrap_err();
    assert!(matches!(err, DatabaseError::Closing), "got {err:?}");
}

#[tokio::test]
async fn health_check_and_stats() {
    let (_dir, db) = open_temp().await;
    db.health_check().await.unwrap();

    let stats = db.stats();
    assert_eq!(stats.lifecycle, Lifecycle::Ready);
    assert_eq!(stats.generation, 1);
    assert_eq!(stats.restarts, 0);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn unencrypted_database_opens_without_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.db");
    let db = AsyncDatabase::open(&path, None, fast_config()).await.unwrap();
    db.exec("CREATE TABLE t (x)").await.unwrap();
    db.close().await.unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"SQLite format 3\0"));

    let err = AsyncDatabase::open(&path, Some(test_key()), fast_config())
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::KeyMismatch), "got {err:?}");
}
