use super::{db_path, fast_config, open_with, SLOW_COUNT};
use crate::{sql_params, DatabaseConfig, DatabaseError, Lifecycle, Timeouts};
use std::time::Duration;

fn short_read_timeout() -> DatabaseConfig {
    DatabaseConfig {
        timeouts: Timeouts {
            read: Duration::from_millis(100),
            ..Timeouts::default()
        },
        ..fast_config()
    }
}

#[tokio::test]
async fn slow_read_times_out_and_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_with(&db_path(&dir), short_read_timeout()).await;

    let err = db.get::<i64>(SLOW_COUNT, sql_params![]).await.unwrap_err();
    match err {
        DatabaseError::Timeout { operation, timeout } => {
            assert_eq!(operation, "get");
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(db.stats().pending, 0);

    // The abandoned query finishes in the worker; its reply is dropped and
    // the controller keeps working.
    db.exec("CREATE TABLE after_timeout (x)").await.unwrap();
    assert_eq!(db.lifecycle(), Lifecycle::Ready);
    assert_eq!(db.stats().restarts, 0);
}

#[tokio::test]
async fn timeout_does_not_affect_other_requests() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_with(&db_path(&dir), short_read_timeout()).await;
    db.exec("CREATE TABLE t (x)").await.unwrap();

    let slow = tokio::spawn({
        let db = db.clone();
        async move { db.get::<i64>(SLOW_COUNT, sql_params![]).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Queued behind the slow read, but under the much longer write timeout.
    let write = db.run("INSERT INTO t (x) VALUES (1)", sql_params![]).await;

    assert!(matches!(
        slow.await.unwrap(),
        Err(DatabaseError::Timeout { .. })
    ));
    assert_eq!(write.unwrap().changes, 1);
}
