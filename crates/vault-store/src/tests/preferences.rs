use super::{fixture, open_store};
use serde_json::json;
use vault_database::{sql_params, Row};

async fn raw_row(store: &crate::SecureDatabase, key: &str) -> Row {
    store
        .database()
        .get("SELECT value, encrypted FROM preferences WHERE key = ?1", sql_params![key])
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn plain_preference_is_stored_as_json() {
    let f = fixture().await;
    f.store.set_preference("theme", &json!("dark"), false).await.unwrap();

    let row = raw_row(&f.store, "theme").await;
    assert_eq!(row.get::<String>("value").unwrap(), "\"dark\"");
    assert!(!row.get::<bool>("encrypted").unwrap());
    assert_eq!(f.store.get_preference("theme").await.unwrap(), Some(json!("dark")));
}

#[tokio::test]
async fn encrypted_preference_round_trips_without_plaintext_at_rest() {
    let f = fixture().await;
    let value = json!({"apiKey": "sk-live-very-secret"});
    f.store.set_preference("provider", &value, true).await.unwrap();

    let row = raw_row(&f.store, "provider").await;
    let stored = row.get::<String>("value").unwrap();
    assert!(row.get::<bool>("encrypted").unwrap());
    assert!(!stored.contains("sk-live"));
    assert_eq!(stored.split(':').count(), 2);

    assert_eq!(f.store.get_preference("provider").await.unwrap(), Some(value.clone()));

    // Survives a reopen with the same device key.
    f.store.close().await.unwrap();
    let store = open_store(&f.dir, &f.storage).await;
    assert_eq!(store.get_preference("provider").await.unwrap(), Some(value));
}

#[tokio::test]
async fn encrypting_the_same_value_twice_differs() {
    let f = fixture().await;
    f.store.set_preference("a", &json!("same"), true).await.unwrap();
    f.store.set_preference("b", &json!("same"), true).await.unwrap();

    let a = raw_row(&f.store, "a").await.get::<String>("value").unwrap();
    let b = raw_row(&f.store, "b").await.get::<String>("value").unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn switching_encryption_flag_rewrites_the_row() {
    let f = fixture().await;
    f.store.set_preference("token", &json!("abc"), true).await.unwrap();
    f.store.set_preference("token", &json!("abc"), false).await.unwrap();

    let row = raw_row(&f.store, "token").await;
    assert!(!row.get::<bool>("encrypted").unwrap());
    assert_eq!(row.get::<String>("value").unwrap(), "\"abc\"");
}

#[tokio::test]
async fn list_and_delete_preferences() {
    let f = fixture().await;
    f.store.set_preference("b.secret", &json!(1), true).await.unwrap();
    f.store.set_preference("a.plain", &json!([1, 2]), false).await.unwrap();

    let prefs = f.store.list_preferences().await.unwrap();
    let summary: Vec<_> = prefs
        .iter()
        .map(|p| (p.key.as_str(), p.value.clone(), p.encrypted))
        .collect();
    assert_eq!(
        summary,
        vec![("a.plain", json!([1, 2]), false), ("b.secret", json!(1), true)]
    );

    f.store.delete_preference("a.plain").await.unwrap();
    assert_eq!(f.store.get_preference("a.plain").await.unwrap(), None);
    assert!(f.store.delete_preference("a.plain").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn tampered_ciphertext_fails_to_decrypt() {
    let f = fixture().await;
    f.store.set_preference("k", &json!("v"), true).await.unwrap();
    f.store
        .database()
        .run(
            "UPDATE preferences SET value = 'AAAAAAAAAAAAAAAA:AAAA' WHERE key = 'k'",
            sql_params![],
        )
        .await
        .unwrap();

    let err = f.store.get_preference("k").await.unwrap_err();
    assert!(matches!(
        err,
        crate::StoreError::Database(vault_database::DatabaseError::Encryption(_))
    ));
}
