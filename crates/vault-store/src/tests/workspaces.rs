use super::{fixture, workspace};
use crate::StoreError;
use serde_json::json;

#[tokio::test]
async fn create_get_update_workspace() {
    let f = fixture().await;
    let state = json!({"selected": ["/src/main.rs"], "expanded": ["/src"]});
    let ws = f
        .store
        .create_workspace("alpha", Some("/home/me/alpha"), &state)
        .await
        .unwrap();
    assert_eq!(ws.name, "alpha");
    assert_eq!(ws.folder_path.as_deref(), Some("/home/me/alpha"));
    assert_eq!(ws.state, state);
    assert_eq!(ws.created_at, ws.updated_at);

    let by_name = f.store.get_workspace_by_name("alpha").await.unwrap().unwrap();
    assert_eq!(by_name, ws);

    let updated = f
        .store
        .update_workspace(&ws.id, &json!({"selected": []}))
        .await
        .unwrap();
    assert_eq!(updated.state, json!({"selected": []}));
    assert!(updated.updated_at >= ws.updated_at);
    assert_eq!(updated.created_at, ws.created_at);
}

#[tokio::test]
async fn duplicate_name_is_already_exists() {
    let f = fixture().await;
    workspace(&f.store, "alpha").await;

    let err = f
        .store
        .create_workspace("alpha", None, &json!({}))
        .await
        .unwrap_err();
    assert!(
        matches!(err, StoreError::AlreadyExists { entity: "workspace", ref name } if name == "alpha"),
        "got {err:?}"
    );
    assert_eq!(f.store.list_workspaces().await.unwrap().len(), 1);
}

#[tokio::test]
async fn rename_checks_uniqueness_and_existence() {
    let f = fixture().await;
    let a = workspace(&f.store, "alpha").await;
    workspace(&f.store, "beta").await;

    let err = f.store.rename_workspace(&a, "beta").await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));

    let renamed = f.store.rename_workspace(&a, "gamma").await.unwrap();
    assert_eq!(renamed.name, "gamma");

    let err = f.store.rename_workspace("missing", "delta").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn empty_name_is_rejected_before_the_database() {
    let f = fixture().await;
    let err = f.store.create_workspace("  ", None, &json!({})).await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn missing_workspace_mutations_are_not_found() {
    let f = fixture().await;
    assert!(f.store.get_workspace("nope").await.unwrap().is_none());
    assert!(f.store.update_workspace("nope", &json!({})).await.unwrap_err().is_not_found());
    assert!(f.store.touch_workspace("nope").await.unwrap_err().is_not_found());
    assert!(f.store.delete_workspace("nope").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn list_is_ordered_by_recency() {
    let f = fixture().await;
    let a = workspace(&f.store, "alpha").await;
    workspace(&f.store, "beta").await;
    workspace(&f.store, "gamma").await;

    f.store.touch_workspace(&a).await.unwrap();
    let names: Vec<String> = f
        .store
        .list_workspaces()
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.name)
        .collect();
    assert_eq!(names, vec!["alpha", "gamma", "beta"]);
}

#[tokio::test]
async fn save_creates_then_updates() {
    let f = fixture().await;
    let first = f
        .store
        .save_workspace("draft", Some("/tmp/draft"), &json!({"v": 1}))
        .await
        .unwrap();
    let second = f
        .store
        .save_workspace("draft", None, &json!({"v": 2}))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.state, json!({"v": 2}));
    assert_eq!(second.folder_path.as_deref(), Some("/tmp/draft"));
    assert_eq!(f.store.list_workspaces().await.unwrap().len(), 1);
}

#[tokio::test]
async fn load_bumps_last_accessed() {
    let f = fixture().await;
    let created = f.store.create_workspace("alpha", None, &json!({})).await.unwrap();

    let loaded = f.store.load_workspace("alpha").await.unwrap().unwrap();
    assert_eq!(loaded.id, created.id);
    assert!(loaded.last_accessed > created.last_accessed);
    assert!(f.store.load_workspace("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn open_folder_reuses_or_creates() {
    let f = fixture().await;
    workspace(&f.store, "app").await;

    let opened = f.store.open_folder("/home/me/app").await.unwrap();
    assert_eq!(opened.name, "app (2)");
    assert_eq!(opened.folder_path.as_deref(), Some("/home/me/app"));

    let again = f.store.open_folder("/home/me/app").await.unwrap();
    assert_eq!(again.id, opened.id);

    let other = f.store.open_folder("/srv/app").await.unwrap();
    assert_eq!(other.name, "app (3)");
}

#[tokio::test]
async fn delete_cascades_only_to_own_files() {
    let f = fixture().await;
    let a = workspace(&f.store, "alpha").await;
    let b = workspace(&f.store, "beta").await;

    for i in 0..5 {
        let path = format!("/src/{i}.rs");
        f.store
            .save_file_content(&a, &path, format!("mod m{i};").as_bytes(), None)
            .await
            .unwrap();
    }
    f.store
        .save_file_content(&b, "/src/0.rs", b"mod m0;", None)
        .await
        .unwrap();

    f.store.delete_workspace(&a).await.unwrap();

    assert!(f.store.get_workspace(&a).await.unwrap().is_none());
    assert!(f.store.list_files(&a).await.unwrap().is_empty());
    assert_eq!(f.store.list_files(&b).await.unwrap().len(), 1);
    assert_eq!(
        f.store.get_file_content(&b, "/src/0.rs").await.unwrap().unwrap(),
        b"mod m0;"
    );
    // Only the blob still referenced from beta survives.
    assert_eq!(f.store.content_stats().await.unwrap().blob_count, 1);
}
