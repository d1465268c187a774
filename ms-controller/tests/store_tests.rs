mod support;

use ms_controller::{ConfigStore, FileStore, MemoryStore, StoreError};
use serde_json::json;

use support::unique_dir;

async fn exercise_store_contract(store: &dyn ConfigStore) {
    assert!(store.list_ids().await.expect("list empty").is_empty());

    let first = store.save(json!({"name": "first"})).await.expect("save first");
    let second = store.save(json!({"name": "second"})).await.expect("save second");
    assert_ne!(first, second);

    assert_eq!(
        store.get(&first).await.expect("get first"),
        json!({"name": "first"})
    );
    assert!(store.exists(&second).await.expect("exists"));

    let mut expected = vec![first.clone(), second.clone()];
    expected.sort();
    assert_eq!(store.list_ids().await.expect("list"), expected);

    store
        .update(&first, json!({"name": "first", "revision": 2}))
        .await
        .expect("update first");
    assert_eq!(
        store.get(&first).await.expect("get updated"),
        json!({"name": "first", "revision": 2})
    );

    store.delete(&first).await.expect("delete first");
    assert!(!store.exists(&first).await.expect("exists after delete"));
    assert!(matches!(
        store.get(&first).await,
        Err(StoreError::NotFound(ref id)) if *id == first
    ));
    assert!(matches!(
        store.delete(&first).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.update(&first, json!({})).await,
        Err(StoreError::NotFound(_))
    ));
    assert_eq!(store.list_ids().await.expect("list after delete"), vec![second]);
}

#[tokio::test]
async fn memory_store_honors_contract() {
    let store = MemoryStore::new();
    exercise_store_contract(&store).await;
}

#[tokio::test]
async fn file_store_honors_contract() {
    let root = unique_dir("contract");
    let store = FileStore::open(&root).await.expect("open store");
    exercise_store_contract(&store).await;
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn file_store_keeps_backup_of_deleted_document() {
    let root = unique_dir("backup");
    let store = FileStore::open(&root).await.expect("open store");
    let id = store
        .save(json!({"name": "orders", "operations": {}}))
        .await
        .expect("save");
    store
        .update(&id, json!({"name": "orders", "revision": 3}))
        .await
        .expect("update");
    store.delete(&id).await.expect("delete");

    assert_eq!(
        store.read_backup(&id).await.expect("backup exists"),
        json!({"name": "orders", "revision": 3})
    );
    assert!(root.join("backup").join(format!("{id}.json")).is_file());
    assert!(!root.join(format!("{id}.json")).exists());
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn file_store_survives_reopen() {
    let root = unique_dir("reopen");
    let id = {
        let store = FileStore::open(&root).await.expect("open store");
        store.save(json!({"name": "kept"})).await.expect("save")
    };
    let reopened = FileStore::open(&root).await.expect("reopen store");
    assert_eq!(reopened.list_ids().await.expect("list"), vec![id.clone()]);
    assert_eq!(
        reopened.get(&id).await.expect("get"),
        json!({"name": "kept"})
    );
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn file_store_lists_only_committed_documents() {
    let root = unique_dir("listing");
    let store = FileStore::open(&root).await.expect("open store");
    let id = store.save(json!({"name": "real"})).await.expect("save");

    std::fs::write(root.join(".pending.json.tmp"), b"{}").expect("write temp file");
    std::fs::write(root.join(".hidden.json"), b"{}").expect("write hidden file");
    std::fs::write(root.join("notes.txt"), b"not a document").expect("write stray file");
    std::fs::create_dir_all(root.join("nested.json")).expect("create stray dir");

    assert_eq!(store.list_ids().await.expect("list"), vec![id]);
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn file_store_reports_unparseable_documents() {
    let root = unique_dir("garbage");
    let store = FileStore::open(&root).await.expect("open store");
    std::fs::write(root.join("broken.json"), b"{not json").expect("write broken file");

    assert!(store.exists("broken").await.expect("exists"));
    assert!(matches!(
        store.get("broken").await,
        Err(StoreError::Serialization { ref id, .. }) if id == "broken"
    ));
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn path_like_ids_are_rejected() {
    let root = unique_dir("ids");
    let store = FileStore::open(&root).await.expect("open store");
    for id in ["../outside", "a/b", ".hidden", ""] {
        assert!(matches!(
            store.get(id).await,
            Err(StoreError::InvalidId(_))
        ));
        assert!(!store.exists(id).await.expect("exists is total"));
    }
    assert!(matches!(
        store.update("../outside", json!({})).await,
        Err(StoreError::InvalidId(_))
    ));
    assert!(matches!(
        MemoryStore::new().delete("a/b").await,
        Err(StoreError::InvalidId(_))
    ));
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn memory_store_archives_deleted_documents() {
    let store = MemoryStore::new();
    let id = store.save(json!({"name": "gone"})).await.expect("save");
    assert!(store.backup(&id).await.is_none());
    store.delete(&id).await.expect("delete");
    assert_eq!(store.backup(&id).await, Some(json!({"name": "gone"})));
}
