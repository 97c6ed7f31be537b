use tempfile::TempDir;
use ticktick_mcp::{AuthStore, PersistedAuthRecord};

fn temp_store() -> (TempDir, AuthStore) {
    let dir = TempDir::new().expect("tempdir");
    let store = AuthStore::at_path(dir.path().join("auth.json"));
    (dir, store)
}

fn full_record() -> PersistedAuthRecord {
    PersistedAuthRecord {
        access_token: "access-1".to_string(),
        refresh_token: "refresh-1".to_string(),
        client_id: "client-1".to_string(),
        client_secret: "secret-1".to_string(),
    }
}

#[tokio::test]
async fn load_without_file_returns_zero_record() {
    let (_dir, store) = temp_store();
    let record = store.load().await.expect("load");
    assert_eq!(record, PersistedAuthRecord::default());
}

#[tokio::test]
async fn save_then_load_round_trips_all_fields() {
    let (_dir, store) = temp_store();
    store.save(full_record()).await.expect("save");
    let loaded = store.load().await.expect("load");
    assert_eq!(loaded, full_record());
}

#[tokio::test]
async fn save_creates_missing_parent_directories() {
    let dir = TempDir::new().expect("tempdir");
    let store = AuthStore::at_path(dir.path().join("nested").join("deep").join("auth.json"));
    store.save(full_record()).await.expect("save");
    assert_eq!(store.load().await.expect("load"), full_record());
}

#[tokio::test]
async fn blank_refresh_token_keeps_stored_value() {
    let (_dir, store) = temp_store();
    store.save(full_record()).await.expect("seed");

    let saved = store
        .update_tokens("access-2", None)
        .await
        .expect("update");
    assert_eq!(saved.access_token, "access-2");
    assert_eq!(saved.refresh_token, "refresh-1");

    let loaded = store.load().await.expect("load");
    assert_eq!(loaded.access_token, "access-2");
    assert_eq!(loaded.refresh_token, "refresh-1");
    // Untouched fields survive the merge too.
    assert_eq!(loaded.client_id, "client-1");
    assert_eq!(loaded.client_secret, "secret-1");
}

#[tokio::test]
async fn rotated_refresh_token_replaces_stored_value() {
    let (_dir, store) = temp_store();
    store.save(full_record()).await.expect("seed");

    let saved = store
        .update_tokens("access-2", Some("refresh-2"))
        .await
        .expect("update");
    assert_eq!(saved.refresh_token, "refresh-2");
}

#[tokio::test]
async fn save_leaves_no_temp_files_behind() {
    let (dir, store) = temp_store();
    store.save(full_record()).await.expect("first");
    store.save(full_record()).await.expect("second");

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .expect("read_dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["auth.json".to_string()]);
}
