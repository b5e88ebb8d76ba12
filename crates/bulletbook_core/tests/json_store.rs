use bulletbook_core::{
    Bucket, Bullet, BulletKind, BulletPatch, Catalog, CoreConfig, JsonFileStore, StorageBackend,
    StoreError,
};
use serde_json::Value;

fn task(id: u32, description: &str) -> Bullet {
    let mut bullet = Bullet::new(BulletKind::Task, description);
    bullet.id = id;
    bullet
}

#[test]
fn open_creates_bucket_layout() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "work").unwrap();

    assert_eq!(store.root(), dir.path().join("work"));
    assert!(dir.path().join("work/storage").is_dir());
    assert!(dir.path().join("work/archive").is_dir());
    assert!(dir.path().join("work/bin").is_dir());
    assert!(dir.path().join("work/.temp").is_dir());
    assert_eq!(
        store.bucket_file(Bucket::Desk),
        dir.path().join("work/storage/storage.json")
    );
    assert!(store.all(Bucket::Desk).unwrap().is_empty());
}

#[test]
fn open_rejects_path_like_context_names() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["", "a/b", "..", ".hidden"] {
        assert!(matches!(
            JsonFileStore::open(dir.path(), name),
            Err(StoreError::InvalidData(_))
        ));
    }
}

#[test]
fn open_removes_stale_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    JsonFileStore::open(dir.path(), "default").unwrap();
    let stale = dir.path().join("default/.temp/half-written");
    std::fs::write(&stale, b"{").unwrap();

    JsonFileStore::open(dir.path(), "default").unwrap();
    assert!(!stale.exists());
}

#[test]
fn upsert_get_and_delete_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    let first = task(1, "first");
    let second = task(3, "second");

    store.upsert(Bucket::Desk, &first).unwrap();
    store.upsert(Bucket::Desk, &second).unwrap();

    let loaded = store.get(Bucket::Desk, 3).unwrap().unwrap();
    assert_eq!(loaded, second);
    assert!(store.get(Bucket::Desk, 2).unwrap().is_none());
    assert!(store.get(Bucket::Archive, 1).unwrap().is_none());

    let subset = store.get_many(Bucket::Desk, &[1, 2]).unwrap();
    assert_eq!(subset.keys().copied().collect::<Vec<_>>(), vec![1]);

    assert!(store.delete(Bucket::Desk, 1).unwrap());
    assert!(!store.delete(Bucket::Desk, 1).unwrap());
    assert_eq!(store.all(Bucket::Desk).unwrap().len(), 1);
}

#[test]
fn document_is_keyed_by_id_and_flags_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    store.upsert(Bucket::Desk, &task(2, "keyed")).unwrap();

    let content = std::fs::read_to_string(store.bucket_file(Bucket::Desk)).unwrap();
    assert!(content.contains("\n    \"2\": {"));
    let document: Value = serde_json::from_str(&content).unwrap();
    assert_eq!(document["2"]["description"], "keyed");
    assert_eq!(document["2"]["isTask"], true);
    assert_eq!(document["2"]["_type"], "task");
}

#[test]
fn patch_touches_only_listed_existing_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    store.upsert(Bucket::Desk, &task(1, "one")).unwrap();
    store.upsert(Bucket::Desk, &task(2, "two")).unwrap();

    let patch = BulletPatch {
        is_starred: Some(true),
        ..BulletPatch::default()
    };
    let touched = store.patch(Bucket::Desk, &[2, 9], &patch).unwrap();

    assert_eq!(touched, 1);
    assert!(!store.get(Bucket::Desk, 1).unwrap().unwrap().is_starred);
    assert!(store.get(Bucket::Desk, 2).unwrap().unwrap().is_starred);
}

#[test]
fn patch_leaves_task_state_off_notes() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    store.upsert(Bucket::Desk, &task(1, "task")).unwrap();
    let mut note = Bullet::new(BulletKind::Note, "note");
    note.id = 2;
    store.upsert(Bucket::Desk, &note).unwrap();

    let config = CoreConfig::default();
    let mut desk = Catalog::new(&store, Bucket::Desk, &config);
    let patch = BulletPatch {
        is_complete: Some(true),
        ..BulletPatch::default()
    };
    desk.batch_edit(&[1, 2], &patch).unwrap();

    assert!(store.get(Bucket::Desk, 1).unwrap().unwrap().is_complete);
    let stored_note = store.get(Bucket::Desk, 2).unwrap().unwrap();
    assert!(!stored_note.is_complete);
    assert!(stored_note.validate().is_ok());
}

#[test]
fn upsert_requires_allocated_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();

    let err = store.upsert(Bucket::Desk, &task(0, "unallocated")).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
}

#[test]
fn undecodable_entries_are_skipped_and_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    let legacy = r#"{
        "1": {"_uid": "a", "_type": "task", "description": "fine"},
        "2": {"_uid": "b", "_type": "task", "description": "odd", "schedule": "tomorrow"},
        "zero": {"_uid": "c", "_type": "note", "description": "bad key"}
    }"#;
    std::fs::write(store.bucket_file(Bucket::Desk), legacy).unwrap();

    let loaded = store.all(Bucket::Desk).unwrap();
    assert_eq!(loaded.keys().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(loaded[&1].id, 1);

    store.upsert(Bucket::Desk, &task(3, "new")).unwrap();
    let content = std::fs::read_to_string(store.bucket_file(Bucket::Desk)).unwrap();
    let document: Value = serde_json::from_str(&content).unwrap();
    assert_eq!(document["2"]["schedule"], "tomorrow");
    assert_eq!(document["zero"]["description"], "bad key");
    assert_eq!(document["3"]["description"], "new");
}

#[test]
fn used_ids_include_undecodable_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    let legacy = r#"{
        "1": {"_uid": "a", "_type": "task", "description": "fine"},
        "4": {"_uid": "b", "_type": "event", "description": "odd", "schedule": "noon"},
        "zero": {"_uid": "c", "_type": "note", "description": "bad key"}
    }"#;
    std::fs::write(store.bucket_file(Bucket::Desk), legacy).unwrap();

    assert_eq!(store.all(Bucket::Desk).unwrap().len(), 1);
    assert_eq!(store.used_ids(Bucket::Desk).unwrap(), vec![1, 4]);
}

#[test]
fn allocated_ids_never_land_on_undecodable_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    let legacy = r#"{
        "1": {"_uid": "a", "_type": "task", "description": "groceries"},
        "2": {"_uid": "b", "_type": "event", "description": "dentist", "schedule": "tomorrow 10am"}
    }"#;
    std::fs::write(store.bucket_file(Bucket::Desk), legacy).unwrap();
    let config = CoreConfig::default();
    let mut desk = Catalog::load(&store, Bucket::Desk, &config).unwrap();
    assert_eq!(desk.ids(), vec![1]);

    let created = desk
        .set(&Bullet::new(BulletKind::Task, "new"), None)
        .unwrap();

    assert_eq!(created.id, 3);
    let content = std::fs::read_to_string(store.bucket_file(Bucket::Desk)).unwrap();
    let document: Value = serde_json::from_str(&content).unwrap();
    assert_eq!(document["2"]["description"], "dentist");
    assert_eq!(document["2"]["schedule"], "tomorrow 10am");
    assert_eq!(document["3"]["description"], "new");
}

#[test]
fn empty_file_reads_as_empty_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    std::fs::write(store.bucket_file(Bucket::Bin), "  \n").unwrap();

    assert!(store.all(Bucket::Bin).unwrap().is_empty());
}

#[test]
fn malformed_document_is_a_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    std::fs::write(store.bucket_file(Bucket::Archive), "[not json").unwrap();

    assert!(matches!(
        store.all(Bucket::Archive),
        Err(StoreError::Json { .. })
    ));
}

#[test]
fn contexts_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let work = JsonFileStore::open(dir.path(), "work").unwrap();
    let home = JsonFileStore::open(dir.path(), "home").unwrap();

    work.upsert(Bucket::Desk, &task(1, "work item")).unwrap();

    assert_eq!(work.context(), "work");
    assert!(home.all(Bucket::Desk).unwrap().is_empty());
}
