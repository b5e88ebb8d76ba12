use bulletbook_core::db::open_db_in_memory;
use bulletbook_core::store::{BulletMap, StoreResult};
use bulletbook_core::{
    transfer, Bucket, Bullet, BulletId, BulletKind, BulletPatch, Catalog, CatalogError,
    CoreConfig, JsonFileStore, SqliteStore, StorageBackend, StoreError, TransferPolicy,
};
use std::cell::Cell;
use std::path::PathBuf;

/// Wraps a backend and fails every write once `writes_left` runs out.
struct FailingWrites {
    inner: JsonFileStore,
    writes_left: Cell<usize>,
}

impl FailingWrites {
    fn new(inner: JsonFileStore, writes_left: usize) -> Self {
        Self {
            inner,
            writes_left: Cell::new(writes_left),
        }
    }

    fn spend_write(&self) -> StoreResult<()> {
        match self.writes_left.get() {
            0 => Err(StoreError::Io {
                path: PathBuf::from("target"),
                source: std::io::Error::other("disk full"),
            }),
            left => {
                self.writes_left.set(left - 1);
                Ok(())
            }
        }
    }
}

impl StorageBackend for FailingWrites {
    fn context(&self) -> &str {
        self.inner.context()
    }

    fn all(&self, bucket: Bucket) -> StoreResult<BulletMap> {
        self.inner.all(bucket)
    }

    fn get_many(&self, bucket: Bucket, ids: &[BulletId]) -> StoreResult<BulletMap> {
        self.inner.get_many(bucket, ids)
    }

    fn get(&self, bucket: Bucket, id: BulletId) -> StoreResult<Option<Bullet>> {
        self.inner.get(bucket, id)
    }

    fn upsert(&self, bucket: Bucket, bullet: &Bullet) -> StoreResult<()> {
        self.spend_write()?;
        self.inner.upsert(bucket, bullet)
    }

    fn patch(&self, bucket: Bucket, ids: &[BulletId], patch: &BulletPatch) -> StoreResult<usize> {
        self.spend_write()?;
        self.inner.patch(bucket, ids, patch)
    }

    fn delete(&self, bucket: Bucket, id: BulletId) -> StoreResult<bool> {
        self.inner.delete(bucket, id)
    }

    fn commit(&self, bucket: Bucket) -> StoreResult<()> {
        self.inner.commit(bucket)
    }
}

fn task(description: &str) -> Bullet {
    Bullet::new(BulletKind::Task, description)
}

#[test]
fn moved_items_fill_target_gaps_without_collisions() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    let config = CoreConfig::default();

    let mut archive = Catalog::load(&store, Bucket::Archive, &config).unwrap();
    archive.set(&task("old one"), Some(1)).unwrap();
    archive.set(&task("old three"), Some(3)).unwrap();

    let mut desk = Catalog::load(&store, Bucket::Desk, &config).unwrap();
    let uids: Vec<String> = ["a", "b", "c"]
        .iter()
        .map(|description| desk.set(&task(description), None).unwrap().uid)
        .collect();

    // A fresh, unloaded target must still see ids 1 and 3.
    let mut target = Catalog::new(&store, Bucket::Archive, &config);
    let report = transfer(&mut desk, &mut target, &[2, 3], TransferPolicy::Continue).unwrap();

    assert!(report.is_complete());
    assert_eq!(report.moved, vec![(2, 2), (3, 4)]);
    assert_eq!(report.target_id(3), Some(4));
    assert_eq!(desk.ids(), vec![1]);

    let stored = store.all(Bucket::Archive).unwrap();
    assert_eq!(stored.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(stored[&2].uid, uids[1]);
    assert_eq!(stored[&4].uid, uids[2]);
    assert!(store.get(Bucket::Desk, 2).unwrap().is_none());
}

#[test]
fn transfer_keeps_content_and_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    let config = CoreConfig::default();
    let mut desk = Catalog::load(&store, Bucket::Desk, &config).unwrap();
    let mut bin = Catalog::new(&store, Bucket::Bin, &config);

    let mut item = task("keep my fields");
    item.tags = vec!["+x".to_string()];
    item.updated_at = 42;
    let original = desk.set(&item, None).unwrap();

    transfer(&mut desk, &mut bin, &[1], TransferPolicy::Continue).unwrap();

    let moved = bin.get(1).unwrap().unwrap();
    assert_eq!(moved.uid, original.uid);
    assert_eq!(moved.tags, original.tags);
    assert_eq!(moved.updated_at, 42);
    assert_eq!(moved.created_at, original.created_at);
}

#[test]
fn continue_policy_reports_failures_and_moves_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    let config = CoreConfig::default();
    let mut desk = Catalog::load(&store, Bucket::Desk, &config).unwrap();
    let mut archive = Catalog::new(&store, Bucket::Archive, &config);
    desk.set(&task("one"), None).unwrap();
    desk.set(&task("two"), None).unwrap();

    let report = transfer(&mut desk, &mut archive, &[1, 9, 2], TransferPolicy::Continue).unwrap();

    assert_eq!(report.moved, vec![(1, 1), (2, 2)]);
    assert_eq!(report.failed_ids(), vec![9]);
    assert!(matches!(report.failed[0].error, CatalogError::NotFound(9)));

    match report.into_result() {
        Err(CatalogError::TransferPartialFailure { moved, failed }) => {
            assert_eq!(moved.len(), 2);
            assert_eq!(failed, vec![9]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn stop_policy_ends_the_batch_at_first_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "default").unwrap();
    let config = CoreConfig::default();
    let mut desk = Catalog::load(&store, Bucket::Desk, &config).unwrap();
    let mut archive = Catalog::new(&store, Bucket::Archive, &config);
    desk.set(&task("one"), None).unwrap();
    desk.set(&task("two"), None).unwrap();

    let report = transfer(&mut desk, &mut archive, &[1, 9, 2], TransferPolicy::Stop).unwrap();

    assert_eq!(report.moved, vec![(1, 1)]);
    assert_eq!(report.failed_ids(), vec![9]);
    assert_eq!(desk.ids(), vec![2]);
}

#[test]
fn failed_target_write_leaves_source_item_in_place() {
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();
    let source_store = JsonFileStore::open(source_dir.path(), "default").unwrap();
    let target_store = FailingWrites::new(
        JsonFileStore::open(target_dir.path(), "default").unwrap(),
        1,
    );
    let config = CoreConfig::default();
    let mut desk = Catalog::load(&source_store, Bucket::Desk, &config).unwrap();
    let mut archive = Catalog::new(&target_store, Bucket::Archive, &config);
    for description in ["one", "two", "three"] {
        desk.set(&task(description), None).unwrap();
    }

    let report = transfer(&mut desk, &mut archive, &[1, 2, 3], TransferPolicy::Continue).unwrap();

    assert_eq!(report.moved, vec![(1, 1)]);
    assert_eq!(report.failed_ids(), vec![2, 3]);
    assert!(matches!(
        report.failed[0].error,
        CatalogError::Store(StoreError::Io { .. })
    ));
    assert_eq!(desk.ids(), vec![2, 3]);
    let left_behind = source_store.all(Bucket::Desk).unwrap();
    assert_eq!(left_behind.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
    assert_eq!(left_behind[&2].description, "two");
    let arrived = target_store.inner.all(Bucket::Archive).unwrap();
    assert_eq!(arrived.keys().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(arrived[&1].description, "one");
}

#[test]
fn stop_policy_halts_on_failed_target_write() {
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();
    let source_store = JsonFileStore::open(source_dir.path(), "default").unwrap();
    let target_store = FailingWrites::new(
        JsonFileStore::open(target_dir.path(), "default").unwrap(),
        0,
    );
    let config = CoreConfig::default();
    let mut desk = Catalog::load(&source_store, Bucket::Desk, &config).unwrap();
    let mut bin = Catalog::new(&target_store, Bucket::Bin, &config);
    desk.set(&task("one"), None).unwrap();
    desk.set(&task("two"), None).unwrap();

    let report = transfer(&mut desk, &mut bin, &[1, 2], TransferPolicy::Stop).unwrap();

    assert!(report.moved.is_empty());
    assert_eq!(report.failed_ids(), vec![1]);
    assert_eq!(source_store.all(Bucket::Desk).unwrap().len(), 2);
    assert!(target_store.inner.all(Bucket::Bin).unwrap().is_empty());
}

#[test]
fn sqlite_transfer_leaves_exactly_one_row_per_uid() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteStore::new(&conn, "default");
    let config = CoreConfig::default();
    let mut desk = Catalog::load(&store, Bucket::Desk, &config).unwrap();
    let mut archive = Catalog::load(&store, Bucket::Archive, &config).unwrap();
    archive.set(&task("already archived"), None).unwrap();
    desk.set(&task("first"), None).unwrap();
    let moving = desk.set(&task("second"), None).unwrap();

    let report = transfer(&mut desk, &mut archive, &[2], TransferPolicy::Continue).unwrap();

    assert_eq!(report.moved, vec![(2, 2)]);
    assert_eq!(store.count_uid(&moving.uid).unwrap(), 1);
    assert!(store.get(Bucket::Desk, 2).unwrap().is_none());
    assert_eq!(store.get(Bucket::Archive, 2).unwrap().unwrap().uid, moving.uid);
    assert_eq!(desk.ids(), vec![1]);
}

#[test]
fn transfer_between_two_backends() {
    let dir = tempfile::tempdir().unwrap();
    let files = JsonFileStore::open(dir.path(), "default").unwrap();
    let conn = open_db_in_memory().unwrap();
    let sqlite = SqliteStore::new(&conn, "default");
    let config = CoreConfig::default();

    let mut source = Catalog::load(&files, Bucket::Desk, &config).unwrap();
    let mut target = Catalog::new(&sqlite, Bucket::Desk, &config);
    let item = source.set(&task("migrate me"), None).unwrap();

    let report = transfer(&mut source, &mut target, &[1], TransferPolicy::Continue).unwrap();

    assert!(report.is_complete());
    assert!(files.all(Bucket::Desk).unwrap().is_empty());
    assert_eq!(sqlite.get(Bucket::Desk, 1).unwrap().unwrap().uid, item.uid);
}
