//! Per-(context, bucket) view over a storage backend.
//!
//! # Responsibility
//! - Combine an in-memory cache with a [`StorageBackend`] for CRUD.
//! - Allocate recyclable ids against the full id set of the bucket.
//!
//! # Invariants
//! - Ids are unique within the catalog's bucket; uids are never rewritten.
//! - A single `get` miss reads the backend once and is not memoized.
//! - Id allocation always sees the bucket's complete id set.
//! - One catalog per (context, bucket) per process; mutations are not
//!   broadcast between instances.

use crate::config::CoreConfig;
use crate::model::bucket::Bucket;
use crate::model::bullet::{Bullet, BulletId, BulletValidationError};
use crate::model::patch::BulletPatch;
use crate::recurrence::RecurrenceError;
use crate::store::{BulletMap, StorageBackend, StoreError};
use log::{debug, info, warn};
use std::time::Instant;
use thiserror::Error;

pub mod id_alloc;
mod query;

pub use id_alloc::generate_id;
pub use query::{parse_ids, CatalogStats, DueTasks};

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Failures surfaced by catalog, transfer and desk operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid id `{0}`")]
    InvalidId(String),
    #[error("no id given")]
    MissingId,
    #[error("no item with id {0}")]
    NotFound(BulletId),
    #[error("item {0} is not a task")]
    NotATask(BulletId),
    #[error("missing description")]
    MissingDescription,
    #[error("no board given")]
    MissingBoard,
    #[error(transparent)]
    Validation(#[from] BulletValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),
    #[error("transfer moved {} item(s) but failed for ids {failed:?}", moved.len())]
    TransferPartialFailure {
        /// `(source id, target id)` pairs that made it across.
        moved: Vec<(BulletId, BulletId)>,
        failed: Vec<BulletId>,
    },
}

/// Cache plus backend for one bucket of one context.
pub struct Catalog<'s, S: StorageBackend + ?Sized> {
    store: &'s S,
    bucket: Bucket,
    items: BulletMap,
    cache_initialized: bool,
    fully_loaded: bool,
    default_board: String,
}

impl<'s, S: StorageBackend + ?Sized> Catalog<'s, S> {
    /// Creates an empty, unloaded catalog.
    pub fn new(store: &'s S, bucket: Bucket, config: &CoreConfig) -> Self {
        Self {
            store,
            bucket,
            items: BulletMap::new(),
            cache_initialized: false,
            fully_loaded: false,
            default_board: config.default_board_label(),
        }
    }

    /// Creates a catalog and loads the whole bucket.
    pub fn load(store: &'s S, bucket: Bucket, config: &CoreConfig) -> CatalogResult<Self> {
        let mut catalog = Self::new(store, bucket, config);
        catalog.load_cache(None)?;
        Ok(catalog)
    }

    pub fn bucket(&self) -> Bucket {
        self.bucket
    }

    pub fn context(&self) -> &str {
        self.store.context()
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    pub fn default_board(&self) -> &str {
        &self.default_board
    }

    /// Whether the cache mirrors the whole bucket.
    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded
    }

    /// Replaces the cache with the bucket's items, or only with `ids` when
    /// given. Returns how many items were loaded.
    pub fn load_cache(&mut self, ids: Option<&[BulletId]>) -> CatalogResult<usize> {
        let started_at = Instant::now();
        if !self.items.is_empty() {
            warn!(
                "event=catalog_load module=catalog status=overwrite context={} bucket={} cached={}",
                self.store.context(),
                self.bucket,
                self.items.len()
            );
        }

        let loaded = match ids {
            Some(ids) => self.store.get_many(self.bucket, ids)?,
            None => self.store.all(self.bucket)?,
        };
        self.items = loaded;
        self.cache_initialized = true;
        self.fully_loaded = ids.is_none();

        info!(
            "event=catalog_load module=catalog status=ok context={} bucket={} scope={} count={} duration_ms={}",
            self.store.context(),
            self.bucket,
            if self.fully_loaded { "all" } else { "ids" },
            self.items.len(),
            started_at.elapsed().as_millis()
        );
        Ok(self.items.len())
    }

    /// Loads the whole bucket unless that already happened.
    pub fn ensure_loaded(&mut self) -> CatalogResult<()> {
        if !self.fully_loaded {
            self.load_cache(None)?;
        }
        Ok(())
    }

    /// Smallest free id of the bucket.
    ///
    /// Always consults the backend: it may hold entries the cache never
    /// loaded, either because the cache is partial or because the entry
    /// could not be decoded.
    pub fn next_id(&mut self) -> CatalogResult<BulletId> {
        if !self.cache_initialized {
            self.load_cache(None)?;
        }
        let stored = self.store.used_ids(self.bucket)?;
        Ok(generate_id(
            stored.into_iter().chain(self.items.keys().copied()),
        ))
    }

    /// Looks up one item. A cache miss reads the backend and does not
    /// populate the cache.
    pub fn get(&self, id: BulletId) -> CatalogResult<Option<Bullet>> {
        if let Some(item) = self.items.get(&id) {
            return Ok(Some(item.clone()));
        }
        debug!(
            "event=catalog_get module=catalog status=miss context={} bucket={} id={}",
            self.store.context(),
            self.bucket,
            id
        );
        Ok(self.store.get(self.bucket, id)?)
    }

    /// Like [`Catalog::get`] but a missing id is an error.
    pub fn require(&self, id: BulletId) -> CatalogResult<Bullet> {
        self.get(id)?.ok_or(CatalogError::NotFound(id))
    }

    /// Serves cached ids from memory and the rest in one backend query.
    pub fn get_multi(&self, ids: &[BulletId]) -> CatalogResult<BulletMap> {
        let mut found = BulletMap::new();
        let mut missing = Vec::new();
        for &id in ids {
            match self.items.get(&id) {
                Some(item) => {
                    found.insert(id, item.clone());
                }
                None if !missing.contains(&id) => missing.push(id),
                None => {}
            }
        }
        if !missing.is_empty() {
            found.extend(self.store.get_many(self.bucket, &missing)?);
        }
        Ok(found)
    }

    /// Stores a copy of `item` under `id`, or under a freshly allocated id.
    ///
    /// The backend write is keyed by id, so retrying the same call is safe.
    pub fn set(&mut self, item: &Bullet, id: Option<BulletId>) -> CatalogResult<Bullet> {
        let id = match id {
            Some(id) if id > 0 => id,
            Some(id) => return Err(CatalogError::InvalidId(id.to_string())),
            None => self.next_id()?,
        };

        let mut stored = item.clone();
        stored.id = id;
        stored.validate()?;
        self.store.upsert(self.bucket, &stored)?;

        if self.cache_initialized {
            self.items.insert(id, stored.clone());
        }
        debug!(
            "event=catalog_set module=catalog status=ok context={} bucket={} id={} kind={}",
            self.store.context(),
            self.bucket,
            id,
            stored.kind
        );
        Ok(stored)
    }

    /// Applies `patch` to one item and persists only the changed fields.
    ///
    /// Returns `Ok(None)` when `id` does not exist.
    pub fn edit(&mut self, id: BulletId, patch: &BulletPatch) -> CatalogResult<Option<Bullet>> {
        let Some(mut item) = self.get(id)? else {
            return Ok(None);
        };
        patch.apply(&mut item);
        item.validate()?;

        self.store.patch(self.bucket, &[id], patch)?;
        if self.items.contains_key(&id) {
            self.items.insert(id, item.clone());
        }
        Ok(Some(item))
    }

    /// Applies `patch` to every listed id present in the bucket.
    ///
    /// Absent ids are skipped; validate them beforehand when that matters.
    pub fn batch_edit(&mut self, ids: &[BulletId], patch: &BulletPatch) -> CatalogResult<usize> {
        if ids.is_empty() || patch.is_empty() {
            return Ok(0);
        }

        let mut updated = Vec::new();
        for id in ids {
            if let Some(item) = self.items.get(id) {
                let mut item = item.clone();
                patch.apply(&mut item);
                item.validate()?;
                updated.push(item);
            }
        }

        let touched = self.store.patch(self.bucket, ids, patch)?;
        for item in updated {
            self.items.insert(item.id, item);
        }
        debug!(
            "event=catalog_batch_edit module=catalog status=ok context={} bucket={} requested={} touched={}",
            self.store.context(),
            self.bucket,
            ids.len(),
            touched
        );
        Ok(touched)
    }

    /// Persists a whole in-memory mutation of an existing item.
    pub fn save(&mut self, item: &Bullet) -> CatalogResult<Bullet> {
        self.set(item, Some(item.id))
    }

    /// Removes an item from cache and backend; returns whether it existed.
    pub fn delete(&mut self, id: BulletId) -> CatalogResult<bool> {
        let cached = self.items.remove(&id).is_some();
        let stored = self.store.delete(self.bucket, id)?;
        debug!(
            "event=catalog_delete module=catalog status=ok context={} bucket={} id={} existed={}",
            self.store.context(),
            self.bucket,
            id,
            cached || stored
        );
        Ok(cached || stored)
    }

    /// Whether the cache holds `key`, read as an id when numeric and as a
    /// uid otherwise.
    pub fn exists(&self, key: &str) -> bool {
        let key = key.trim();
        match key.parse::<BulletId>() {
            Ok(id) => self.items.contains_key(&id),
            Err(_) => self.find_uid(key).is_some(),
        }
    }

    /// Cached item carrying `uid`.
    pub fn find_uid(&self, uid: &str) -> Option<&Bullet> {
        self.items.values().find(|item| item.uid == uid)
    }

    /// Cached ids in ascending order.
    pub fn ids(&self) -> Vec<BulletId> {
        self.items.keys().copied().collect()
    }

    pub fn all(&self) -> &BulletMap {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bullet> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Default board followed by every board in use, first-seen order.
    pub fn boards(&self) -> Vec<String> {
        let mut boards = vec![self.default_board.clone()];
        for item in self.items.values() {
            for board in &item.boards {
                if !boards.contains(board) {
                    boards.push(board.clone());
                }
            }
        }
        boards
    }

    /// Every tag in use, first-seen order.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for item in self.items.values() {
            for tag in &item.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }
        tags
    }

    /// New catalog over the same (context, bucket) holding the cached items
    /// that satisfy `predicate`. Neither this cache nor the backend changes.
    pub fn subcatalog(&self, predicate: impl Fn(&Bullet) -> bool) -> Catalog<'s, S> {
        Catalog {
            store: self.store,
            bucket: self.bucket,
            items: self
                .items
                .iter()
                .filter(|(_, item)| predicate(item))
                .map(|(id, item)| (*id, item.clone()))
                .collect(),
            cache_initialized: true,
            fully_loaded: false,
            default_board: self.default_board.clone(),
        }
    }

    /// Fails with `NotFound` for the first id absent from the cache.
    pub fn validate_ids(&self, ids: &[BulletId]) -> CatalogResult<()> {
        match ids.iter().find(|id| !self.items.contains_key(id)) {
            Some(id) => Err(CatalogError::NotFound(*id)),
            None => Ok(()),
        }
    }

    /// Durability barrier for callers that just finished a batch of writes.
    pub fn flush(&self) -> CatalogResult<()> {
        self.store.commit(self.bucket)?;
        Ok(())
    }

    /// Alias of [`Catalog::flush`].
    pub fn commit(&self) -> CatalogResult<()> {
        self.flush()
    }
}
