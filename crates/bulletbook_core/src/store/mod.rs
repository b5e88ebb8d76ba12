//! Storage backend contract shared by the flat-file and relational stores.
//!
//! # Responsibility
//! - Define the key/bucket persistence API the catalog layer is written against.
//! - Own the error taxonomy for backend I/O failures.
//!
//! # Invariants
//! - A backend instance is scoped to exactly one context.
//! - Within one (context, bucket) the integer id is unique; `upsert` keyed by
//!   id is idempotent under retry.
//! - Every call is synchronous; once it returns the write is durable.

use crate::db::DbError;
use crate::model::bucket::Bucket;
use crate::model::bullet::{Bullet, BulletId, BulletValidationError};
use crate::model::patch::BulletPatch;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

pub mod json_file;
pub mod sqlite;

pub use json_file::JsonFileStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Bullets of one bucket keyed by their bucket-scoped id.
pub type BulletMap = BTreeMap<BulletId, Bullet>;

/// Backend failures. All of them are fatal to the current operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o failure on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed store document `{}`: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("invalid persisted bullet data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Validation(#[from] BulletValidationError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence API over the buckets of one context.
pub trait StorageBackend {
    /// Context every call of this backend is scoped to.
    fn context(&self) -> &str;

    /// Loads every bullet of `bucket`.
    fn all(&self, bucket: Bucket) -> StoreResult<BulletMap>;

    /// Loads the subset of `ids` present in `bucket`, in one round-trip.
    fn get_many(&self, bucket: Bucket, ids: &[BulletId]) -> StoreResult<BulletMap>;

    /// Every id occupied in `bucket`, including entries `all` skips.
    fn used_ids(&self, bucket: Bucket) -> StoreResult<Vec<BulletId>> {
        Ok(self.all(bucket)?.into_keys().collect())
    }

    /// Loads one bullet; `Ok(None)` when the id is unused.
    fn get(&self, bucket: Bucket, id: BulletId) -> StoreResult<Option<Bullet>>;

    /// Inserts or replaces the bullet stored under `bullet.id`.
    ///
    /// The id must already be allocated (non-zero).
    fn upsert(&self, bucket: Bucket, bullet: &Bullet) -> StoreResult<()>;

    /// Writes only the fields set in `patch` for every id present in
    /// `bucket`. Returns how many bullets were touched.
    fn patch(&self, bucket: Bucket, ids: &[BulletId], patch: &BulletPatch) -> StoreResult<usize>;

    /// Removes one bullet; returns whether something was deleted.
    fn delete(&self, bucket: Bucket, id: BulletId) -> StoreResult<bool>;

    /// Durability barrier. Both bundled backends write through, so this
    /// only has to succeed.
    fn commit(&self, bucket: Bucket) -> StoreResult<()>;
}

pub(crate) fn require_allocated_id(bullet: &Bullet) -> StoreResult<()> {
    if bullet.id == 0 {
        return Err(StoreError::InvalidData(format!(
            "bullet {} has no allocated id",
            bullet.uid
        )));
    }
    Ok(())
}
