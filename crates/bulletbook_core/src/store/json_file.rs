//! Flat-file JSON backend.
//!
//! # Responsibility
//! - Persist each bucket of a context as one JSON document keyed by id.
//! - Stay readable/writable by the legacy flat-file layout.
//!
//! # Invariants
//! - Every mutation rewrites the whole document through a temp file that is
//!   renamed over the target; readers never observe a half-written file.
//! - Entries this build cannot decode are skipped on read and preserved
//!   verbatim on write.
//! - The document key is authoritative for a bullet's id.

use super::{require_allocated_id, BulletMap, StorageBackend, StoreError, StoreResult};
use crate::model::bucket::Bucket;
use crate::model::bullet::{Bullet, BulletId};
use crate::model::patch::BulletPatch;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const TEMP_DIR_NAME: &str = ".temp";

type RawDocument = Map<String, Value>;

/// JSON store rooted at `<data_dir>/<context>/`.
///
/// Layout: `storage/storage.json` (desk), `archive/archive.json`,
/// `bin/bin.json`, plus a `.temp/` scratch directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
    context: String,
}

impl JsonFileStore {
    /// Opens (and creates when missing) the directory tree of `context`.
    ///
    /// Leftover temp files from an interrupted write are removed.
    pub fn open(data_dir: impl AsRef<Path>, context: &str) -> StoreResult<Self> {
        let context = context.trim();
        if context.is_empty() || context.contains(['/', '\\']) || context.starts_with('.') {
            return Err(StoreError::InvalidData(format!(
                "context name `{context}` is not a valid directory name"
            )));
        }

        let store = Self {
            root: data_dir.as_ref().join(context),
            context: context.to_string(),
        };
        for bucket in Bucket::ALL {
            let dir = store.bucket_dir(bucket);
            std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io { path: dir, source })?;
        }
        let removed = store.clean_temp_dir()?;

        info!(
            "event=store_open module=store status=ok backend=json context={} stale_temp_files={}",
            store.context, removed
        );
        Ok(store)
    }

    /// Directory holding every bucket of this context.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Document path of `bucket`.
    pub fn bucket_file(&self, bucket: Bucket) -> PathBuf {
        self.bucket_dir(bucket).join(file_name(bucket))
    }

    fn bucket_dir(&self, bucket: Bucket) -> PathBuf {
        self.root.join(dir_name(bucket))
    }

    fn temp_dir(&self) -> PathBuf {
        self.root.join(TEMP_DIR_NAME)
    }

    fn clean_temp_dir(&self) -> StoreResult<usize> {
        let dir = self.temp_dir();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let entries = std::fs::read_dir(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut removed = 0;
        for entry in entries {
            let path = entry
                .map_err(|source| StoreError::Io {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if path.is_file() {
                std::fs::remove_file(&path).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn read_document(&self, bucket: Bucket) -> StoreResult<RawDocument> {
        let path = self.bucket_file(bucket);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Json { path, source })
    }

    fn write_document(&self, bucket: Bucket, document: &RawDocument) -> StoreResult<()> {
        let target = self.bucket_file(bucket);
        let temp_dir = self.temp_dir();

        let mut buffer = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
        document
            .serialize(&mut serializer)
            .map_err(|source| StoreError::Json {
                path: target.clone(),
                source,
            })?;

        let mut temp = NamedTempFile::new_in(&temp_dir).map_err(|source| StoreError::Io {
            path: temp_dir.clone(),
            source,
        })?;
        temp.write_all(&buffer)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|source| StoreError::Io {
                path: temp.path().to_path_buf(),
                source,
            })?;
        temp.persist(&target).map_err(|err| StoreError::Io {
            path: target.clone(),
            source: err.error,
        })?;

        debug!(
            "event=store_write module=store status=ok backend=json context={} bucket={} entries={}",
            self.context,
            bucket,
            document.len()
        );
        Ok(())
    }

    fn load(&self, bucket: Bucket, wanted: Option<&[BulletId]>) -> StoreResult<BulletMap> {
        let document = self.read_document(bucket)?;
        let mut bullets = BulletMap::new();
        for (key, value) in document {
            let Some(id) = parse_key(&key) else {
                warn!(
                    "event=store_read module=store status=skipped backend=json context={} bucket={} reason=invalid_key",
                    self.context, bucket
                );
                continue;
            };
            if wanted.is_some_and(|ids| !ids.contains(&id)) {
                continue;
            }
            if let Some(bullet) = self.decode_entry(bucket, id, value) {
                bullets.insert(id, bullet);
            }
        }
        Ok(bullets)
    }

    fn decode_entry(&self, bucket: Bucket, id: BulletId, value: Value) -> Option<Bullet> {
        match serde_json::from_value::<Bullet>(value) {
            Ok(mut bullet) => {
                bullet.id = id;
                Some(bullet)
            }
            Err(err) => {
                warn!(
                    "event=store_read module=store status=skipped backend=json context={} bucket={} id={} reason=undecodable error={}",
                    self.context, bucket, id, err
                );
                None
            }
        }
    }
}

impl StorageBackend for JsonFileStore {
    fn context(&self) -> &str {
        &self.context
    }

    fn all(&self, bucket: Bucket) -> StoreResult<BulletMap> {
        self.load(bucket, None)
    }

    fn used_ids(&self, bucket: Bucket) -> StoreResult<Vec<BulletId>> {
        let document = self.read_document(bucket)?;
        Ok(document.keys().filter_map(|key| parse_key(key)).collect())
    }

    fn get_many(&self, bucket: Bucket, ids: &[BulletId]) -> StoreResult<BulletMap> {
        if ids.is_empty() {
            return Ok(BulletMap::new());
        }
        self.load(bucket, Some(ids))
    }

    fn get(&self, bucket: Bucket, id: BulletId) -> StoreResult<Option<Bullet>> {
        let mut document = self.read_document(bucket)?;
        Ok(document
            .remove(&id.to_string())
            .and_then(|value| self.decode_entry(bucket, id, value)))
    }

    fn upsert(&self, bucket: Bucket, bullet: &Bullet) -> StoreResult<()> {
        require_allocated_id(bullet)?;
        let mut document = self.read_document(bucket)?;
        document.insert(bullet.id.to_string(), encode_entry(bullet)?);
        self.write_document(bucket, &document)
    }

    fn patch(&self, bucket: Bucket, ids: &[BulletId], patch: &BulletPatch) -> StoreResult<usize> {
        if ids.is_empty() || patch.is_empty() {
            return Ok(0);
        }

        let mut document = self.read_document(bucket)?;
        let mut touched = 0;
        for &id in ids {
            let key = id.to_string();
            let Some(value) = document.get(&key).cloned() else {
                continue;
            };
            let Some(mut bullet) = self.decode_entry(bucket, id, value) else {
                continue;
            };
            patch.apply(&mut bullet);
            document.insert(key, encode_entry(&bullet)?);
            touched += 1;
        }

        if touched > 0 {
            self.write_document(bucket, &document)?;
        }
        Ok(touched)
    }

    fn delete(&self, bucket: Bucket, id: BulletId) -> StoreResult<bool> {
        let mut document = self.read_document(bucket)?;
        if document.remove(&id.to_string()).is_none() {
            return Ok(false);
        }
        self.write_document(bucket, &document)?;
        Ok(true)
    }

    fn commit(&self, _bucket: Bucket) -> StoreResult<()> {
        Ok(())
    }
}

fn encode_entry(bullet: &Bullet) -> StoreResult<Value> {
    let mut value =
        serde_json::to_value(bullet).map_err(|err| StoreError::InvalidData(err.to_string()))?;
    if let Value::Object(fields) = &mut value {
        // Legacy readers dispatch on this flag rather than on `_type`.
        fields.insert("isTask".to_string(), Value::Bool(bullet.is_task()));
    }
    Ok(value)
}

fn parse_key(key: &str) -> Option<BulletId> {
    key.trim().parse::<BulletId>().ok().filter(|id| *id > 0)
}

fn dir_name(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::Desk => "storage",
        Bucket::Archive => "archive",
        Bucket::Bin => "bin",
    }
}

fn file_name(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::Desk => "storage.json",
        Bucket::Archive => "archive.json",
        Bucket::Bin => "bin.json",
    }
}
