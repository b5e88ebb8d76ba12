//! Relational backend over the `bullets` table.
//!
//! # Responsibility
//! - Map bullets to rows keyed by immutable `uid`.
//! - Scope every statement to the store's context and the requested bucket.
//!
//! # Invariants
//! - `(bucket, context, ctx_id)` is unique; the schema enforces it.
//! - Write paths call `Bullet::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Upserting a known `uid` moves that row, so a transfer write relocates
//!   the bullet and the follow-up source delete finds nothing.

use super::{require_allocated_id, BulletMap, StorageBackend, StoreError, StoreResult};
use crate::model::bucket::Bucket;
use crate::model::bullet::{Bullet, BulletId, BulletKind, Priority};
use crate::model::patch::{dedup_preserving_order, BulletPatch};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, ToSql};

const BULLET_SELECT_SQL: &str = "SELECT
    uid,
    ctx_id,
    bullet_type,
    is_starred,
    is_complete,
    in_progress,
    description,
    comment,
    link,
    priority,
    repeat,
    boards,
    tags,
    started_at,
    duration,
    estimate,
    schedule,
    created_at,
    updated_at
FROM bullets";

/// SQLite-backed store for one context.
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
    context: String,
}

impl<'conn> SqliteStore<'conn> {
    /// Wraps a migrated connection (see [`crate::db::open_db`]).
    pub fn new(conn: &'conn Connection, context: impl Into<String>) -> Self {
        Self {
            conn,
            context: context.into(),
        }
    }

    /// Number of rows stored under `uid` anywhere in this context.
    pub fn count_uid(&self, uid: &str) -> StoreResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM bullets WHERE context = ?1 AND uid = ?2;",
            params![self.context, uid],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn query_bullets(&self, sql: &str, bind_values: Vec<Value>) -> StoreResult<BulletMap> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut bullets = BulletMap::new();
        while let Some(row) = rows.next()? {
            let bullet = parse_bullet_row(row)?;
            bullets.insert(bullet.id, bullet);
        }
        Ok(bullets)
    }

    fn scope_values(&self, bucket: Bucket) -> Vec<Value> {
        vec![
            Value::Text(self.context.clone()),
            Value::Text(bucket.as_str().to_string()),
        ]
    }
}

impl StorageBackend for SqliteStore<'_> {
    fn context(&self) -> &str {
        &self.context
    }

    fn all(&self, bucket: Bucket) -> StoreResult<BulletMap> {
        let sql = format!("{BULLET_SELECT_SQL} WHERE context = ? AND bucket = ? ORDER BY ctx_id");
        self.query_bullets(&sql, self.scope_values(bucket))
    }

    fn used_ids(&self, bucket: Bucket) -> StoreResult<Vec<BulletId>> {
        let mut stmt = self.conn.prepare(
            "SELECT ctx_id FROM bullets WHERE context = ?1 AND bucket = ?2 ORDER BY ctx_id;",
        )?;
        let ids = stmt
            .query_map(params![self.context, bucket.as_str()], |row| row.get::<_, BulletId>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn get_many(&self, bucket: Bucket, ids: &[BulletId]) -> StoreResult<BulletMap> {
        if ids.is_empty() {
            return Ok(BulletMap::new());
        }
        let sql = format!(
            "{BULLET_SELECT_SQL} WHERE context = ? AND bucket = ? AND ctx_id IN ({}) ORDER BY ctx_id",
            placeholders(ids.len())
        );
        let mut bind_values = self.scope_values(bucket);
        bind_values.extend(ids.iter().map(|id| Value::Integer(i64::from(*id))));
        self.query_bullets(&sql, bind_values)
    }

    fn get(&self, bucket: Bucket, id: BulletId) -> StoreResult<Option<Bullet>> {
        let sql = format!("{BULLET_SELECT_SQL} WHERE context = ?1 AND bucket = ?2 AND ctx_id = ?3;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![self.context, bucket.as_str(), id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_bullet_row(row)?));
        }
        Ok(None)
    }

    fn upsert(&self, bucket: Bucket, bullet: &Bullet) -> StoreResult<()> {
        require_allocated_id(bullet)?;
        bullet.validate()?;

        let boards = encode_list(&bullet.boards)?;
        let tags = encode_list(&bullet.tags)?;
        let tx = self.conn.unchecked_transaction()?;

        // Whatever else occupies the target id is replaced, as in the flat-file store.
        tx.execute(
            "DELETE FROM bullets
             WHERE context = ?1 AND bucket = ?2 AND ctx_id = ?3 AND uid <> ?4;",
            params![self.context, bucket.as_str(), bullet.id, bullet.uid],
        )?;
        tx.execute(
            "INSERT INTO bullets (
                uid,
                ctx_id,
                context,
                bucket,
                bullet_type,
                is_task,
                is_starred,
                is_complete,
                in_progress,
                description,
                comment,
                link,
                priority,
                repeat,
                boards,
                tags,
                started_at,
                duration,
                estimate,
                schedule,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
            ON CONFLICT(uid) DO UPDATE SET
                ctx_id = excluded.ctx_id,
                context = excluded.context,
                bucket = excluded.bucket,
                bullet_type = excluded.bullet_type,
                is_task = excluded.is_task,
                is_starred = excluded.is_starred,
                is_complete = excluded.is_complete,
                in_progress = excluded.in_progress,
                description = excluded.description,
                comment = excluded.comment,
                link = excluded.link,
                priority = excluded.priority,
                repeat = excluded.repeat,
                boards = excluded.boards,
                tags = excluded.tags,
                started_at = excluded.started_at,
                duration = excluded.duration,
                estimate = excluded.estimate,
                schedule = excluded.schedule,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at;",
            params![
                bullet.uid,
                bullet.id,
                self.context,
                bucket.as_str(),
                bullet.kind.as_str(),
                bullet.is_task(),
                bullet.is_starred,
                bullet.is_complete,
                bullet.in_progress,
                bullet.description,
                bullet.comment,
                bullet.link,
                u8::from(bullet.priority),
                bullet.repeat,
                boards,
                tags,
                bullet.started_at,
                bullet.duration,
                bullet.estimate,
                bullet.schedule,
                bullet.created_at,
                bullet.updated_at,
            ],
        )?;
        tx.commit()?;

        debug!(
            "event=store_write module=store status=ok backend=sqlite context={} bucket={} id={}",
            self.context, bucket, bullet.id
        );
        Ok(())
    }

    fn patch(&self, bucket: Bucket, ids: &[BulletId], patch: &BulletPatch) -> StoreResult<usize> {
        if ids.is_empty() || patch.is_empty() {
            return Ok(0);
        }

        let mut updates: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(description) = &patch.description {
            updates.push("description = ?");
            values.push(Box::new(description.clone()));
        }
        if let Some(comment) = &patch.comment {
            updates.push("comment = ?");
            values.push(Box::new(comment.clone()));
        }
        if let Some(is_starred) = patch.is_starred {
            updates.push("is_starred = ?");
            values.push(Box::new(is_starred));
        }
        if let Some(boards) = &patch.boards {
            updates.push("boards = ?");
            values.push(Box::new(encode_list(&dedup_preserving_order(boards))?));
        }
        if let Some(tags) = &patch.tags {
            updates.push("tags = ?");
            values.push(Box::new(encode_list(&dedup_preserving_order(tags))?));
        }
        if let Some(link) = &patch.link {
            updates.push("link = ?");
            values.push(Box::new(link.clone()));
        }
        if let Some(priority) = patch.priority {
            updates.push("priority = ?");
            values.push(Box::new(u8::from(priority)));
        }
        // Task state never lands on notes, matching `Bullet::validate`.
        if let Some(is_complete) = patch.is_complete {
            updates.push("is_complete = CASE WHEN is_task = 1 THEN ? ELSE 0 END");
            values.push(Box::new(is_complete));
        }
        if let Some(in_progress) = patch.in_progress {
            updates.push("in_progress = CASE WHEN is_task = 1 THEN ? ELSE 0 END");
            values.push(Box::new(in_progress));
        }
        if let Some(started_at) = patch.started_at {
            updates.push("started_at = CASE WHEN is_task = 1 THEN ? ELSE NULL END");
            values.push(Box::new(started_at));
        }
        if let Some(duration) = patch.duration {
            updates.push("duration = ?");
            values.push(Box::new(duration));
        }
        if let Some(estimate) = patch.estimate {
            updates.push("estimate = ?");
            values.push(Box::new(estimate));
        }
        if let Some(repeat) = &patch.repeat {
            updates.push("repeat = ?");
            values.push(Box::new(repeat.clone()));
        }
        if let Some(schedule) = patch.schedule {
            updates.push("schedule = CASE WHEN bullet_type = 'event' THEN ? ELSE NULL END");
            values.push(Box::new(schedule));
        }
        if let Some(updated_at) = patch.updated_at {
            updates.push("updated_at = ?");
            values.push(Box::new(updated_at));
        }

        values.push(Box::new(self.context.clone()));
        values.push(Box::new(bucket.as_str()));
        for id in ids {
            values.push(Box::new(*id));
        }

        let sql = format!(
            "UPDATE bullets SET {} WHERE context = ? AND bucket = ? AND ctx_id IN ({})",
            updates.join(", "),
            placeholders(ids.len())
        );
        let values_ref: Vec<&dyn ToSql> = values.iter().map(|value| value.as_ref()).collect();
        let changed = self.conn.execute(&sql, values_ref.as_slice())?;

        debug!(
            "event=store_patch module=store status=ok backend=sqlite context={} bucket={} fields={} changed={}",
            self.context,
            bucket,
            patch.changed_fields().join(","),
            changed
        );
        Ok(changed)
    }

    fn delete(&self, bucket: Bucket, id: BulletId) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM bullets WHERE context = ?1 AND bucket = ?2 AND ctx_id = ?3;",
            params![self.context, bucket.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    fn commit(&self, _bucket: Bucket) -> StoreResult<()> {
        Ok(())
    }
}

fn parse_bullet_row(row: &Row<'_>) -> StoreResult<Bullet> {
    let type_text: String = row.get("bullet_type")?;
    let kind = BulletKind::parse(&type_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid bullet type `{type_text}` in bullets.bullet_type"))
    })?;

    let priority_value: u8 = row.get("priority")?;
    let priority = Priority::try_from(priority_value)?;

    let bullet = Bullet {
        id: row.get("ctx_id")?,
        uid: row.get("uid")?,
        kind,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        description: row.get("description")?,
        comment: row.get("comment")?,
        is_starred: row.get("is_starred")?,
        boards: decode_list(row, "boards")?,
        tags: decode_list(row, "tags")?,
        link: row.get("link")?,
        started_at: row.get("started_at")?,
        duration: row.get("duration")?,
        estimate: row.get("estimate")?,
        is_complete: row.get("is_complete")?,
        in_progress: row.get("in_progress")?,
        priority,
        repeat: row.get("repeat")?,
        schedule: row.get("schedule")?,
    };
    bullet.validate()?;
    Ok(bullet)
}

fn encode_list(values: &[String]) -> StoreResult<String> {
    serde_json::to_string(values).map_err(|err| StoreError::InvalidData(err.to_string()))
}

fn decode_list(row: &Row<'_>, column: &str) -> StoreResult<Vec<String>> {
    let text: String = row.get(column)?;
    serde_json::from_str(&text).map_err(|err| {
        StoreError::InvalidData(format!("invalid list in bullets.{column}: {err}"))
    })
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
