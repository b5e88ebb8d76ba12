//! Daily re-creation of recurring tasks.
//!
//! # Responsibility
//! - Copy archived recurring tasks due today back onto the desk.
//! - Gate the pass behind a "first run today" marker.
//!
//! # Invariants
//! - Re-running the pass on the same day against the same state creates
//!   nothing new; the marker is an optimization, not the guarantee.
//! - One bad recurrence rule skips that item only.
//! - The desk is flushed once per pass.

use crate::catalog::{Catalog, CatalogResult};
use crate::config::CoreConfig;
use crate::model::bullet::{Bullet, BulletId, BulletKind};
use crate::recurrence::RecurrenceError;
use crate::store::{StorageBackend, StoreError, StoreResult};
use chrono::NaiveDate;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

/// Job name the scheduler records in run markers.
pub const RECURRENCE_JOB: &str = "recurrence";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Why a due archived task was not recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another archived task with the same description was recreated in
    /// this pass.
    AlreadyRecreated,
    /// The desk already holds an item with the same description.
    OnDesk,
    /// An archived task with the same description was updated (completed)
    /// today.
    UpdatedToday,
}

#[derive(Debug, Default)]
pub struct SchedulerReport {
    /// Desk ids of the new tasks.
    pub created: Vec<BulletId>,
    /// Archive ids that were due but skipped.
    pub skipped: Vec<(BulletId, SkipReason)>,
    /// Archive ids whose rule could not be parsed.
    pub errors: Vec<(BulletId, RecurrenceError)>,
}

/// Persistent "last run" date per job.
pub trait RunMarker {
    fn last_run(&self, job: &str) -> StoreResult<Option<NaiveDate>>;
    fn mark_run(&self, job: &str, date: NaiveDate) -> StoreResult<()>;
}

pub struct RecurrenceScheduler<'c> {
    config: &'c CoreConfig,
}

impl<'c> RecurrenceScheduler<'c> {
    pub fn new(config: &'c CoreConfig) -> Self {
        Self { config }
    }

    /// Recreates archived tasks due on `today` as new desk tasks.
    pub fn run<A, D>(
        &self,
        archive: &mut Catalog<'_, A>,
        desk: &mut Catalog<'_, D>,
        today: NaiveDate,
    ) -> CatalogResult<SchedulerReport>
    where
        A: StorageBackend + ?Sized,
        D: StorageBackend + ?Sized,
    {
        let started_at = Instant::now();
        archive.ensure_loaded()?;
        desk.ensure_loaded()?;

        let due = archive.due_tasks(today);
        let mut report = SchedulerReport {
            errors: due.errors,
            ..SchedulerReport::default()
        };
        let mut recreated: HashSet<String> = HashSet::new();
        // Any archived copy finished today covers every copy of that task.
        let finished_today: HashSet<String> = archive
            .iter()
            .filter(|item| item.updated_on() == Some(today))
            .map(|item| description_key(&item.description))
            .collect();

        for template in due.due.iter() {
            let key = description_key(&template.description);
            let skip = if recreated.contains(&key) {
                Some(SkipReason::AlreadyRecreated)
            } else if desk_has_description(desk, &template.description) {
                Some(SkipReason::OnDesk)
            } else if finished_today.contains(&key) {
                Some(SkipReason::UpdatedToday)
            } else {
                None
            };

            if let Some(reason) = skip {
                debug!(
                    "event=recurrence_skip module=scheduler status=skipped id={} reason={:?}",
                    template.id, reason
                );
                report.skipped.push((template.id, reason));
                continue;
            }

            let created = desk.set(&recreate(template, &self.config.default_board_label()), None)?;
            report.created.push(created.id);
            recreated.insert(key);
        }

        desk.flush()?;
        info!(
            "event=recurrence_run module=scheduler status=ok context={} date={} created={} skipped={} errors={} duration_ms={}",
            desk.context(),
            today.format(DATE_FORMAT),
            report.created.len(),
            report.skipped.len(),
            report.errors.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    /// Runs the pass unless `marker` says it already ran on `today`.
    ///
    /// Returns `Ok(None)` when the pass was skipped.
    pub fn run_if_first_today<A, D, M>(
        &self,
        marker: &M,
        archive: &mut Catalog<'_, A>,
        desk: &mut Catalog<'_, D>,
        today: NaiveDate,
    ) -> CatalogResult<Option<SchedulerReport>>
    where
        A: StorageBackend + ?Sized,
        D: StorageBackend + ?Sized,
        M: RunMarker + ?Sized,
    {
        if marker.last_run(RECURRENCE_JOB)? == Some(today) {
            debug!(
                "event=recurrence_run module=scheduler status=skipped reason=already_ran date={}",
                today.format(DATE_FORMAT)
            );
            return Ok(None);
        }

        let report = self.run(archive, desk, today)?;
        marker.mark_run(RECURRENCE_JOB, today)?;
        Ok(Some(report))
    }
}

fn description_key(description: &str) -> String {
    description.trim().to_lowercase()
}

fn desk_has_description<D: StorageBackend + ?Sized>(desk: &Catalog<'_, D>, description: &str) -> bool {
    let key = description_key(description);
    desk.search(&[description.trim()])
        .iter()
        .any(|item| description_key(&item.description) == key)
}

fn recreate(template: &Bullet, default_board: &str) -> Bullet {
    let mut task = Bullet::new(BulletKind::Task, template.description.clone());
    task.boards = if template.boards.is_empty() {
        vec![default_board.to_string()]
    } else {
        template.boards.clone()
    };
    task.tags = template.tags.clone();
    task.priority = template.priority;
    task.link = template.link.clone();
    task.estimate = template.estimate;
    task.repeat = template.repeat.clone();
    task
}

/// Run marker kept as a small JSON document (`{"job": "YYYY-MM-DD"}`).
#[derive(Debug, Clone)]
pub struct FileRunMarker {
    path: PathBuf,
}

impl FileRunMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StoreResult<BTreeMap<String, String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }
}

impl RunMarker for FileRunMarker {
    fn last_run(&self, job: &str) -> StoreResult<Option<NaiveDate>> {
        let markers = self.read()?;
        Ok(markers
            .get(job)
            .and_then(|value| NaiveDate::parse_from_str(value, DATE_FORMAT).ok()))
    }

    fn mark_run(&self, job: &str, date: NaiveDate) -> StoreResult<()> {
        let mut markers = self.read()?;
        markers.insert(job.to_string(), date.format(DATE_FORMAT).to_string());

        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;

        let content = serde_json::to_vec_pretty(&markers).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let mut temp = NamedTempFile::new_in(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
        temp.write_all(&content).map_err(|source| StoreError::Io {
            path: temp.path().to_path_buf(),
            source,
        })?;
        temp.persist(&self.path).map_err(|err| StoreError::Io {
            path: self.path.clone(),
            source: err.error,
        })?;
        Ok(())
    }
}

/// Run marker stored in the `run_markers` table.
pub struct SqliteRunMarker<'conn> {
    conn: &'conn Connection,
    context: String,
}

impl<'conn> SqliteRunMarker<'conn> {
    pub fn new(conn: &'conn Connection, context: impl Into<String>) -> Self {
        Self {
            conn,
            context: context.into(),
        }
    }
}

impl RunMarker for SqliteRunMarker<'_> {
    fn last_run(&self, job: &str) -> StoreResult<Option<NaiveDate>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT last_run_on FROM run_markers WHERE context = ?1 AND job = ?2;",
                params![self.context, job],
                |row| row.get(0),
            )
            .optional()?;
        match value {
            Some(text) => NaiveDate::parse_from_str(&text, DATE_FORMAT)
                .map(Some)
                .map_err(|_| {
                    StoreError::InvalidData(format!(
                        "invalid date `{text}` in run_markers.last_run_on"
                    ))
                }),
            None => Ok(None),
        }
    }

    fn mark_run(&self, job: &str, date: NaiveDate) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO run_markers (context, job, last_run_on)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(context, job) DO UPDATE SET last_run_on = excluded.last_run_on;",
            params![self.context, job, date.format(DATE_FORMAT).to_string()],
        )?;
        Ok(())
    }
}
