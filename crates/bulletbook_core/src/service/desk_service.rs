//! Desk use-cases over the desk, archive and bin catalogs of one context.
//!
//! # Responsibility
//! - Turn command input into catalog mutations.
//! - Route bucket moves through the transfer protocol.
//! - Emit fire-and-forget events after state changes.
//!
//! # Invariants
//! - Ids are validated against the owning bucket before anything is written.
//! - The service stays storage-agnostic; it only sees [`StorageBackend`].

use crate::catalog::{Catalog, CatalogError, CatalogResult, CatalogStats};
use crate::config::{board_label, CoreConfig};
use crate::events::{CoreEvent, EventSink, NoopEventSink};
use crate::model::bucket::Bucket;
use crate::model::bullet::{cmp_by_priority, minutes_to_millis, Bullet, BulletId, BulletKind, Priority};
use crate::model::clock::now_millis;
use crate::model::patch::BulletPatch;
use crate::recurrence::RecurrenceRule;
use crate::service::input::{parse_input, tag_label, ParsedInput};
use crate::service::scheduler::{RecurrenceScheduler, RunMarker, SchedulerReport};
use crate::service::transfer::{transfer, TransferReport};
use crate::store::StorageBackend;
use chrono::NaiveDate;

const FLASHCARD_TAG: &str = "+srr";
const FLASHCARD_DECK_PREFIX: &str = "@deck.";

/// Result of toggling completion on a set of tasks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub checked: Vec<BulletId>,
    pub unchecked: Vec<BulletId>,
    /// Checked tasks whose recorded duration exceeds the configured
    /// threshold, with that duration in milliseconds.
    pub suspicious: Vec<(BulletId, i64)>,
}

/// Use-case service for one context.
pub struct DeskService<'s, S: StorageBackend + ?Sized, E: EventSink = NoopEventSink> {
    config: CoreConfig,
    desk: Catalog<'s, S>,
    archive: Catalog<'s, S>,
    bin: Catalog<'s, S>,
    events: E,
}

impl<'s, S: StorageBackend + ?Sized> DeskService<'s, S, NoopEventSink> {
    /// Opens the service without event notifications.
    pub fn open(store: &'s S, config: &CoreConfig) -> CatalogResult<Self> {
        Self::with_events(store, config, NoopEventSink)
    }
}

impl<'s, S: StorageBackend + ?Sized, E: EventSink> DeskService<'s, S, E> {
    /// Opens the service and loads the desk. Archive and bin load on first use.
    pub fn with_events(store: &'s S, config: &CoreConfig, events: E) -> CatalogResult<Self> {
        Ok(Self {
            config: config.clone(),
            desk: Catalog::load(store, Bucket::Desk, config)?,
            archive: Catalog::new(store, Bucket::Archive, config),
            bin: Catalog::new(store, Bucket::Bin, config),
            events,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn desk(&self) -> &Catalog<'s, S> {
        &self.desk
    }

    pub fn archive(&mut self) -> CatalogResult<&Catalog<'s, S>> {
        self.archive.ensure_loaded()?;
        Ok(&self.archive)
    }

    pub fn bin(&mut self) -> CatalogResult<&Catalog<'s, S>> {
        self.bin.ensure_loaded()?;
        Ok(&self.bin)
    }

    pub fn create_task<T: AsRef<str>>(&mut self, words: &[T]) -> CatalogResult<Bullet> {
        let input = parse_input(words, &self.config.default_board)?;
        let task = build(BulletKind::Task, input);
        self.create(task)
    }

    pub fn create_note<T: AsRef<str>>(&mut self, words: &[T]) -> CatalogResult<Bullet> {
        let input = parse_input(words, &self.config.default_board)?;
        let note = build(BulletKind::Note, input);
        self.create(note)
    }

    /// Creates an event on the calendar board at `schedule` (epoch ms).
    pub fn create_event<T: AsRef<str>>(
        &mut self,
        words: &[T],
        schedule: i64,
        estimate_minutes: Option<i64>,
    ) -> CatalogResult<Bullet> {
        let input = parse_input(words, &self.config.event_board)?;
        let mut event = build(BulletKind::Event, input);
        event.boards = vec![self.config.event_board_label()];
        event.schedule = Some(schedule);
        event.estimate = estimate_minutes.and_then(minutes_to_millis);
        self.create(event)
    }

    /// Creates a goal; goals always live on the goal board.
    pub fn create_goal<T: AsRef<str>>(&mut self, words: &[T]) -> CatalogResult<Bullet> {
        let input = parse_input(words, &self.config.goal_board)?;
        let mut goal = build(BulletKind::Goal, input);
        goal.boards = vec![self.config.goal_board_label()];
        self.create(goal)
    }

    /// Creates a flashcard; boards become decks and the card is tagged for review.
    pub fn create_flashcard<T: AsRef<str>>(
        &mut self,
        words: &[T],
        link: Option<String>,
    ) -> CatalogResult<Bullet> {
        let input = parse_input(words, &self.config.default_board)?;
        let mut card = build(BulletKind::Flashcard, input);
        card.boards = card
            .boards
            .iter()
            .map(|board| format!("{FLASHCARD_DECK_PREFIX}{}", board.trim_start_matches('@')))
            .collect();
        card.add_tag(FLASHCARD_TAG);
        card.link = link;
        self.create(card)
    }

    fn create(&mut self, item: Bullet) -> CatalogResult<Bullet> {
        let stored = self.desk.set(&item, None)?;
        self.desk.flush()?;
        self.events.emit(&CoreEvent::ItemsCreated {
            bucket: Bucket::Desk,
            ids: vec![stored.id],
        });
        Ok(stored)
    }

    /// Toggles completion: open tasks are checked, complete ones reopened.
    /// Notes are ignored.
    pub fn check_tasks(
        &mut self,
        ids: &[BulletId],
        duration_minutes: Option<i64>,
    ) -> CatalogResult<CheckReport> {
        self.desk.validate_ids(ids)?;

        let now = now_millis();
        let threshold = self.config.suspicious_duration_ms();
        let mut report = CheckReport::default();
        for &id in ids {
            let mut task = self.desk.require(id)?;
            if !task.is_task() {
                continue;
            }
            if task.is_complete {
                task.uncheck_at(now);
                report.unchecked.push(id);
            } else {
                task.check_at(duration_minutes, now);
                report.checked.push(id);
                if let Some(duration) = task.duration.filter(|ms| *ms > threshold) {
                    report.suspicious.push((id, duration));
                }
            }
            self.desk.save(&task)?;
        }
        self.desk.flush()?;

        if !report.checked.is_empty() {
            self.events.emit(&CoreEvent::TasksChecked {
                ids: report.checked.clone(),
            });
        }
        if !report.unchecked.is_empty() {
            self.events.emit(&CoreEvent::TasksUnchecked {
                ids: report.unchecked.clone(),
            });
        }
        Ok(report)
    }

    /// Overwrites the recorded duration, e.g. after a suspicious check.
    pub fn correct_duration(&mut self, id: BulletId, minutes: i64) -> CatalogResult<Bullet> {
        self.require_task(id)?;
        let patch = BulletPatch {
            duration: Some(minutes_to_millis(minutes)),
            ..BulletPatch::default()
        };
        self.edit(id, &patch)
    }

    /// Starts or pauses each task. Returns `(started, paused)`.
    pub fn begin_tasks(&mut self, ids: &[BulletId]) -> CatalogResult<(Vec<BulletId>, Vec<BulletId>)> {
        self.desk.validate_ids(ids)?;
        let now = now_millis();
        let mut started = Vec::new();
        let mut paused = Vec::new();
        for &id in ids {
            let mut task = self.desk.require(id)?;
            if !task.begin_at(now) {
                continue;
            }
            if task.in_progress {
                started.push(id);
            } else {
                paused.push(id);
            }
            self.desk.save(&task)?;
        }
        self.desk.flush()?;
        Ok((started, paused))
    }

    /// Toggles the star on each item. Returns `(starred, unstarred)`.
    pub fn star_items(&mut self, ids: &[BulletId]) -> CatalogResult<(Vec<BulletId>, Vec<BulletId>)> {
        self.desk.validate_ids(ids)?;
        let mut starred = Vec::new();
        let mut unstarred = Vec::new();
        for &id in ids {
            let item = self.desk.require(id)?;
            let patch = BulletPatch {
                is_starred: Some(!item.is_starred),
                ..BulletPatch::default()
            };
            self.desk.edit(id, &patch)?;
            if item.is_starred {
                unstarred.push(id);
            } else {
                starred.push(id);
            }
        }
        self.desk.flush()?;
        Ok((starred, unstarred))
    }

    /// Adds `tags` (with or without the `+` prefix) to one item.
    pub fn tag_item<T: AsRef<str>>(&mut self, id: BulletId, tags: &[T]) -> CatalogResult<Bullet> {
        self.desk.validate_ids(&[id])?;
        let mut item = self.desk.require(id)?;
        for tag in tags {
            item.add_tag(tag_label(tag.as_ref()));
        }
        let patch = BulletPatch {
            tags: Some(item.tags),
            ..BulletPatch::default()
        };
        self.edit(id, &patch)
    }

    /// Replaces the boards of every listed item.
    pub fn move_boards<T: AsRef<str>>(&mut self, ids: &[BulletId], boards: &[T]) -> CatalogResult<usize> {
        let boards: Vec<String> = boards
            .iter()
            .map(|board| board.as_ref().trim())
            .filter(|board| !board.is_empty() && *board != "@")
            .map(board_label)
            .collect();
        if boards.is_empty() {
            return Err(CatalogError::MissingBoard);
        }
        self.desk.validate_ids(ids)?;

        let patch = BulletPatch {
            boards: Some(boards),
            ..BulletPatch::default()
        };
        let touched = self.desk.batch_edit(ids, &patch)?;
        self.desk.flush()?;
        Ok(touched)
    }

    pub fn edit_description(&mut self, id: BulletId, description: &str) -> CatalogResult<Bullet> {
        let description = description.trim();
        if description.is_empty() {
            return Err(CatalogError::MissingDescription);
        }
        self.desk.validate_ids(&[id])?;
        let patch = BulletPatch {
            description: Some(description.to_string()),
            ..BulletPatch::default()
        };
        self.edit(id, &patch)
    }

    /// Sets the priority of tasks; any note in `ids` aborts the call.
    pub fn set_priority(&mut self, ids: &[BulletId], priority: Priority) -> CatalogResult<usize> {
        self.desk.validate_ids(ids)?;
        for &id in ids {
            self.require_task(id)?;
        }
        let patch = BulletPatch {
            priority: Some(priority),
            ..BulletPatch::default()
        };
        let touched = self.desk.batch_edit(ids, &patch)?;
        self.desk.flush()?;
        Ok(touched)
    }

    /// Sets or clears a task's recurrence rule. Rules are checked up front.
    pub fn set_repeat(&mut self, id: BulletId, rule: Option<&str>) -> CatalogResult<Bullet> {
        self.desk.validate_ids(&[id])?;
        self.require_task(id)?;
        let rule = match rule.map(str::trim).filter(|rule| !rule.is_empty()) {
            Some(rule) => {
                RecurrenceRule::parse(rule)?;
                Some(rule.to_string())
            }
            None => None,
        };
        let patch = BulletPatch {
            repeat: Some(rule),
            ..BulletPatch::default()
        };
        self.edit(id, &patch)
    }

    /// Replaces the comment with `content` (stored base64-encoded).
    pub fn comment(&mut self, id: BulletId, content: &str) -> CatalogResult<Bullet> {
        self.desk.validate_ids(&[id])?;
        let mut item = self.desk.require(id)?;
        item.write_comment(content);
        let patch = BulletPatch {
            comment: Some(item.comment),
            ..BulletPatch::default()
        };
        self.edit(id, &patch)
    }

    /// Links tasks to a goal: each task is starred and tagged with the
    /// goal's description.
    pub fn link_to_goal(&mut self, goal_id: BulletId, task_ids: &[BulletId]) -> CatalogResult<String> {
        let goal = self.desk.require(goal_id)?;
        if goal.kind != BulletKind::Goal {
            return Err(CatalogError::InvalidId(goal_id.to_string()));
        }
        let goal_tag = tag_label(&goal.description.split_whitespace().collect::<String>());

        let tasks = self.desk.get_multi(task_ids)?;
        if let Some(missing) = task_ids.iter().find(|id| !tasks.contains_key(id)) {
            return Err(CatalogError::NotFound(*missing));
        }
        for mut task in tasks.into_values() {
            task.is_starred = true;
            task.add_tag(goal_tag.clone());
            self.desk.save(&task)?;
        }
        self.desk.flush()?;
        Ok(goal_tag)
    }

    /// Moves desk items to the archive.
    pub fn delete_items(&mut self, ids: &[BulletId]) -> CatalogResult<TransferReport> {
        self.desk.validate_ids(ids)?;
        move_items(&mut self.desk, &mut self.archive, ids, &self.config, &self.events)
    }

    /// Moves desk items to the bin.
    pub fn trash_items(&mut self, ids: &[BulletId]) -> CatalogResult<TransferReport> {
        self.desk.validate_ids(ids)?;
        move_items(&mut self.desk, &mut self.bin, ids, &self.config, &self.events)
    }

    /// Moves archived items back to the desk under fresh desk ids.
    pub fn restore_items(&mut self, ids: &[BulletId]) -> CatalogResult<TransferReport> {
        self.archive.ensure_loaded()?;
        self.archive.validate_ids(ids)?;
        move_items(&mut self.archive, &mut self.desk, ids, &self.config, &self.events)
    }

    /// Archives every completed desk task. Returns the archived desk ids.
    pub fn clear(&mut self) -> CatalogResult<Vec<BulletId>> {
        let ids = self.desk.completed().ids();
        if ids.is_empty() {
            return Ok(ids);
        }
        let report = self.delete_items(&ids)?;
        Ok(report.into_result()?.into_iter().map(|(source, _)| source).collect())
    }

    /// Desk items matching any term, grouped by board.
    pub fn find<T: AsRef<str>>(&self, terms: &[T]) -> Vec<(String, Vec<Bullet>)> {
        by_priority(self.desk.search(terms).group_by_boards(None))
    }

    /// Desk items narrowed by attributes (`starred`, `done`, `notes`, ...),
    /// grouped by board.
    pub fn list<T: AsRef<str>>(&self, attributes: &[T]) -> Vec<(String, Vec<Bullet>)> {
        by_priority(self.desk.filter_by_attributes(attributes).group_by_boards(None))
    }

    /// Archived items grouped by the day they were last updated, newest first.
    pub fn archive_by_date(&mut self) -> CatalogResult<Vec<(NaiveDate, Vec<Bullet>)>> {
        self.archive.ensure_loaded()?;
        Ok(self.archive.group_by_date())
    }

    pub fn stats(&self) -> CatalogStats {
        self.desk.stats()
    }

    /// Runs the daily recurrence pass when `marker` allows it.
    pub fn schedule_recurring<M: RunMarker + ?Sized>(
        &mut self,
        marker: &M,
        today: NaiveDate,
    ) -> CatalogResult<Option<SchedulerReport>> {
        let scheduler = RecurrenceScheduler::new(&self.config);
        let report = scheduler.run_if_first_today(marker, &mut self.archive, &mut self.desk, today)?;
        if let Some(report) = &report {
            if !report.created.is_empty() {
                self.events.emit(&CoreEvent::ItemsCreated {
                    bucket: Bucket::Desk,
                    ids: report.created.clone(),
                });
            }
        }
        Ok(report)
    }

    /// Flushes every catalog.
    pub fn flush(&self) -> CatalogResult<()> {
        self.desk.flush()?;
        self.archive.flush()?;
        self.bin.flush()
    }

    fn edit(&mut self, id: BulletId, patch: &BulletPatch) -> CatalogResult<Bullet> {
        let updated = self.desk.edit(id, patch)?.ok_or(CatalogError::NotFound(id))?;
        self.desk.flush()?;
        Ok(updated)
    }

    fn require_task(&self, id: BulletId) -> CatalogResult<Bullet> {
        let item = self.desk.require(id)?;
        if !item.is_task() {
            return Err(CatalogError::NotATask(id));
        }
        Ok(item)
    }
}

fn build(kind: BulletKind, input: ParsedInput) -> Bullet {
    let mut item = Bullet::new(kind, input.description);
    item.boards = input.boards;
    item.tags = input.tags;
    if item.is_task() {
        item.priority = input.priority;
    }
    item
}

fn by_priority(mut groups: Vec<(String, Vec<Bullet>)>) -> Vec<(String, Vec<Bullet>)> {
    for (_, items) in &mut groups {
        items.sort_by(cmp_by_priority);
    }
    groups
}

fn move_items<S: StorageBackend + ?Sized, E: EventSink>(
    source: &mut Catalog<'_, S>,
    target: &mut Catalog<'_, S>,
    ids: &[BulletId],
    config: &CoreConfig,
    events: &E,
) -> CatalogResult<TransferReport> {
    let report = transfer(source, target, ids, config.transfer_policy)?;
    source.flush()?;
    target.flush()?;
    if !report.moved.is_empty() {
        events.emit(&CoreEvent::ItemsMoved {
            from: source.bucket(),
            to: target.bucket(),
            ids: report.moved.iter().map(|(source_id, _)| *source_id).collect(),
        });
    }
    Ok(report)
}
