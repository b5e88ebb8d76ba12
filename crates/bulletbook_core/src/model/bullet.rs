//! Bullet domain model.
//!
//! # Responsibility
//! - Define the canonical record shared by task/note/event/goal/flashcard items.
//! - Provide lifecycle helpers (begin/check/uncheck) dispatched on `kind`.
//!
//! # Invariants
//! - `uid` is assigned once at creation and never changes, even across buckets.
//! - `id` is only meaningful inside the (context, bucket) that currently owns
//!   the bullet; transfers overwrite it.
//! - Task-only state (`is_complete`, `in_progress`, `started_at`) stays unset
//!   on notes.
//!
//! Serialized field names follow the legacy flat-file layout (`_uid`,
//! `_type`, `_createdAt`, camelCase for the rest) so existing JSON stores
//! load unchanged.

use super::clock::{local_date, now_millis};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use thiserror::Error;
use uuid::Uuid;

/// Globally unique, immutable identifier.
pub type BulletUid = String;

/// Human-facing identifier, unique only inside one (context, bucket).
pub type BulletId = u32;

const MS_IN_DAY: i64 = 24 * 60 * 60 * 1000;
const MS_IN_MINUTE: i64 = 60 * 1000;

/// Discriminant for every bullet variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulletKind {
    /// Actionable item with completion and time tracking.
    Task,
    /// Free-form entry, never completable.
    Note,
    /// Task pinned to a point in time.
    Event,
    /// Long-running task that other tasks link to.
    Goal,
    /// Task meant to be reviewed regularly.
    Flashcard,
}

impl BulletKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Note => "note",
            Self::Event => "event",
            Self::Goal => "goal",
            Self::Flashcard => "flashcard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "task" => Some(Self::Task),
            "note" => Some(Self::Note),
            "event" => Some(Self::Event),
            "goal" => Some(Self::Goal),
            "flashcard" => Some(Self::Flashcard),
            _ => None,
        }
    }

    /// Every variant except notes carries task state.
    pub fn is_task(self) -> bool {
        !matches!(self, Self::Note)
    }
}

impl Display for BulletKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority; higher sorts first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    #[default]
    Normal = 1,
    Medium = 2,
    High = 3,
}

impl TryFrom<u8> for Priority {
    type Error = BulletValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Normal),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            other => Err(BulletValidationError::InvalidPriority(other)),
        }
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value as u8
    }
}

/// Validation failures for bullet invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulletValidationError {
    #[error("bullet uid must not be empty")]
    EmptyUid,
    #[error("bullet description must not be blank")]
    BlankDescription,
    #[error("priority must be 1, 2 or 3, got {0}")]
    InvalidPriority(u8),
    #[error("notes cannot carry task state")]
    TaskStateOnNote,
    #[error("only events can be scheduled")]
    ScheduleOnNonEvent,
    #[error("duration and estimate must not be negative")]
    NegativeDuration,
}

/// Canonical record for every trackable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bullet {
    /// Bucket-scoped id. `0` means "not allocated yet".
    #[serde(default)]
    pub id: BulletId,
    #[serde(rename = "_uid")]
    pub uid: BulletUid,
    #[serde(rename = "_type")]
    pub kind: BulletKind,
    /// Unix epoch milliseconds.
    #[serde(rename = "_createdAt", default)]
    pub created_at: i64,
    /// Unix epoch milliseconds.
    #[serde(default)]
    pub updated_at: i64,
    pub description: String,
    /// Base64-encoded markdown body.
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_starred: bool,
    #[serde(default)]
    pub boards: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(rename = "_startedAt", default)]
    pub started_at: Option<i64>,
    /// Milliseconds spent on the task.
    #[serde(default)]
    pub duration: Option<i64>,
    /// Milliseconds planned for the task.
    #[serde(default)]
    pub estimate: Option<i64>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default)]
    pub priority: Priority,
    /// Raw recurrence rule, parsed on demand by `crate::recurrence`.
    #[serde(default)]
    pub repeat: Option<String>,
    /// Unix epoch milliseconds, events only.
    #[serde(default)]
    pub schedule: Option<i64>,
}

impl Bullet {
    /// Creates a bullet with a fresh uid and no allocated id.
    pub fn new(kind: BulletKind, description: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: 0,
            uid: Uuid::new_v4().to_string(),
            kind,
            created_at: now,
            updated_at: now,
            description: description.into(),
            comment: None,
            is_starred: false,
            boards: Vec::new(),
            tags: Vec::new(),
            link: None,
            started_at: None,
            duration: None,
            estimate: None,
            is_complete: false,
            in_progress: false,
            priority: Priority::Normal,
            repeat: None,
            schedule: None,
        }
    }

    /// Creates a bullet under an existing uid (imports, replays).
    pub fn with_uid(
        uid: impl Into<String>,
        kind: BulletKind,
        description: impl Into<String>,
    ) -> Result<Self, BulletValidationError> {
        let uid = uid.into();
        if uid.trim().is_empty() {
            return Err(BulletValidationError::EmptyUid);
        }
        let mut bullet = Self::new(kind, description);
        bullet.uid = uid;
        Ok(bullet)
    }

    pub fn is_task(&self) -> bool {
        self.kind.is_task()
    }

    /// Checks record-level invariants before persistence.
    pub fn validate(&self) -> Result<(), BulletValidationError> {
        if self.uid.trim().is_empty() {
            return Err(BulletValidationError::EmptyUid);
        }
        if self.description.trim().is_empty() {
            return Err(BulletValidationError::BlankDescription);
        }
        if !self.is_task() && (self.is_complete || self.in_progress || self.started_at.is_some())
        {
            return Err(BulletValidationError::TaskStateOnNote);
        }
        if self.schedule.is_some() && self.kind != BulletKind::Event {
            return Err(BulletValidationError::ScheduleOnNonEvent);
        }
        if self.duration.is_some_and(|ms| ms < 0) || self.estimate.is_some_and(|ms| ms < 0) {
            return Err(BulletValidationError::NegativeDuration);
        }
        Ok(())
    }

    /// Toggles in-progress state at `now`; returns `false` for notes.
    ///
    /// Pausing adds the elapsed time since the last start to `duration`.
    pub fn begin_at(&mut self, now: i64) -> bool {
        if !self.is_task() {
            return false;
        }

        self.is_complete = false;
        self.in_progress = !self.in_progress;

        if self.in_progress {
            self.started_at = Some(now);
        } else if let Some(started) = self.started_at.take() {
            let elapsed = (now - started).max(0);
            self.duration = Some(self.duration.unwrap_or(0) + elapsed);
        }
        true
    }

    pub fn begin(&mut self) -> bool {
        self.begin_at(now_millis())
    }

    /// Marks the task complete at `now`. Idempotent.
    ///
    /// Duration precedence: explicit minutes, then elapsed time since
    /// `started_at`, then the estimate.
    pub fn check_at(&mut self, duration_minutes: Option<i64>, now: i64) -> bool {
        if !self.is_task() || self.is_complete {
            return false;
        }

        let started = self.started_at.take();
        self.is_complete = true;
        self.in_progress = false;
        self.updated_at = now;

        if let Some(explicit) = duration_minutes.and_then(minutes_to_millis) {
            self.duration = Some(explicit);
        } else if let Some(started) = started {
            let elapsed = (now - started).max(0);
            self.duration = Some(self.duration.unwrap_or(0) + elapsed);
        } else if self.duration.unwrap_or(0) == 0 {
            self.duration = self.estimate;
        }
        true
    }

    pub fn check(&mut self, duration_minutes: Option<i64>) -> bool {
        self.check_at(duration_minutes, now_millis())
    }

    /// Reopens a completed task. Idempotent.
    pub fn uncheck_at(&mut self, now: i64) -> bool {
        if !self.is_task() || !self.is_complete {
            return false;
        }
        self.is_complete = false;
        self.updated_at = now;
        true
    }

    pub fn uncheck(&mut self) -> bool {
        self.uncheck_at(now_millis())
    }

    /// Adds a tag unless already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        push_unique(&mut self.tags, tag.into());
    }

    /// Adds a board unless already present.
    pub fn add_board(&mut self, board: impl Into<String>) {
        push_unique(&mut self.boards, board.into());
    }

    /// Whether `label` names one of this bullet's boards or tags.
    pub fn belongs_to(&self, label: &str) -> bool {
        self.boards.iter().any(|board| board == label) || self.tags.iter().any(|tag| tag == label)
    }

    /// Stores `content` as the base64-encoded comment.
    pub fn write_comment(&mut self, content: &str) {
        self.comment = Some(BASE64.encode(content.as_bytes()));
    }

    /// Returns the decoded comment, if any.
    pub fn decode_comment(&self) -> Option<String> {
        let encoded = self.comment.as_deref()?;
        let bytes = BASE64.decode(encoded.trim()).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Whole days since creation, rounded.
    pub fn age_days(&self, now: i64) -> i64 {
        let delta = (now - self.created_at).abs();
        (delta + MS_IN_DAY / 2) / MS_IN_DAY
    }

    /// Local calendar date of the last update.
    pub fn updated_on(&self) -> Option<chrono::NaiveDate> {
        local_date(self.updated_at)
    }
}

fn cmp_by_id(left: &Bullet, right: &Bullet) -> Ordering {
    left.id.cmp(&right.id)
}

/// Highest priority first, notes after tasks, then ascending id.
pub fn cmp_by_priority(left: &Bullet, right: &Bullet) -> Ordering {
    right
        .is_task()
        .cmp(&left.is_task())
        .then_with(|| right.priority.cmp(&left.priority))
        .then_with(|| cmp_by_id(left, right))
}

/// Converts user-entered minutes into milliseconds; non-positive input means "unset".
pub fn minutes_to_millis(minutes: i64) -> Option<i64> {
    if minutes <= 0 {
        None
    } else {
        Some(minutes * MS_IN_MINUTE)
    }
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_to_millis_treats_non_positive_as_unset() {
        assert_eq!(minutes_to_millis(0), None);
        assert_eq!(minutes_to_millis(-1), None);
        assert_eq!(minutes_to_millis(1), Some(60_000));
    }

    #[test]
    fn begin_twice_accumulates_elapsed_duration() {
        let mut task = Bullet::new(BulletKind::Task, "write report");
        assert!(task.begin_at(1_000));
        assert!(task.in_progress);
        assert!(task.begin_at(61_000));
        assert!(!task.in_progress);
        assert_eq!(task.duration, Some(60_000));
        assert_eq!(task.started_at, None);
    }

    #[test]
    fn check_prefers_explicit_then_elapsed_then_estimate() {
        let mut explicit = Bullet::new(BulletKind::Task, "a");
        explicit.check_at(Some(5), 10);
        assert_eq!(explicit.duration, Some(300_000));

        let mut elapsed = Bullet::new(BulletKind::Task, "b");
        elapsed.begin_at(0);
        elapsed.check_at(None, 120_000);
        assert_eq!(elapsed.duration, Some(120_000));
        assert!(!elapsed.in_progress);

        let mut estimated = Bullet::new(BulletKind::Task, "c");
        estimated.estimate = Some(900_000);
        estimated.check_at(None, 10);
        assert_eq!(estimated.duration, Some(900_000));
    }

    #[test]
    fn check_and_uncheck_are_idempotent() {
        let mut task = Bullet::new(BulletKind::Goal, "ship");
        assert!(task.check_at(None, 5));
        assert!(!task.check_at(None, 6));
        assert_eq!(task.updated_at, 5);
        assert!(task.uncheck_at(7));
        assert!(!task.uncheck_at(8));
        assert_eq!(task.updated_at, 7);
    }

    #[test]
    fn notes_ignore_task_lifecycle() {
        let mut note = Bullet::new(BulletKind::Note, "idea");
        assert!(!note.begin_at(1));
        assert!(!note.check_at(None, 1));
        assert!(!note.in_progress);
        assert!(!note.is_complete);
    }

    #[test]
    fn comments_roundtrip_through_base64() {
        let mut note = Bullet::new(BulletKind::Note, "idea");
        note.write_comment("# Heading\n- [ ] sub");
        assert_ne!(note.comment.as_deref(), Some("# Heading\n- [ ] sub"));
        assert_eq!(note.decode_comment().as_deref(), Some("# Heading\n- [ ] sub"));
    }

    #[test]
    fn priority_rejects_out_of_range_values() {
        assert_eq!(Priority::try_from(2), Ok(Priority::Medium));
        assert_eq!(
            Priority::try_from(4),
            Err(BulletValidationError::InvalidPriority(4))
        );
    }

    #[test]
    fn priority_ordering_puts_high_first() {
        let mut low = Bullet::new(BulletKind::Task, "low");
        let mut high = Bullet::new(BulletKind::Task, "high");
        low.priority = Priority::Normal;
        high.priority = Priority::High;
        let mut later = Bullet::new(BulletKind::Task, "later");
        later.priority = Priority::High;
        later.id = 5;
        high.id = 2;
        let note = Bullet::new(BulletKind::Note, "note");
        let mut items = vec![note, later, low, high];
        items.sort_by(cmp_by_priority);
        let order: Vec<&str> = items.iter().map(|item| item.description.as_str()).collect();
        assert_eq!(order, vec!["high", "later", "low", "note"]);
    }
}
