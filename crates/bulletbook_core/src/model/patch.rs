//! Partial-field updates for bullets.
//!
//! # Invariants
//! - `None` leaves a field untouched; for nullable fields `Some(None)` clears it.
//! - `uid`, `id` and `kind` are never patchable.
//! - Task state only applies to task kinds and `schedule` only to events.

use super::bullet::{Bullet, BulletKind, Priority};

/// Partial update applied by `Catalog::edit` and `Catalog::batch_edit`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulletPatch {
    pub description: Option<String>,
    pub comment: Option<Option<String>>,
    pub is_starred: Option<bool>,
    pub boards: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub link: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub is_complete: Option<bool>,
    pub in_progress: Option<bool>,
    pub started_at: Option<Option<i64>>,
    pub duration: Option<Option<i64>>,
    pub estimate: Option<Option<i64>>,
    pub repeat: Option<Option<String>>,
    pub schedule: Option<Option<i64>>,
    pub updated_at: Option<i64>,
}

impl BulletPatch {
    /// Captures every mutable field of `bullet`, for persisting a whole
    /// in-memory mutation through the partial-update path.
    pub fn from_bullet(bullet: &Bullet) -> Self {
        Self {
            description: Some(bullet.description.clone()),
            comment: Some(bullet.comment.clone()),
            is_starred: Some(bullet.is_starred),
            boards: Some(bullet.boards.clone()),
            tags: Some(bullet.tags.clone()),
            link: Some(bullet.link.clone()),
            priority: Some(bullet.priority),
            is_complete: Some(bullet.is_complete),
            in_progress: Some(bullet.in_progress),
            started_at: Some(bullet.started_at),
            duration: Some(bullet.duration),
            estimate: Some(bullet.estimate),
            repeat: Some(bullet.repeat.clone()),
            schedule: Some(bullet.schedule),
            updated_at: Some(bullet.updated_at),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Names of the fields this patch touches, in storage column order.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.description.is_some() {
            fields.push("description");
        }
        if self.comment.is_some() {
            fields.push("comment");
        }
        if self.is_starred.is_some() {
            fields.push("is_starred");
        }
        if self.boards.is_some() {
            fields.push("boards");
        }
        if self.tags.is_some() {
            fields.push("tags");
        }
        if self.link.is_some() {
            fields.push("link");
        }
        if self.priority.is_some() {
            fields.push("priority");
        }
        if self.is_complete.is_some() {
            fields.push("is_complete");
        }
        if self.in_progress.is_some() {
            fields.push("in_progress");
        }
        if self.started_at.is_some() {
            fields.push("started_at");
        }
        if self.duration.is_some() {
            fields.push("duration");
        }
        if self.estimate.is_some() {
            fields.push("estimate");
        }
        if self.repeat.is_some() {
            fields.push("repeat");
        }
        if self.schedule.is_some() {
            fields.push("schedule");
        }
        if self.updated_at.is_some() {
            fields.push("updated_at");
        }
        fields
    }

    /// Applies the patch to `bullet` in place.
    pub fn apply(&self, bullet: &mut Bullet) {
        if let Some(description) = &self.description {
            bullet.description = description.clone();
        }
        if let Some(comment) = &self.comment {
            bullet.comment = comment.clone();
        }
        if let Some(is_starred) = self.is_starred {
            bullet.is_starred = is_starred;
        }
        if let Some(boards) = &self.boards {
            bullet.boards = dedup_preserving_order(boards);
        }
        if let Some(tags) = &self.tags {
            bullet.tags = dedup_preserving_order(tags);
        }
        if let Some(link) = &self.link {
            bullet.link = link.clone();
        }
        if let Some(priority) = self.priority {
            bullet.priority = priority;
        }
        // Task state never lands on notes, matching `Bullet::validate`.
        if bullet.is_task() {
            if let Some(is_complete) = self.is_complete {
                bullet.is_complete = is_complete;
            }
            if let Some(in_progress) = self.in_progress {
                bullet.in_progress = in_progress;
            }
            if let Some(started_at) = self.started_at {
                bullet.started_at = started_at;
            }
        }
        if let Some(duration) = self.duration {
            bullet.duration = duration;
        }
        if let Some(estimate) = self.estimate {
            bullet.estimate = estimate;
        }
        if let Some(repeat) = &self.repeat {
            bullet.repeat = repeat.clone();
        }
        if let Some(schedule) = self.schedule.filter(|_| bullet.kind == BulletKind::Event) {
            bullet.schedule = schedule;
        }
        if let Some(updated_at) = self.updated_at {
            bullet.updated_at = updated_at;
        }
    }
}

/// Removes duplicates while keeping first-seen order.
pub fn dedup_preserving_order(values: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !unique.contains(value) {
            unique.push(value.clone());
        }
    }
    unique
}
