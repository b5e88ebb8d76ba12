//! Fire-and-forget notifications about state changes.
//!
//! Sinks must not fail the operation that emitted the event; they return
//! nothing and are expected to swallow their own errors.

use crate::model::bucket::Bucket;
use crate::model::bullet::BulletId;
use log::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    TasksChecked { ids: Vec<BulletId> },
    TasksUnchecked { ids: Vec<BulletId> },
    ItemsMoved {
        from: Bucket,
        to: Bucket,
        ids: Vec<BulletId>,
    },
    ItemsCreated { bucket: Bucket, ids: Vec<BulletId> },
}

impl CoreEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TasksChecked { .. } => "tasks_checked",
            Self::TasksUnchecked { .. } => "tasks_unchecked",
            Self::ItemsMoved { .. } => "items_moved",
            Self::ItemsCreated { .. } => "items_created",
        }
    }

    pub fn ids(&self) -> &[BulletId] {
        match self {
            Self::TasksChecked { ids }
            | Self::TasksUnchecked { ids }
            | Self::ItemsMoved { ids, .. }
            | Self::ItemsCreated { ids, .. } => ids,
        }
    }
}

pub trait EventSink {
    fn emit(&self, event: &CoreEvent);
}

impl<T: EventSink + ?Sized> EventSink for &T {
    fn emit(&self, event: &CoreEvent) {
        (**self).emit(event);
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &CoreEvent) {}
}

/// Writes events to the log as metadata-only records.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: &CoreEvent) {
        let ids = event
            .ids()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        info!(
            "event=core_event module=events status=ok name={} ids={}",
            event.name(),
            ids
        );
    }
}
