//! Core storage and domain logic for bulletbook.
//! Catalogs, stores and services here own every invariant of a journal.

pub mod catalog;
pub mod config;
pub mod db;
pub mod events;
pub mod logging;
pub mod model;
pub mod recurrence;
pub mod service;
pub mod store;

pub use catalog::{parse_ids, Catalog, CatalogError, CatalogResult, CatalogStats};
pub use config::{board_label, CoreConfig, TransferPolicy};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use events::{CoreEvent, EventSink, LogEventSink, NoopEventSink};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::bucket::Bucket;
pub use model::bullet::{Bullet, BulletId, BulletKind, BulletUid, BulletValidationError, Priority};
pub use model::patch::BulletPatch;
pub use recurrence::{RecurrenceError, RecurrenceRule};
pub use service::desk_service::{CheckReport, DeskService};
pub use service::scheduler::{FileRunMarker, RecurrenceScheduler, RunMarker, SchedulerReport, SqliteRunMarker};
pub use service::transfer::{transfer, TransferReport};
pub use store::{JsonFileStore, SqliteStore, StorageBackend, StoreError, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
