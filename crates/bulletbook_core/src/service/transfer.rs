//! Cross-bucket move of bullets.
//!
//! # Responsibility
//! - Move items from a source catalog into a target catalog, reassigning
//!   ids in the target bucket and keeping every uid.
//!
//! # Invariants
//! - The target is fully loaded before the first id is allocated.
//! - Ids assigned within one call never collide; gaps are filled first.
//! - The target write happens before the source delete. A crash in between
//!   duplicates an item, it never loses one.
//! - No cross-item rollback: items moved before a failure stay moved.
//! - `updated_at` is left untouched by the move itself.

use crate::catalog::{Catalog, CatalogError, CatalogResult};
use crate::config::TransferPolicy;
use crate::model::bullet::BulletId;
use crate::store::StorageBackend;
use log::{info, warn};
use std::time::Instant;

/// One item that did not make it across.
#[derive(Debug)]
pub struct TransferFailure {
    pub id: BulletId,
    pub error: CatalogError,
}

/// Outcome of a batch transfer.
#[derive(Debug, Default)]
pub struct TransferReport {
    /// `(source id, target id)` for every moved item, in request order.
    pub moved: Vec<(BulletId, BulletId)>,
    pub failed: Vec<TransferFailure>,
}

impl TransferReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Target id assigned to `source_id`, if it moved.
    pub fn target_id(&self, source_id: BulletId) -> Option<BulletId> {
        self.moved
            .iter()
            .find(|(source, _)| *source == source_id)
            .map(|(_, target)| *target)
    }

    pub fn failed_ids(&self) -> Vec<BulletId> {
        self.failed.iter().map(|failure| failure.id).collect()
    }

    /// Turns any failure into [`CatalogError::TransferPartialFailure`].
    pub fn into_result(self) -> CatalogResult<Vec<(BulletId, BulletId)>> {
        if self.failed.is_empty() {
            return Ok(self.moved);
        }
        let failed = self.failed_ids();
        Err(CatalogError::TransferPartialFailure {
            moved: self.moved,
            failed,
        })
    }
}

/// Moves `ids` from `source` into `target`.
///
/// Errors preparing the target are returned directly; per-item failures
/// end up in the report and, under [`TransferPolicy::Stop`], end the batch.
/// Callers flush both catalogs afterwards.
pub fn transfer<S, T>(
    source: &mut Catalog<'_, S>,
    target: &mut Catalog<'_, T>,
    ids: &[BulletId],
    policy: TransferPolicy,
) -> CatalogResult<TransferReport>
where
    S: StorageBackend + ?Sized,
    T: StorageBackend + ?Sized,
{
    let started_at = Instant::now();
    target.ensure_loaded()?;

    let mut report = TransferReport::default();
    for &id in ids {
        match move_one(source, target, id) {
            Ok(target_id) => report.moved.push((id, target_id)),
            Err(error) => {
                warn!(
                    "event=transfer_item module=transfer status=error context={} from={} to={} id={} error={}",
                    source.context(),
                    source.bucket(),
                    target.bucket(),
                    id,
                    error
                );
                report.failed.push(TransferFailure { id, error });
                if policy == TransferPolicy::Stop {
                    break;
                }
            }
        }
    }

    info!(
        "event=transfer module=transfer status={} context={} from={} to={} moved={} failed={} duration_ms={}",
        if report.is_complete() { "ok" } else { "partial" },
        source.context(),
        source.bucket(),
        target.bucket(),
        report.moved.len(),
        report.failed.len(),
        started_at.elapsed().as_millis()
    );
    Ok(report)
}

fn move_one<S, T>(
    source: &mut Catalog<'_, S>,
    target: &mut Catalog<'_, T>,
    id: BulletId,
) -> CatalogResult<BulletId>
where
    S: StorageBackend + ?Sized,
    T: StorageBackend + ?Sized,
{
    let item = source.require(id)?;
    let target_id = target.next_id()?;
    let stored = target.set(&item, Some(target_id))?;
    source.delete(id)?;
    Ok(stored.id)
}
