//! Recyclable id allocation.

use crate::model::bullet::BulletId;
use std::collections::BTreeSet;

/// Returns the next id to assign given the ids already used in a bucket.
///
/// Gaps left by transfers and deletes are reused smallest-first; without a
/// gap the result is `max + 1`. Callers must pass the bucket's complete id
/// set, not a partial view.
pub fn generate_id(used: impl IntoIterator<Item = BulletId>) -> BulletId {
    let used: BTreeSet<BulletId> = used.into_iter().filter(|id| *id > 0).collect();

    let mut candidate: BulletId = 1;
    for id in used {
        if id > candidate {
            break;
        }
        candidate = id.saturating_add(1);
    }
    candidate
}
