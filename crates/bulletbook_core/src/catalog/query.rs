//! Read-only queries over a loaded catalog: filters, grouping, statistics.
//!
//! Every filter returns a subcatalog; nothing here touches the backend.

use super::{Catalog, CatalogError, CatalogResult};
use crate::model::bullet::{Bullet, BulletId};
use crate::model::clock::local_date;
use crate::recurrence::{RecurrenceError, RecurrenceRule};
use crate::store::StorageBackend;
use chrono::NaiveDate;
use log::warn;

/// Counts and time sums over one catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub complete: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub notes: usize,
    /// Sum of task estimates, milliseconds.
    pub estimate: i64,
    /// Sum of task durations, milliseconds.
    pub duration: i64,
}

impl CatalogStats {
    /// Share of completed tasks, 0 to 100.
    pub fn percent_complete(&self) -> u32 {
        let tasks = self.complete + self.in_progress + self.pending;
        if tasks == 0 {
            return 0;
        }
        (100 * self.complete / tasks) as u32
    }
}

/// Recurring tasks due on a date, plus the rules that failed to parse.
pub struct DueTasks<'s, S: StorageBackend + ?Sized> {
    pub due: Catalog<'s, S>,
    pub errors: Vec<(BulletId, RecurrenceError)>,
}

impl<'s, S: StorageBackend + ?Sized> Catalog<'s, S> {
    pub fn notes(&self) -> Catalog<'s, S> {
        self.subcatalog(|item| !item.is_task())
    }

    pub fn tasks(&self) -> Catalog<'s, S> {
        self.subcatalog(Bullet::is_task)
    }

    /// Tasks not completed yet, in-progress ones included.
    pub fn pending(&self) -> Catalog<'s, S> {
        self.subcatalog(|item| item.is_task() && !item.is_complete)
    }

    pub fn completed(&self) -> Catalog<'s, S> {
        self.subcatalog(|item| item.is_task() && item.is_complete)
    }

    pub fn in_progress(&self) -> Catalog<'s, S> {
        self.subcatalog(|item| item.is_task() && item.in_progress)
    }

    pub fn starred(&self) -> Catalog<'s, S> {
        self.subcatalog(|item| item.is_starred)
    }

    /// Items whose description contains any of `terms`, case-insensitively.
    pub fn search<T: AsRef<str>>(&self, terms: &[T]) -> Catalog<'s, S> {
        let needles: Vec<String> = terms
            .iter()
            .map(|term| term.as_ref().trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .collect();
        self.subcatalog(|item| {
            let haystack = item.description.to_lowercase();
            needles.iter().any(|needle| haystack.contains(needle.as_str()))
        })
    }

    /// Items on any of `boards` (boards and tags both count).
    pub fn filter_by_boards<T: AsRef<str>>(&self, boards: &[T]) -> Catalog<'s, S> {
        self.subcatalog(|item| boards.iter().any(|board| item.belongs_to(board.as_ref())))
    }

    /// Narrows the catalog by every recognised attribute in turn; unknown
    /// attributes are ignored.
    pub fn filter_by_attributes<T: AsRef<str>>(&self, attributes: &[T]) -> Catalog<'s, S> {
        let mut filtered = self.subcatalog(|_| true);
        for attribute in attributes {
            filtered = match attribute.as_ref().trim().to_lowercase().as_str() {
                "star" | "starred" => filtered.starred(),
                "done" | "checked" | "complete" => filtered.completed(),
                "progress" | "started" | "begun" => filtered.in_progress(),
                "pending" | "unchecked" | "incomplete" => filtered.pending(),
                "todo" | "task" | "tasks" => filtered.tasks(),
                "note" | "notes" => filtered.notes(),
                _ => filtered,
            };
        }
        filtered
    }

    /// Recurring tasks due on `date`. The first unparsable rule aborts.
    pub fn today_tasks(&self, date: NaiveDate) -> CatalogResult<Catalog<'s, S>> {
        let mut due_ids = Vec::new();
        for item in self.iter().filter(|item| item.is_task()) {
            let Some(rule) = item.repeat.as_deref() else {
                continue;
            };
            if RecurrenceRule::parse(rule)?.matches(date) {
                due_ids.push(item.id);
            }
        }
        Ok(self.subcatalog(|item| due_ids.contains(&item.id)))
    }

    /// Lenient variant of [`Catalog::today_tasks`]: unparsable rules are
    /// collected per item instead of aborting the pass.
    pub fn due_tasks(&self, date: NaiveDate) -> DueTasks<'s, S> {
        let mut due_ids = Vec::new();
        let mut errors = Vec::new();
        for item in self.iter().filter(|item| item.is_task()) {
            let Some(rule) = item.repeat.as_deref() else {
                continue;
            };
            match RecurrenceRule::parse(rule) {
                Ok(parsed) if parsed.matches(date) => due_ids.push(item.id),
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        "event=recurrence_parse module=catalog status=unsupported context={} bucket={} id={}",
                        self.context(),
                        self.bucket(),
                        item.id
                    );
                    errors.push((item.id, err));
                }
            }
        }
        DueTasks {
            due: self.subcatalog(|item| due_ids.contains(&item.id)),
            errors,
        }
    }

    /// Groups items by board or tag in the order of `boards` (defaults to
    /// [`Catalog::boards`]). An item may land in several groups; empty
    /// groups are omitted.
    pub fn group_by_boards(&self, boards: Option<&[String]>) -> Vec<(String, Vec<Bullet>)> {
        let order: Vec<String> = match boards {
            Some(boards) if !boards.is_empty() => boards.to_vec(),
            _ => self.boards(),
        };

        let mut groups: Vec<(String, Vec<Bullet>)> = Vec::new();
        for board in order {
            if groups.iter().any(|(name, _)| *name == board) {
                continue;
            }
            let members: Vec<Bullet> = self
                .iter()
                .filter(|item| item.belongs_to(&board))
                .cloned()
                .collect();
            if !members.is_empty() {
                groups.push((board, members));
            }
        }
        groups
    }

    /// Groups items by the local date of their last update, newest first.
    pub fn group_by_date(&self) -> Vec<(NaiveDate, Vec<Bullet>)> {
        let mut groups: Vec<(NaiveDate, Vec<Bullet>)> = Vec::new();
        for item in self.iter() {
            let Some(date) = local_date(item.updated_at) else {
                continue;
            };
            match groups.iter_mut().find(|(day, _)| *day == date) {
                Some((_, members)) => members.push(item.clone()),
                None => groups.push((date, vec![item.clone()])),
            }
        }
        groups.sort_by(|left, right| right.0.cmp(&left.0));
        groups
    }

    /// Single pass over the cache.
    pub fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats::default();
        for item in self.iter() {
            if !item.is_task() {
                stats.notes += 1;
                continue;
            }
            if item.is_complete {
                stats.complete += 1;
            } else if item.in_progress {
                stats.in_progress += 1;
            } else {
                stats.pending += 1;
            }
            stats.estimate += item.estimate.unwrap_or(0);
            stats.duration += item.duration.unwrap_or(0);
        }
        stats
    }
}

/// Parses user-entered ids, dropping duplicates while keeping order.
pub fn parse_ids<T: AsRef<str>>(inputs: &[T]) -> CatalogResult<Vec<BulletId>> {
    if inputs.is_empty() {
        return Err(CatalogError::MissingId);
    }

    let mut ids = Vec::with_capacity(inputs.len());
    for input in inputs {
        let raw = input.as_ref().trim();
        let id = raw
            .parse::<BulletId>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| CatalogError::InvalidId(raw.to_string()))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ids_dedups_and_rejects_garbage() {
        assert_eq!(parse_ids(&["3", " 1", "3"]).unwrap(), vec![3, 1]);
        assert!(matches!(parse_ids(&["x"]), Err(CatalogError::InvalidId(raw)) if raw == "x"));
        assert!(matches!(parse_ids(&["0"]), Err(CatalogError::InvalidId(_))));
        assert!(matches!(parse_ids::<&str>(&[]), Err(CatalogError::MissingId)));
    }

    #[test]
    fn percent_complete_ignores_notes() {
        let stats = CatalogStats {
            complete: 1,
            pending: 3,
            notes: 10,
            ..CatalogStats::default()
        };
        assert_eq!(stats.percent_complete(), 25);
        assert_eq!(CatalogStats::default().percent_complete(), 0);
    }
}
