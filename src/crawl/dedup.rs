//! Exactly-once guard for emitted entities.

use crate::crawl::model::EntityKind;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// One visited-set per [`EntityKind`], each behind its own lock.
///
/// [`Deduplicator::should_emit`] is a single locked insert, so among any
/// number of concurrent callers exactly one sees `true` for a given
/// `(kind, id)`.
pub struct Deduplicator {
    seen: [Mutex<HashSet<String>>; EntityKind::ALL.len()],
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Deduplicator {
    pub fn new() -> Self {
        Self {
            seen: std::array::from_fn(|_| Mutex::new(HashSet::new())),
        }
    }

    fn set(&self, kind: EntityKind) -> MutexGuard<'_, HashSet<String>> {
        self.seen[kind.index()]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Mark `id` as seen; `true` only for the first caller.
    pub fn should_emit(&self, kind: EntityKind, id: &str) -> bool {
        let mut set = self.set(kind);
        if set.contains(id) {
            return false;
        }
        set.insert(id.to_string())
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.set(kind).contains(id)
    }

    pub fn seen_count(&self, kind: EntityKind) -> usize {
        self.set(kind).len()
    }

    /// Pre-mark ids, e.g. those already written by a resumed run.
    pub fn seed<I, S>(&self, kind: EntityKind, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(kind).extend(ids.into_iter().map(Into::into));
    }

    /// Sorted copy of every seen id, keyed by kind.
    pub fn snapshot(&self) -> BTreeMap<EntityKind, Vec<String>> {
        EntityKind::ALL
            .into_iter()
            .map(|kind| {
                let mut ids: Vec<String> = self.set(kind).iter().cloned().collect();
                ids.sort_unstable();
                (kind, ids)
            })
            .collect()
    }
}
