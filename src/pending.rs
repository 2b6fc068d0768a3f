//! C4: Pending-Update Map.
//!
//! Coalesces per-task metadata deltas between ingest events and the
//! next updater drain (`spec.md` §4.4). The reference implementation
//! guards the map with a spin lock; `spec.md` §9 explicitly blesses a
//! standard mutex as "a cleaner realization" since hold times are O(1)
//! hash operations and contention is exactly two parties (the ingest
//! loop and the updater's `swap`). This uses `parking_lot::Mutex`,
//! already a teacher dependency, instead of a hand-rolled spin lock.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::task_id::TaskId;

/// An in-memory, unflushed accumulation of metadata changes for one
/// task between updater commits (`spec.md` §3).
#[derive(Debug, Clone, Default)]
pub struct PendingUpdate {
    /// Most-recently-observed non-null title, if any (`spec.md` §4.4:
    /// "any non-null arriving overwrites").
    pub title: Option<String>,
    /// Union of all tags observed since the last drain.
    pub tags: HashSet<String>,
    /// Reports observed for this task since the last drain.
    pub new_report_count: u64,
}

impl PendingUpdate {
    fn merge_in(&mut self, title: Option<&str>, tags: Option<&HashSet<String>>) {
        self.new_report_count += 1;
        if let Some(title) = title {
            self.title = Some(title.to_string());
        }
        if let Some(tags) = tags {
            self.tags.extend(tags.iter().cloned());
        }
    }
}

/// The coalescing map itself: `taskId -> PendingUpdate`.
#[derive(Default)]
pub struct PendingMap {
    inner: Mutex<HashMap<TaskId, PendingUpdate>>,
}

impl PendingMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one report's worth of delta for `task_id`: lookup-or-
    /// insert, bump the count, overwrite the title if non-null, and
    /// union in any tags (`spec.md` §4.4).
    pub fn record(&self, task_id: TaskId, title: Option<&str>, tags: Option<&HashSet<String>>) {
        let mut guard = self.inner.lock();
        guard.entry(task_id).or_default().merge_in(title, tags);
    }

    /// Atomically exchange the current map with an empty one,
    /// returning the drained contents to the updater (`spec.md` §4.4).
    pub fn swap(&self) -> HashMap<TaskId, PendingUpdate> {
        let mut guard = self.inner.lock();
        std::mem::take(&mut *guard)
    }

    /// Whether the map is currently empty, for tests/metrics.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
