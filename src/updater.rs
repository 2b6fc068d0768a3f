//! C6: Index Updater.
//!
//! A single background worker that periodically drains the
//! pending-update map into the metadata index in one transaction per
//! batch (`spec.md` §4.6). Grounded on the teacher's
//! `src/database/replication.rs` for the "background worker that
//! wakes on an interval, does its thing, logs a status line" shape,
//! adapted to this spec's swap-then-commit loop instead of
//! replication lag polling.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::index::Index;
use crate::pending::{PendingMap, PendingUpdate};
use crate::stats::StoreStats;
use crate::task_id::TaskId;

/// Shared shutdown flag plus a condvar so the updater's idle wait can
/// be woken immediately instead of riding out the rest of `interval`
/// (`spec.md` §5: "shutdown interrupts the updater, which aborts
/// sleep"; `SPEC_FULL.md` §E names this an "AtomicBool/condvar" pair).
#[derive(Default)]
struct ShutdownSignal {
    flag: Mutex<bool>,
    condvar: Condvar,
}

impl ShutdownSignal {
    fn signal(&self) {
        *self.flag.lock() = true;
        self.condvar.notify_all();
    }

    fn is_set(&self) -> bool {
        *self.flag.lock()
    }

    /// Sleep for up to `timeout`, returning early the moment
    /// `signal()` is called from another thread.
    fn wait(&self, timeout: Duration) {
        let mut guard = self.flag.lock();
        if *guard {
            return;
        }
        let _ = self.condvar.wait_for(&mut guard, timeout);
    }
}

/// Handle to the running updater thread.
pub struct Updater {
    shutdown: Arc<ShutdownSignal>,
    handle: Option<JoinHandle<()>>,
}

impl Updater {
    /// Spawn the updater thread, draining `pending` into `index`
    /// every `interval` (`spec.md` §4.6 step 3).
    pub fn spawn(
        pending: Arc<PendingMap>,
        index: Arc<Index>,
        stats: Arc<StoreStats>,
        interval: Duration,
    ) -> Self {
        let shutdown = Arc::new(ShutdownSignal::default());
        let thread_shutdown = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("xtrace-index-updater".to_string())
            .spawn(move || run_loop(&pending, &index, &stats, interval, &thread_shutdown))
            .expect("failed to spawn index updater thread");

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal shutdown and join the thread once it has committed any
    /// outstanding work (`spec.md` §5 "Cancellation"). Idempotent:
    /// calling this twice is a no-op the second time (`spec.md` §8
    /// property 7).
    pub fn shutdown(&mut self) {
        self.shutdown.signal();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Updater {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(
    pending: &PendingMap,
    index: &Index,
    stats: &StoreStats,
    interval: Duration,
    shutdown: &ShutdownSignal,
) {
    loop {
        let requested_shutdown = shutdown.is_set();

        let batch = pending.swap();
        if batch.is_empty() {
            if requested_shutdown {
                log::info!("index updater: shutdown requested, no outstanding work, exiting");
                return;
            }
            shutdown.wait(interval);
            continue;
        }

        apply_batch(index, stats, batch);

        if requested_shutdown {
            log::info!("index updater: committed final batch, exiting");
            return;
        }
    }
}

/// Apply one drained batch transactionally. Per-task failures are
/// logged and skipped so the rest of the batch still lands
/// (`spec.md` §4.6 step 5, §7).
fn apply_batch(index: &Index, stats: &StoreStats, batch: HashMap<TaskId, PendingUpdate>) {
    let batch_len = batch.len();
    let started = std::time::Instant::now();

    let commit_result = index.transaction(|tx| {
        for (task_id, delta) in &batch {
            if let Err(e) = apply_one(tx, task_id, delta) {
                log::warn!("index updater: failed to apply delta for {task_id}: {e}");
            }
        }
        Ok(())
    });

    match commit_result {
        Ok(()) => {
            stats.record_batch_committed();
            log::debug!(
                "index updater: committed {batch_len} task deltas in {:?}",
                started.elapsed()
            );
        }
        Err(e) => log::error!("index updater: commit failed, will retry next batch: {e}"),
    }
}

/// Per-task update order: existence-check -> optional title ->
/// optional tags -> report-count bump (`spec.md` §4.6: this ordering
/// "ensures inserts carry the correct initial count and that a
/// first-observed title is persisted rather than overwritten with the
/// task-id default").
fn apply_one(
    tx: &rusqlite::Transaction<'_>,
    task_id: &TaskId,
    delta: &PendingUpdate,
) -> rusqlite::Result<()> {
    if !Index::exists_tx(tx, task_id)? {
        let title = delta.title.clone().unwrap_or_else(|| task_id.to_string());
        Index::insert_tx(tx, task_id, &delta.tags, &title, delta.new_report_count as i64)?;
        return Ok(());
    }

    if let Some(title) = &delta.title {
        Index::set_title_tx(tx, task_id, title)?;
    }
    if !delta.tags.is_empty() {
        let mut merged = Index::read_tags_tx(tx, task_id)?;
        merged.extend(delta.tags.iter().cloned());
        Index::set_tags_tx(tx, task_id, &merged)?;
    }
    Index::bump_reports_tx(tx, task_id, delta.new_report_count as i64)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tid(s: &str) -> TaskId {
        TaskId::parse(s).unwrap()
    }

    #[test]
    fn insert_path_uses_task_id_as_default_title() {
        let index = Index::open_in_memory().unwrap();
        let task_id = tid("ABCDEF0123");
        let mut batch = HashMap::new();
        batch.insert(
            task_id.clone(),
            PendingUpdate {
                title: None,
                tags: HashSet::new(),
                new_report_count: 3,
            },
        );

        apply_batch(&index, &StoreStats::new(), batch);

        assert!(index.exists(&task_id).unwrap());
        assert_eq!(index.num_reports_of(&task_id).unwrap(), Some(3));
        assert_eq!(index.by_title(task_id.as_str()).unwrap().len(), 1);
    }

    #[test]
    fn update_path_merges_tags_and_bumps_count() {
        let index = Index::open_in_memory().unwrap();
        let task_id = tid("ABCDEF0123");

        index
            .transaction(|tx| {
                Index::insert_tx(
                    tx,
                    &task_id,
                    &["a".to_string()].into_iter().collect(),
                    "first title",
                    1,
                )
            })
            .unwrap();

        let mut batch = HashMap::new();
        batch.insert(
            task_id.clone(),
            PendingUpdate {
                title: None,
                tags: ["b".to_string()].into_iter().collect(),
                new_report_count: 2,
            },
        );
        apply_batch(&index, &StoreStats::new(), batch);

        assert_eq!(index.num_reports_of(&task_id).unwrap(), Some(3));
        assert_eq!(
            index.tags_of(&task_id).unwrap(),
            HashSet::from(["a".to_string(), "b".to_string()])
        );
        // A null title in the delta must never overwrite a committed non-null title.
        assert_eq!(index.by_title("first title").unwrap().len(), 1);
    }

    #[test]
    fn spawn_drains_pending_map_into_index() {
        let pending = Arc::new(PendingMap::new());
        let index = Arc::new(Index::open_in_memory().unwrap());
        let task_id = tid("ABCDEF0123");

        pending.record(task_id.clone(), Some("hello"), None);

        let stats = Arc::new(StoreStats::new());
        let mut updater = Updater::spawn(
            Arc::clone(&pending),
            Arc::clone(&index),
            Arc::clone(&stats),
            Duration::from_millis(10),
        );
        std::thread::sleep(Duration::from_millis(100));
        updater.shutdown();

        assert_eq!(index.num_reports_of(&task_id).unwrap(), Some(1));
        assert_eq!(stats.snapshot(0).updater_batches_committed, 1);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let pending = Arc::new(PendingMap::new());
        let index = Arc::new(Index::open_in_memory().unwrap());
        let stats = Arc::new(StoreStats::new());
        let mut updater = Updater::spawn(pending, index, stats, Duration::from_millis(10));
        updater.shutdown();
        updater.shutdown();
    }
}
