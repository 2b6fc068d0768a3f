//! Ingest pipeline.
//!
//! The producer side of the store: receives raw report text over a
//! blocking queue, parses it (C1), appends it to disk through the LRU
//! handle cache (C2/C3), and records the resulting metadata delta in
//! the pending-update map (C4) for the updater to pick up (`spec.md`
//! §5 "Ingest"). Grounded on the teacher's `src/database/replication.rs`
//! worker-thread shape; the channel itself is `crossbeam::channel`,
//! already a teacher dependency, standing in for the reference
//! implementation's blocking queue (`spec.md` §6).

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Receiver, RecvTimeoutError};

use crate::file_store::FileStore;
use crate::handle_cache::HandleCache;
use crate::pending::PendingMap;
use crate::report::{self, ParseFailure};
use crate::stats::StoreStats;

use parking_lot::Mutex;
use std::time::Duration;

/// How long the ingest loop blocks on an empty queue before checking
/// for shutdown again.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Handle to the running ingest thread.
pub struct IngestWorker {
    handle: Option<JoinHandle<()>>,
}

impl IngestWorker {
    /// Spawn the ingest loop, consuming raw report blocks from `rx`
    /// until the channel is disconnected (`spec.md` §5: ingest runs
    /// until its input is exhausted; there is no separate stop flag
    /// since dropping the sender is the cancellation signal).
    pub fn spawn(
        rx: Receiver<String>,
        file_store: Arc<FileStore>,
        handle_cache: Arc<Mutex<HandleCache>>,
        pending: Arc<PendingMap>,
        stats: Arc<StoreStats>,
    ) -> Self {
        let handle = thread::Builder::new()
            .name("xtrace-ingest".to_string())
            .spawn(move || run_loop(&rx, &file_store, &handle_cache, &pending, &stats))
            .expect("failed to spawn ingest thread");

        Self {
            handle: Some(handle),
        }
    }

    /// Block until the ingest thread has drained the channel and
    /// exited. Idempotent.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IngestWorker {
    fn drop(&mut self) {
        self.join();
    }
}

fn run_loop(
    rx: &Receiver<String>,
    file_store: &FileStore,
    handle_cache: &Mutex<HandleCache>,
    pending: &PendingMap,
    stats: &StoreStats,
) {
    loop {
        match rx.recv_timeout(RECV_POLL_INTERVAL) {
            Ok(raw) => ingest_one(&raw, file_store, handle_cache, pending, stats),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("ingest: sender dropped, exiting");
                return;
            }
        }
    }
}

/// Parse, persist, and record one raw report block (`spec.md` §5:
/// write-through to disk happens before the pending-map record, so a
/// reader never observes a metadata delta for a report that isn't yet
/// on disk).
fn ingest_one(
    raw: &str,
    file_store: &FileStore,
    handle_cache: &Mutex<HandleCache>,
    pending: &PendingMap,
    stats: &StoreStats,
) {
    let parsed = match report::parse(raw) {
        Ok(parsed) => parsed,
        Err(ParseFailure::NoMetadataLine) => {
            log::warn!("ingest: dropping report with no X-Trace metadata line");
            stats.record_dropped();
            return;
        }
        Err(ParseFailure::MissingTaskId) => {
            log::warn!("ingest: dropping report with unparseable task-id");
            stats.record_dropped();
            return;
        }
    };

    {
        let mut cache = handle_cache.lock();
        let writer = match cache.access(&parsed.task_id, file_store) {
            Ok(writer) => writer,
            Err(e) => {
                log::error!("ingest: failed to open handle for {}: {e}", parsed.task_id);
                stats.record_dropped();
                return;
            }
        };
        if let Err(e) = FileStore::append(writer, &parsed.raw) {
            log::error!("ingest: failed to append report for {}: {e}", parsed.task_id);
            stats.record_dropped();
            return;
        }
    }

    let tags = if parsed.tags.is_empty() {
        None
    } else {
        Some(&parsed.tags)
    };
    pending.record(parsed.task_id, parsed.title.as_deref(), tags);
    stats.record_ingested();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_id::TaskId;
    use tempfile::tempdir;

    fn report_for(task_id: &str) -> String {
        format!("X-Trace Report ver 1\nX-Trace: {task_id}0000000100000001\n\n")
    }

    #[test]
    fn ingest_one_appends_and_records_pending_update() {
        let dir = tempdir().unwrap();
        let file_store = FileStore::new(dir.path());
        let cache = Mutex::new(HandleCache::new(Duration::from_secs(60)));
        let pending = PendingMap::new();
        let stats = StoreStats::new();

        ingest_one(&report_for("ABCDEF0123"), &file_store, &cache, &pending, &stats);

        let task_id = TaskId::parse("ABCDEF012300000001").unwrap();
        assert!(file_store.exists(&task_id));
        assert_eq!(pending.swap().get(&task_id).unwrap().new_report_count, 1);
        assert_eq!(stats.snapshot(0).reports_ingested, 1);
    }

    #[test]
    fn ingest_one_drops_unparseable_report() {
        let dir = tempdir().unwrap();
        let file_store = FileStore::new(dir.path());
        let cache = Mutex::new(HandleCache::new(Duration::from_secs(60)));
        let pending = PendingMap::new();
        let stats = StoreStats::new();

        ingest_one("not a report\n\n", &file_store, &cache, &pending, &stats);

        assert!(pending.is_empty());
        assert_eq!(stats.snapshot(0).reports_dropped, 1);
    }

    #[test]
    fn spawn_drains_channel_and_joins_on_disconnect() {
        let dir = tempdir().unwrap();
        let file_store = Arc::new(FileStore::new(dir.path()));
        let cache = Arc::new(Mutex::new(HandleCache::new(Duration::from_secs(60))));
        let pending = Arc::new(PendingMap::new());
        let stats = Arc::new(StoreStats::new());

        let (tx, rx) = crossbeam::channel::unbounded();
        let mut worker = IngestWorker::spawn(rx, file_store, cache, Arc::clone(&pending), stats);

        tx.send(report_for("FEDCBA9876")).unwrap();
        drop(tx);
        worker.join();

        assert!(!pending.is_empty());
    }
}
