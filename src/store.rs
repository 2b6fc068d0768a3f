//! `ReportStore`: the facade bundling every component.
//!
//! Construction validates and opens everything fail-fast (`spec.md`
//! §7: "startup validates the root directory and the index; nothing
//! else does"). Grounded on the teacher's top-level `Engine`/`App`
//! struct shape (own every subsystem, expose narrow accessors, one
//! `shutdown` that tears down in reverse dependency order).

use std::sync::Arc;

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::file_store::FileStore;
use crate::handle_cache::HandleCache;
use crate::index::Index;
use crate::ingest::IngestWorker;
use crate::pending::PendingMap;
use crate::query::QuerySurface;
use crate::stats::{StatsSnapshot, StoreStats};
use crate::updater::Updater;

/// Capacity of the ingest channel before `submit` blocks (`spec.md`
/// §6's "blocking queue" framing for the ingest interface).
const INGEST_QUEUE_CAPACITY: usize = 4096;

/// An open report store: owns the file store, handle cache,
/// pending-update map, index, and the ingest/updater background
/// threads.
pub struct ReportStore {
    config: StoreConfig,
    file_store: Arc<FileStore>,
    handle_cache: Arc<Mutex<HandleCache>>,
    pending: Arc<PendingMap>,
    index: Arc<Index>,
    stats: Arc<StoreStats>,
    updater: Mutex<Option<Updater>>,
    ingest_tx: Mutex<Option<Sender<String>>>,
    ingest_worker: Mutex<Option<IngestWorker>>,
}

impl ReportStore {
    /// Open (creating if needed) a store rooted at `config.root`,
    /// validating the root directory and opening the index
    /// (`spec.md` §7). The updater and ingest threads are not started
    /// until [`ReportStore::spawn_workers`] is called, so tests can
    /// open a store and drive ingestion synchronously if they prefer.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        std::fs::create_dir_all(&config.root)
            .map_err(|_| StoreError::RootNotWritable(config.root.clone()))?;

        let file_store = Arc::new(FileStore::new(config.root.clone()));
        let handle_cache = Arc::new(Mutex::new(HandleCache::new(config.lru_valid_for)));
        let pending = Arc::new(PendingMap::new());
        let index = Arc::new(Index::open(&config.index_path())?);
        let stats = Arc::new(StoreStats::new());

        Ok(Self {
            config,
            file_store,
            handle_cache,
            pending,
            index,
            stats,
            updater: Mutex::new(None),
            ingest_tx: Mutex::new(None),
            ingest_worker: Mutex::new(None),
        })
    }

    /// Start the background updater and the ingest thread. Returns a
    /// `Sender` for feeding raw report blocks in (`spec.md` §6 ingest
    /// interface). Idempotent: a second call is a no-op and returns a
    /// clone of the existing sender.
    pub fn spawn_workers(&self) -> Sender<String> {
        let mut ingest_tx = self.ingest_tx.lock();
        if let Some(tx) = ingest_tx.as_ref() {
            return tx.clone();
        }

        let mut updater_guard = self.updater.lock();
        *updater_guard = Some(Updater::spawn(
            Arc::clone(&self.pending),
            Arc::clone(&self.index),
            Arc::clone(&self.stats),
            self.config.updater_interval,
        ));

        let (tx, rx) = channel::bounded(INGEST_QUEUE_CAPACITY);
        let worker = IngestWorker::spawn(
            rx,
            Arc::clone(&self.file_store),
            Arc::clone(&self.handle_cache),
            Arc::clone(&self.pending),
            Arc::clone(&self.stats),
        );
        *self.ingest_worker.lock() = Some(worker);
        *ingest_tx = Some(tx.clone());
        tx
    }

    /// A read-side view over the index and file store.
    pub fn query(&self) -> QuerySurface<'_> {
        QuerySurface::new(&self.index, &self.file_store, &self.config)
    }

    /// Current counters, pulling the LRU eviction count out of the
    /// handle cache.
    pub fn stats(&self) -> StatsSnapshot {
        let evictions = self.handle_cache.lock().evictions();
        self.stats.snapshot(evictions)
    }

    /// Shut everything down in dependency order: stop accepting new
    /// reports, drain the ingest thread, stop the updater (which
    /// commits any outstanding pending work), then flush and close
    /// every cached file handle (`SPEC_FULL.md` §E). Idempotent.
    pub fn shutdown(&self) {
        if let Some(tx) = self.ingest_tx.lock().take() {
            drop(tx);
        }
        if let Some(mut worker) = self.ingest_worker.lock().take() {
            worker.join();
        }
        if let Some(mut updater) = self.updater.lock().take() {
            updater.shutdown();
        }
        self.handle_cache.lock().close_all();
    }
}

impl Drop for ReportStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}
