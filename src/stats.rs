//! Runtime counters exposed for observability.
//!
//! Not part of `spec.md`'s module set; a supplemented ambient concern
//! (`SPEC_FULL.md` §E). Grounded on the teacher's `src/database/cache.rs`
//! `CacheStats`/`enable_stats` pattern: plain `AtomicU64` counters bumped
//! inline on the hot path, read out through a cheap snapshot struct
//! rather than behind a lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counter values, for logging or an external reporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub reports_ingested: u64,
    pub reports_dropped: u64,
    pub updater_batches_committed: u64,
    pub lru_evictions: u64,
}

/// Shared, lock-free counters for one [`crate::store::ReportStore`].
#[derive(Default)]
pub struct StoreStats {
    reports_ingested: AtomicU64,
    reports_dropped: AtomicU64,
    updater_batches_committed: AtomicU64,
}

impl StoreStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ingested(&self) {
        self.reports_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.reports_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_committed(&self) {
        self.updater_batches_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters, pulling the LRU eviction count from the
    /// handle cache since that counter lives there (it is only ever
    /// touched from behind the same mutex that guards the cache).
    pub fn snapshot(&self, lru_evictions: u64) -> StatsSnapshot {
        StatsSnapshot {
            reports_ingested: self.reports_ingested.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
            updater_batches_committed: self.updater_batches_committed.load(Ordering::Relaxed),
            lru_evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_snapshot() {
        let stats = StoreStats::new();
        stats.record_ingested();
        stats.record_ingested();
        stats.record_dropped();
        stats.record_batch_committed();

        let snap = stats.snapshot(7);
        assert_eq!(snap.reports_ingested, 2);
        assert_eq!(snap.reports_dropped, 1);
        assert_eq!(snap.updater_batches_committed, 1);
        assert_eq!(snap.lru_evictions, 7);
    }
}
