//! C3: LRU Handle Cache.
//!
//! A size-unbounded map of open, append-mode file handles, keyed by
//! task-id and ordered by access recency (`spec.md` §4.3). Eviction is
//! staleness-triggered rather than capacity-triggered: on every
//! insertion the cache inspects its least-recently-used entry and
//! closes it only if it has been idle longer than `valid_for`. Idle
//! tasks otherwise stay open indefinitely, which is the tradeoff
//! `spec.md` §9's design notes call out explicitly.
//!
//! Grounded on the teacher's `lru` dependency (already present in its
//! `Cargo.toml`) rather than the teacher's own `moka`-based
//! `database::cache` (an async, generic value cache that doesn't fit
//! holding non-`Clone` file handles with a custom eviction hook); see
//! `DESIGN.md`.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::file_store::FileStore;
use crate::task_id::TaskId;

struct CachedHandle {
    writer: BufWriter<File>,
    last_access: Instant,
}

/// Bounded-staleness cache of open append-mode writers.
///
/// All operations are `&mut self`; callers that share a `HandleCache`
/// across threads serialize on a mutex around it (`spec.md` §5: "All
/// cache operations serialize on one mutex").
pub struct HandleCache {
    // `lru`'s LruCache requires a nonzero capacity even though this
    // cache is conceptually unbounded; sized generously and
    // self-trimmed by the staleness policy below rather than by
    // capacity eviction. `spec.md` §9 allows implementers to
    // additionally cap size -- this is that cap, set far above any
    // expected working set.
    entries: LruCache<String, CachedHandle>,
    valid_for: Duration,
    evictions: u64,
}

const CAPACITY_CAP: usize = 1 << 20;

impl HandleCache {
    /// Create a cache with the given staleness window.
    pub fn new(valid_for: Duration) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(CAPACITY_CAP).unwrap()),
            valid_for,
            evictions: 0,
        }
    }

    /// Number of staleness-triggered evictions since creation, for metrics.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Get (or open) the writer for `task_id`, bumping its recency.
    /// Before inserting a freshly-opened handle, evicts the current
    /// least-recently-used entry if it has gone stale.
    pub fn access(
        &mut self,
        task_id: &TaskId,
        file_store: &FileStore,
    ) -> io::Result<&mut BufWriter<File>> {
        let key = task_id.as_str().to_string();
        if self.entries.contains(&key) {
            let entry = self.entries.get_mut(&key).expect("checked contains");
            entry.last_access = Instant::now();
            return Ok(&mut entry.writer);
        }

        self.evict_if_stale();

        let writer = file_store.open_appender(task_id)?;
        self.entries.put(
            key.clone(),
            CachedHandle {
                writer,
                last_access: Instant::now(),
            },
        );
        Ok(&mut self.entries.get_mut(&key).expect("just inserted").writer)
    }

    /// Close and remove the least-recently-used entry if it has been
    /// idle longer than `valid_for` (`spec.md` §4.3 policy).
    fn evict_if_stale(&mut self) {
        let Some((_, handle)) = self.entries.peek_lru() else {
            return;
        };
        if handle.last_access.elapsed() < self.valid_for {
            return;
        }
        if let Some((_, mut handle)) = self.entries.pop_lru() {
            let _ = handle.writer.flush();
            self.evictions += 1;
        }
    }

    /// Flush every open writer without closing it (`spec.md` §4.3).
    pub fn flush_all(&mut self) {
        for (_, handle) in self.entries.iter_mut() {
            if let Err(e) = handle.writer.flush() {
                log::warn!("flush_all: failed to flush a cached writer: {e}");
            }
        }
    }

    /// Flush, close, and empty the cache (`spec.md` §4.3, used at
    /// shutdown).
    pub fn close_all(&mut self) {
        self.flush_all();
        self.entries.clear();
    }

    /// Number of currently-open handles, for tests/metrics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache currently holds no open handles.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
