//! C7: Query Surface.
//!
//! Read-side operations over the metadata index (C5) and the on-disk
//! report files (C2): listing/filtering tasks, streaming a task's
//! reports, and computing temporal overlap (`spec.md` §4.7). Every
//! method here returns a well-typed empty/default result on failure
//! rather than raising, per `spec.md` §7.

use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};

use chrono::{DateTime, Utc};

use crate::config::StoreConfig;
use crate::file_store::FileStore;
use crate::index::{Index, TaskRecord};
use crate::task_id::TaskId;

const REPORT_START_PREFIX: &str = "X-Trace Report ver";

/// A forward-only, non-restartable cursor over one task's report file
/// (`spec.md` §4.7, §9 "lazy report sequence").
pub struct ReportIter {
    reader: Option<BufReader<File>>,
}

impl ReportIter {
    fn open(file_store: &FileStore, task_id: &TaskId) -> Self {
        let reader = File::open(file_store.task_file(task_id))
            .map(BufReader::new)
            .map_err(|e| {
                log::warn!("reportsByTask({task_id}): failed to open report file: {e}");
            })
            .ok();
        Self { reader }
    }
}

impl Iterator for ReportIter {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let reader = self.reader.as_mut()?;
        let mut block = String::new();
        let mut started = false;

        loop {
            let mut line = String::new();
            let read = match reader.read_line(&mut line) {
                Ok(n) => n,
                Err(e) => {
                    log::warn!("reportsByTask: read error mid-stream: {e}");
                    self.reader = None;
                    return None;
                }
            };
            if read == 0 {
                // EOF. Finite, forward-only: stop silently (spec.md §4.7).
                self.reader = None;
                return if started && !block.trim().is_empty() {
                    Some(block)
                } else {
                    None
                };
            }

            if !started {
                if line.starts_with(REPORT_START_PREFIX) {
                    started = true;
                    block.push_str(&line);
                }
                continue;
            }

            if line.trim().is_empty() {
                return Some(block);
            }
            block.push_str(&line);
        }
    }
}

/// Read-side facade over the index and file store.
pub struct QuerySurface<'a> {
    index: &'a Index,
    file_store: &'a FileStore,
    config: &'a StoreConfig,
}

impl<'a> QuerySurface<'a> {
    pub fn new(index: &'a Index, file_store: &'a FileStore, config: &'a StoreConfig) -> Self {
        Self {
            index,
            file_store,
            config,
        }
    }

    /// `reportsByTask(taskId)`: a lazy, forward-only sequence of raw
    /// report blocks.
    pub fn reports_by_task(&self, task_id: &TaskId) -> ReportIter {
        ReportIter::open(self.file_store, task_id)
    }

    /// `getTagsForTask(taskId)`, with up to `tag_read_retries` retries
    /// to tolerate a concurrent writer commit (`spec.md` §4.7).
    /// Returns empty on persistent failure.
    pub fn get_tags_for_task(&self, task_id: &TaskId) -> HashSet<String> {
        for attempt in 0..=self.config.tag_read_retries {
            match self.index.tags_of(task_id) {
                Ok(tags) => return tags,
                Err(e) => {
                    log::warn!(
                        "getTagsForTask({task_id}): attempt {attempt} failed: {e}, retrying"
                    );
                }
            }
        }
        HashSet::new()
    }

    /// `overlappingTasks(taskId)`: one-hop temporal overlap.
    pub fn overlapping_tasks(&self, task_id: &TaskId) -> Vec<TaskId> {
        let Some((first_seen, last_updated)) = self.times_of(task_id) else {
            return Vec::new();
        };
        match self.index.tasks_between(last_updated, first_seen) {
            Ok(ids) => ids,
            Err(e) => {
                log::warn!("overlappingTasks({task_id}): index error: {e}");
                Vec::new()
            }
        }
    }

    /// `allOverlappingTasks(taskId)`: transitive closure via BFS over
    /// an expanding bounding window (`spec.md` §4.7).
    pub fn all_overlapping_tasks(&self, task_id: &TaskId) -> HashSet<TaskId> {
        let Some((first_seen, last_updated)) = self.times_of(task_id) else {
            return HashSet::new();
        };

        let mut seen: HashSet<TaskId> = HashSet::from([task_id.clone()]);
        let mut frontier: VecDeque<TaskId> = VecDeque::from([task_id.clone()]);
        let mut lower = first_seen;
        let mut upper = last_updated;

        while let Some(current) = frontier.pop_front() {
            let Some((cur_first, cur_last)) = self.times_of(&current) else {
                continue;
            };
            if cur_first < lower {
                lower = cur_first;
            }
            if cur_last > upper {
                upper = cur_last;
            }

            let candidates = match self.index.tasks_between(upper, lower) {
                Ok(ids) => ids,
                Err(e) => {
                    log::warn!("allOverlappingTasks({task_id}): index error: {e}");
                    Vec::new()
                }
            };
            for candidate in candidates {
                if seen.insert(candidate.clone()) {
                    frontier.push_back(candidate);
                }
            }
        }

        seen
    }

    fn times_of(&self, task_id: &TaskId) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self.index.times_of(task_id) {
            Ok(times) => times,
            Err(e) => {
                log::warn!("times_of({task_id}): index error: {e}");
                None
            }
        }
    }

    /// `tasksSince`, paginated.
    pub fn tasks_since(
        &self,
        first_seen_at_least: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Vec<TaskRecord> {
        self.index
            .tasks_since(first_seen_at_least, offset, limit)
            .unwrap_or_default()
    }

    /// `latestTasks`, paginated.
    pub fn latest_tasks(&self, offset: usize, limit: usize) -> Vec<TaskRecord> {
        self.index.latest_tasks(offset, limit).unwrap_or_default()
    }

    /// `byTag(substring)`, exact-match semantics (see `DESIGN.md`).
    pub fn by_tag(&self, tag: &str) -> Vec<TaskRecord> {
        self.index.by_tag(tag).unwrap_or_default()
    }

    /// `byTitle(exact)`.
    pub fn by_title(&self, title: &str) -> Vec<TaskRecord> {
        self.index.by_title(title).unwrap_or_default()
    }

    /// `byTitleApprox(substring)`.
    pub fn by_title_approx(&self, substring: &str) -> Vec<TaskRecord> {
        self.index.by_title_approx(substring).unwrap_or_default()
    }

    /// `numReportsOf(taskId)`.
    pub fn num_reports_of(&self, task_id: &TaskId) -> Option<i64> {
        self.index.num_reports_of(task_id).unwrap_or(None)
    }

    /// `totalReports()`.
    pub fn total_reports(&self) -> i64 {
        self.index.total_reports().unwrap_or(0)
    }

    /// `totalTasks()`.
    pub fn total_tasks(&self) -> i64 {
        self.index.total_tasks().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet as StdHashSet;
    use tempfile::tempdir;

    fn tid(s: &str) -> TaskId {
        TaskId::parse(s).unwrap()
    }

    #[test]
    fn reports_by_task_splits_on_blank_lines() {
        let dir = tempdir().unwrap();
        let file_store = FileStore::new(dir.path());
        let task_id = tid("ABCDEF0123");

        let mut writer = file_store.open_appender(&task_id).unwrap();
        for i in 0..3 {
            FileStore::append(
                &mut writer,
                &format!("X-Trace Report ver 1\nX-Trace: ABCDEF012345678900000001\nSeq: {i}"),
            )
            .unwrap();
        }
        use std::io::Write;
        writer.flush().unwrap();

        let config = StoreConfig::new(dir.path());
        let index = Index::open_in_memory().unwrap();
        let surface = QuerySurface::new(&index, &file_store, &config);

        let blocks: Vec<_> = surface.reports_by_task(&task_id).collect();
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].starts_with("X-Trace Report ver 1"));
    }

    #[test]
    fn reports_by_task_missing_file_yields_empty_iterator() {
        let dir = tempdir().unwrap();
        let file_store = FileStore::new(dir.path());
        let config = StoreConfig::new(dir.path());
        let index = Index::open_in_memory().unwrap();
        let surface = QuerySurface::new(&index, &file_store, &config);

        let blocks: Vec<_> = surface.reports_by_task(&tid("ABCDEF0123")).collect();
        assert!(blocks.is_empty());
    }

    #[test]
    fn overlap_closure_excludes_disjoint_tasks() {
        let dir = tempdir().unwrap();
        let file_store = FileStore::new(dir.path());
        let config = StoreConfig::new(dir.path());
        let index = Index::open_in_memory().unwrap();

        // Intervals: (1,5) (4,7) (6,10) (20,25), matching spec.md S5.
        let spans = [
            ("1111110000", 1i64, 5i64),
            ("2222220000", 4, 7),
            ("3333330000", 6, 10),
            ("4444440000", 20, 25),
        ];
        for (id, first, last) in spans {
            let task_id = tid(id);
            index
                .transaction(|tx| {
                    crate::index::Index::insert_tx(tx, &task_id, &StdHashSet::new(), "t", 1)
                })
                .unwrap();
            set_times(&index, &task_id, first, last);
        }

        let surface = QuerySurface::new(&index, &file_store, &config);
        let first = tid("1111110000");
        let second = tid("2222220000");
        let third = tid("3333330000");
        let fourth = tid("4444440000");

        let one_hop: StdHashSet<_> = surface.overlapping_tasks(&first).into_iter().collect();
        assert_eq!(one_hop, StdHashSet::from([first.clone(), second.clone()]));

        let closure = surface.all_overlapping_tasks(&first);
        assert_eq!(closure, StdHashSet::from([first, second, third]));
        assert!(!closure.contains(&fourth));
    }

    fn set_times(index: &Index, task_id: &TaskId, first_secs: i64, last_secs: i64) {
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let first = epoch + chrono::Duration::seconds(first_secs);
        let last = epoch + chrono::Duration::seconds(last_secs);
        index
            .raw_conn_for_test()
            .execute(
                "UPDATE tasks SET first_seen = ?1, last_updated = ?2 WHERE task_id = ?3",
                rusqlite::params![first, last, task_id.as_str()],
            )
            .unwrap();
    }
}
