//! C2: Task File Store.
//!
//! Appends raw report text to a per-task file, directory-sharded by
//! the first two characters of the task-id (`spec.md` §4.2, §6).
//! Writers themselves are owned and cached by [`crate::handle_cache`];
//! this module only knows how to open one and where it lives on disk.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::task_id::TaskId;

/// Where on disk a task's report file lives, and how to open it.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a file store rooted at `root`. Does not itself validate
    /// that `root` is writable; `ReportStore::open` does that once at
    /// startup per `spec.md` §7.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path to the shard directory for `task_id`.
    pub fn shard_dir(&self, task_id: &TaskId) -> PathBuf {
        self.root.join(task_id.shard_prefix())
    }

    /// Path to the per-task report file.
    pub fn task_file(&self, task_id: &TaskId) -> PathBuf {
        self.shard_dir(task_id).join(format!("{task_id}.txt"))
    }

    /// Open (creating if needed) a buffered append-mode writer for
    /// `task_id`, creating the shard directory as needed. This is the
    /// "file create fails" failure mode of `spec.md` §7's handle-cache
    /// error row.
    pub fn open_appender(&self, task_id: &TaskId) -> io::Result<BufWriter<File>> {
        let shard_dir = self.shard_dir(task_id);
        fs::create_dir_all(&shard_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.task_file(task_id))?;
        Ok(BufWriter::new(file))
    }

    /// Whether a file has ever been written for `task_id` (`spec.md`
    /// §3 invariant: "the on-disk file exists iff at least one report
    /// for that task has been written").
    pub fn exists(&self, task_id: &TaskId) -> bool {
        self.task_file(task_id).is_file()
    }

    /// Write one report's raw text to `writer`, followed by the
    /// blank-line separator a reader splits on (`spec.md` §4.2).
    /// Flush is deferred to the caller (the LRU cache flushes on a
    /// schedule, not per write).
    pub fn append(writer: &mut BufWriter<File>, raw_text: &str) -> io::Result<()> {
        writer.write_all(raw_text.as_bytes())?;
        if !raw_text.ends_with('\n') {
            writer.write_all(b"\n")?;
        }
        writer.write_all(b"\n")
    }

    /// Root directory this store is anchored at.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn append_creates_sharded_file() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let task_id = TaskId::parse("ABCDEF0123").unwrap();

        assert!(!store.exists(&task_id));

        let mut writer = store.open_appender(&task_id).unwrap();
        FileStore::append(&mut writer, "hello").unwrap();
        writer.flush().unwrap();

        assert!(store.exists(&task_id));
        assert_eq!(store.task_file(&task_id).parent().unwrap(), store.shard_dir(&task_id));

        let mut contents = String::new();
        File::open(store.task_file(&task_id))
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "hello\n\n");
    }

    #[test]
    fn repeated_appends_accumulate_blocks() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let task_id = TaskId::parse("ABCDEF0123").unwrap();

        let mut writer = store.open_appender(&task_id).unwrap();
        for i in 0..3 {
            FileStore::append(&mut writer, &format!("report {i}")).unwrap();
        }
        writer.flush().unwrap();

        let contents = fs::read_to_string(store.task_file(&task_id)).unwrap();
        assert_eq!(contents.matches("\n\n").count(), 3);
    }
}
