//! C5: Metadata Index.
//!
//! A small embedded relational table, one row per task-id, with
//! indexes on every non-key column and a fixed prepared-query surface
//! (`spec.md` §4.5). All mutations happen inside explicit transactions
//! committed by the updater (`src/updater.rs`); readers (`src/query.rs`)
//! see committed state only.
//!
//! Grounded on `other_examples/adv_sqlite.rs`'s `TaskDb` for the
//! `rusqlite` idiom: `execute_batch` for schema setup,
//! `prepare_cached` + named params for everything else, a
//! `Mutex`-guarded `Connection` shared between threads (here:
//! the updater and query callers) rather than `sqlx`'s async pool
//! (see `DESIGN.md` for why).

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{named_params, Connection, OptionalExtension};

use crate::task_id::TaskId;

/// One committed row of task metadata (`spec.md` §3 `TaskRecord`).
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub num_reports: i64,
    pub title: String,
    pub tags: HashSet<String>,
}

/// The embedded metadata index.
pub struct Index {
    conn: Mutex<Connection>,
}

fn tags_to_csv(tags: &HashSet<String>) -> String {
    let mut sorted: Vec<&str> = tags.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

fn csv_to_tags(csv: &str) -> HashSet<String> {
    if csv.is_empty() {
        return HashSet::new();
    }
    csv.split(',').map(str::to_string).collect()
}

impl Index {
    /// Open (creating if needed) the index database at `path`.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// An in-memory index, for tests.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Direct access to the underlying connection, for tests that need
    /// to set up fixture data the prepared-query surface doesn't
    /// expose a writer for (e.g. backdating timestamps).
    #[cfg(test)]
    pub fn raw_conn_for_test(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id      TEXT PRIMARY KEY,
                first_seen   TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                num_reports  INTEGER NOT NULL,
                tags         TEXT NOT NULL DEFAULT '',
                title        TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_first_seen ON tasks(first_seen);
            CREATE INDEX IF NOT EXISTS idx_tasks_last_updated ON tasks(last_updated);
            CREATE INDEX IF NOT EXISTS idx_tasks_num_reports ON tasks(num_reports);
            CREATE INDEX IF NOT EXISTS idx_tasks_tags ON tasks(tags);
            CREATE INDEX IF NOT EXISTS idx_tasks_title ON tasks(title);
            "#,
        )
    }

    /// Run `f` inside a transaction, committing on success. Callers
    /// (the updater) are responsible for logging commit failures and
    /// continuing per `spec.md` §7.
    pub fn transaction<F, T>(&self, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> rusqlite::Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// `exists(taskId) -> bool`.
    pub fn exists(&self, task_id: &TaskId) -> rusqlite::Result<bool> {
        self.exists_in(&self.conn.lock(), task_id)
    }

    fn exists_in(&self, conn: &Connection, task_id: &TaskId) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT 1 FROM tasks WHERE task_id = ?1 LIMIT 1",
            [task_id.as_str()],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
    }

    /// `exists` against an open transaction, used by the updater so
    /// existence checks and writes stay inside one transaction.
    pub fn exists_tx(tx: &rusqlite::Transaction<'_>, task_id: &TaskId) -> rusqlite::Result<bool> {
        tx.query_row(
            "SELECT 1 FROM tasks WHERE task_id = ?1 LIMIT 1",
            [task_id.as_str()],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
    }

    /// `insert(taskId, tagsCsv, title, numReports)`, sets
    /// `firstSeen = lastUpdated = now`.
    pub fn insert_tx(
        tx: &rusqlite::Transaction<'_>,
        task_id: &TaskId,
        tags: &HashSet<String>,
        title: &str,
        num_reports: i64,
    ) -> rusqlite::Result<()> {
        let now = Utc::now();
        tx.execute(
            "INSERT INTO tasks (task_id, first_seen, last_updated, num_reports, tags, title)
             VALUES (:task_id, :now, :now, :num_reports, :tags, :title)",
            named_params! {
                ":task_id": task_id.as_str(),
                ":now": now,
                ":num_reports": num_reports,
                ":tags": tags_to_csv(tags),
                ":title": title,
            },
        )?;
        Ok(())
    }

    /// `bumpReports(taskId, delta)`: `numReports += delta; lastUpdated = now`.
    pub fn bump_reports_tx(
        tx: &rusqlite::Transaction<'_>,
        task_id: &TaskId,
        delta: i64,
    ) -> rusqlite::Result<()> {
        tx.execute(
            "UPDATE tasks SET num_reports = num_reports + :delta, last_updated = :now
             WHERE task_id = :task_id",
            named_params! {
                ":delta": delta,
                ":now": Utc::now(),
                ":task_id": task_id.as_str(),
            },
        )?;
        Ok(())
    }

    /// `setTitle(taskId, title)`.
    pub fn set_title_tx(
        tx: &rusqlite::Transaction<'_>,
        task_id: &TaskId,
        title: &str,
    ) -> rusqlite::Result<()> {
        tx.execute(
            "UPDATE tasks SET title = :title WHERE task_id = :task_id",
            named_params! { ":title": title, ":task_id": task_id.as_str() },
        )?;
        Ok(())
    }

    /// `readTags(taskId) -> csv`.
    pub fn read_tags_tx(
        tx: &rusqlite::Transaction<'_>,
        task_id: &TaskId,
    ) -> rusqlite::Result<HashSet<String>> {
        let csv: Option<String> = tx
            .query_row(
                "SELECT tags FROM tasks WHERE task_id = ?1",
                [task_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(csv.map(|c| csv_to_tags(&c)).unwrap_or_default())
    }

    /// `setTags(taskId, csv)`.
    pub fn set_tags_tx(
        tx: &rusqlite::Transaction<'_>,
        task_id: &TaskId,
        tags: &HashSet<String>,
    ) -> rusqlite::Result<()> {
        tx.execute(
            "UPDATE tasks SET tags = :tags WHERE task_id = :task_id",
            named_params! { ":tags": tags_to_csv(tags), ":task_id": task_id.as_str() },
        )?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRecord> {
        let task_id_str: String = row.get(0)?;
        let tags_csv: String = row.get(4)?;
        Ok(TaskRecord {
            task_id: TaskId::parse(&task_id_str).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    0,
                    "task_id".into(),
                    rusqlite::types::Type::Text,
                )
            })?,
            first_seen: row.get(1)?,
            last_updated: row.get(2)?,
            num_reports: row.get(3)?,
            tags: csv_to_tags(&tags_csv),
            title: row.get(5)?,
        })
    }

    const SELECT_COLUMNS: &'static str =
        "task_id, first_seen, last_updated, num_reports, tags, title";

    /// `tasksSince(firstSeenAtLeast) order by lastUpdated desc`, paginated.
    pub fn tasks_since(
        &self,
        first_seen_at_least: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> rusqlite::Result<Vec<TaskRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {cols} FROM tasks WHERE first_seen >= :since
             ORDER BY last_updated DESC LIMIT :cap",
            cols = Self::SELECT_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let cap = (offset + limit + 1) as i64;
        let rows = stmt
            .query_map(
                named_params! { ":since": first_seen_at_least, ":cap": cap },
                Self::row_to_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paginate(rows, offset, limit))
    }

    /// `tasksBetween(firstSeen <= upper, lastUpdated >= lower) -> taskIds`.
    pub fn tasks_between(
        &self,
        upper_first_seen: DateTime<Utc>,
        lower_last_updated: DateTime<Utc>,
    ) -> rusqlite::Result<Vec<TaskId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT task_id FROM tasks WHERE first_seen <= :upper AND last_updated >= :lower",
        )?;
        let rows = stmt
            .query_map(
                named_params! { ":upper": upper_first_seen, ":lower": lower_last_updated },
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|s| TaskId::parse(&s).ok())
            .collect())
    }

    /// `latestTasks() order by lastUpdated desc`, paginated.
    pub fn latest_tasks(&self, offset: usize, limit: usize) -> rusqlite::Result<Vec<TaskRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {cols} FROM tasks ORDER BY last_updated DESC LIMIT :cap",
            cols = Self::SELECT_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let cap = (offset + limit + 1) as i64;
        let rows = stmt
            .query_map(named_params! { ":cap": cap }, Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paginate(rows, offset, limit))
    }

    /// `byTag(substring) order by lastUpdated desc`. Issues a `LIKE`
    /// query for candidates, then re-filters in Rust for exact tag
    /// equality per `DESIGN.md`'s resolution of the substring-vs-exact
    /// open question.
    pub fn by_tag(&self, tag: &str) -> rusqlite::Result<Vec<TaskRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {cols} FROM tasks WHERE tags LIKE :pattern ORDER BY last_updated DESC",
            cols = Self::SELECT_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let pattern = format!("%{tag}%");
        let rows = stmt
            .query_map(named_params! { ":pattern": pattern }, Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().filter(|r| r.tags.contains(tag)).collect())
    }

    /// `byTitle(exact)`.
    pub fn by_title(&self, title: &str) -> rusqlite::Result<Vec<TaskRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {cols} FROM tasks WHERE title = :title ORDER BY last_updated DESC",
            cols = Self::SELECT_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(named_params! { ":title": title }, Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// `byTitleApprox(substring)`.
    pub fn by_title_approx(&self, substring: &str) -> rusqlite::Result<Vec<TaskRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {cols} FROM tasks WHERE title LIKE :pattern ORDER BY last_updated DESC",
            cols = Self::SELECT_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let pattern = format!("%{substring}%");
        let rows = stmt
            .query_map(named_params! { ":pattern": pattern }, Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// `numReportsOf(taskId)`.
    pub fn num_reports_of(&self, task_id: &TaskId) -> rusqlite::Result<Option<i64>> {
        self.conn
            .lock()
            .query_row(
                "SELECT num_reports FROM tasks WHERE task_id = ?1",
                [task_id.as_str()],
                |row| row.get(0),
            )
            .optional()
    }

    /// `lastUpdatedOf(taskId)`.
    pub fn last_updated_of(&self, task_id: &TaskId) -> rusqlite::Result<Option<DateTime<Utc>>> {
        self.conn
            .lock()
            .query_row(
                "SELECT last_updated FROM tasks WHERE task_id = ?1",
                [task_id.as_str()],
                |row| row.get(0),
            )
            .optional()
    }

    /// `timesOf(taskId) -> (firstSeen, lastUpdated)`.
    pub fn times_of(
        &self,
        task_id: &TaskId,
    ) -> rusqlite::Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        self.conn
            .lock()
            .query_row(
                "SELECT first_seen, last_updated FROM tasks WHERE task_id = ?1",
                [task_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
    }

    /// `tagsOf(taskId)`.
    pub fn tags_of(&self, task_id: &TaskId) -> rusqlite::Result<HashSet<String>> {
        let csv: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT tags FROM tasks WHERE task_id = ?1",
                [task_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(csv.map(|c| csv_to_tags(&c)).unwrap_or_default())
    }

    /// `totalReports()`.
    pub fn total_reports(&self) -> rusqlite::Result<i64> {
        self.conn.lock().query_row(
            "SELECT COALESCE(SUM(num_reports), 0) FROM tasks",
            [],
            |row| row.get(0),
        )
    }

    /// `totalTasks()`.
    pub fn total_tasks(&self) -> rusqlite::Result<i64> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
    }
}

fn paginate<T>(rows: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    rows.into_iter().skip(offset).take(limit).collect()
}
