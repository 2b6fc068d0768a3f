//! Store configuration.
//!
//! Mirrors the shape of the teacher's `DatabaseConfig`
//! (connection pool tunables with a sane `Default`) and `CacheConfig`
//! (TTL-style tunables): one required input (`root`), the rest are
//! tunables with defaults taken straight from `spec.md` §6.

use std::path::PathBuf;
use std::time::Duration;

/// Default LRU staleness window (§4.3: "validFor is a fixed time
/// budget, 500 ms in the reference").
pub const DEFAULT_LRU_VALID_FOR: Duration = Duration::from_millis(500);

/// Default updater sleep interval (§4.6 step 3 / §6).
pub const DEFAULT_UPDATER_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of read retries for `getTagsForTask` (§4.7).
pub const DEFAULT_TAG_READ_RETRIES: u32 = 3;

/// Configuration for a [`crate::store::ReportStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory under which shard directories and the index live.
    /// The only required input per `spec.md` §6.
    pub root: PathBuf,

    /// LRU handle cache staleness window (§4.3).
    pub lru_valid_for: Duration,

    /// Updater sleep interval between drains of the pending map (§4.6).
    pub updater_interval: Duration,

    /// Read retries tolerated by `getTagsForTask` for a concurrent
    /// writer commit (§4.7).
    pub tag_read_retries: u32,
}

impl StoreConfig {
    /// Build a config with every tunable at its documented default,
    /// rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lru_valid_for: DEFAULT_LRU_VALID_FOR,
            updater_interval: DEFAULT_UPDATER_INTERVAL,
            tag_read_retries: DEFAULT_TAG_READ_RETRIES,
        }
    }

    /// Build a config from environment variables, falling back to
    /// defaults for anything unset or unparseable:
    ///
    /// - `XTRACE_ROOT` (required; missing root is a startup error)
    /// - `XTRACE_LRU_VALID_FOR_MS`
    /// - `XTRACE_UPDATER_INTERVAL_MS`
    /// - `XTRACE_TAG_READ_RETRIES`
    pub fn from_env() -> Option<Self> {
        let root = std::env::var("XTRACE_ROOT").ok()?;
        let mut config = Self::new(root);

        if let Some(ms) = env_u64("XTRACE_LRU_VALID_FOR_MS") {
            config.lru_valid_for = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("XTRACE_UPDATER_INTERVAL_MS") {
            config.updater_interval = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64("XTRACE_TAG_READ_RETRIES") {
            config.tag_read_retries = n as u32;
        }

        Some(config)
    }

    /// Path to the shard directory for a given 2-character prefix.
    pub fn shard_dir(&self, prefix: &str) -> PathBuf {
        self.root.join(prefix)
    }

    /// Path to the embedded index database file.
    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.sqlite")
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}
