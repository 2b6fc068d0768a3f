//! Top-level error types.
//!
//! Per `spec.md` §7, only startup/construction paths propagate errors.
//! Everything past startup (malformed reports, per-report disk errors,
//! per-task index errors, query errors) is logged and absorbed at the
//! component boundary instead of bubbling up through `StoreError`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while opening or constructing a [`crate::store::ReportStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// The root directory does not exist, or could not be created.
    #[error("root directory not writable: {0}")]
    RootNotWritable(PathBuf),

    /// A task-id failed the minimum-length or hex-alphabet validation.
    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    /// Underlying filesystem error during setup.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The embedded metadata index could not be opened or migrated.
    #[error("index error: {0}")]
    Index(#[from] rusqlite::Error),
}

/// Result alias for fallible store construction.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
