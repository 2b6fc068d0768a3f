//! `TaskId`: an opaque byte-string identifier (`spec.md` §3).
//!
//! String form is uppercase hexadecimal, length >= 6; the first two
//! characters form a directory-shard prefix. Per the Open Question
//! resolution in `DESIGN.md` #1, both parse paths and all storage
//! paths normalize to uppercase.

use std::fmt;

/// Minimum accepted length for a task-id string (`spec.md` §3/§4.2).
pub const MIN_TASK_ID_LEN: usize = 6;

/// An immutable, by-value-compared task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

/// Error returned when a candidate string fails task-id validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TaskIdError {
    /// Shorter than [`MIN_TASK_ID_LEN`].
    #[error("task id shorter than {MIN_TASK_ID_LEN} characters")]
    TooShort,
    /// Contains a non-hexadecimal character.
    #[error("task id is not hexadecimal")]
    NotHex,
}

impl TaskId {
    /// Parse and normalize a raw task-id string, uppercasing it.
    ///
    /// Fails fast (per `spec.md` §4.2: "Task-ids shorter than 6
    /// characters are rejected with a fail-fast error from C3") rather
    /// than silently truncating or padding.
    pub fn parse(raw: &str) -> Result<Self, TaskIdError> {
        if raw.len() < MIN_TASK_ID_LEN {
            return Err(TaskIdError::TooShort);
        }
        if !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TaskIdError::NotHex);
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    /// The task-id's string form (uppercase hex).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two-character directory-shard prefix.
    pub fn shard_prefix(&self) -> &str {
        &self.0[0..2]
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
