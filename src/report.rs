//! C1: Report Parser.
//!
//! Extracts X-Trace metadata, optional Title/Tag fields, and the raw
//! body from a framed text report (`spec.md` §4.1, §6). Two parse
//! paths coexist for backward compatibility: a fast path that assumes
//! the metadata line sits immediately after the header, and a slow
//! path that scans line-by-line. Both normalize the decoded task-id to
//! uppercase (`DESIGN.md` Open Question #1).
//!
//! Decoding of the hex metadata blob beyond "its leading field is the
//! task-id" is out of scope (`spec.md` §6); this module treats
//! everything but a trailing 4-byte (8 hex character) operation-id as
//! the task-id, which is enough hex to satisfy the >= 6 character
//! minimum for any report carrying a real trace context.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::task_id::TaskId;

const REPORT_HEADER_PREFIX: &str = "X-Trace Report ver";
const XTRACE_FIELD_PREFIX: &str = "X-Trace:";
const TITLE_FIELD_PREFIX: &str = "Title:";
const TAG_FIELD_PREFIX: &str = "Tag:";

/// Number of trailing hex characters in the metadata blob reserved for
/// the operation-id (4 bytes), per this module's simplified codec.
const OP_ID_HEX_LEN: usize = 8;

/// A successfully parsed report, ready for C2/C4.
#[derive(Debug, Clone)]
pub struct ParsedReport {
    /// The task-id extracted from the `X-Trace:` metadata line.
    pub task_id: TaskId,
    /// The first `Title:` value seen, if any.
    pub title: Option<String>,
    /// The union of all `Tag:` values seen.
    pub tags: HashSet<String>,
    /// The raw report text, unmodified, for persistence by C2.
    pub raw: String,
}

/// Why a report was dropped (`spec.md` §4.1/§7: dropping never raises,
/// only logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// No line matched the `X-Trace:` metadata pattern.
    NoMetadataLine,
    /// A metadata line was found but no task-id could be decoded from it.
    MissingTaskId,
}

fn xtrace_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^X-Trace:\s+([0-9A-Fa-f]+)\s*$").unwrap())
}

/// Parse a single report buffer, logging and returning `Err` on any
/// recognized failure mode rather than propagating (`spec.md` §7).
pub fn parse(raw: &str) -> Result<ParsedReport, ParseFailure> {
    match try_fast_path(raw) {
        FastPathOutcome::Parsed(report) => return Ok(report),
        FastPathOutcome::FallThrough => {}
    }
    parse_slow_path(raw)
}

enum FastPathOutcome {
    Parsed(ParsedReport),
    FallThrough,
}

/// Fast path: the metadata line is expected immediately after the
/// report header line. If the line after it carries `Tag:`/`Title:`,
/// fall through to the slow path per `spec.md` §4.1/§9.
fn try_fast_path(raw: &str) -> FastPathOutcome {
    let mut lines = raw.lines();
    let Some(header) = lines.next() else {
        return FastPathOutcome::FallThrough;
    };
    if !header.starts_with(REPORT_HEADER_PREFIX) {
        return FastPathOutcome::FallThrough;
    }

    let Some(metadata_line) = lines.next() else {
        return FastPathOutcome::FallThrough;
    };
    if !metadata_line.starts_with(XTRACE_FIELD_PREFIX) {
        return FastPathOutcome::FallThrough;
    }

    if let Some(next_line) = lines.next() {
        if next_line.starts_with(TAG_FIELD_PREFIX) || next_line.starts_with(TITLE_FIELD_PREFIX) {
            return FastPathOutcome::FallThrough;
        }
    }

    let hex = metadata_line[XTRACE_FIELD_PREFIX.len()..].trim();
    match decode_task_id(hex) {
        Some(task_id) => FastPathOutcome::Parsed(ParsedReport {
            task_id,
            title: None,
            tags: HashSet::new(),
            raw: raw.to_string(),
        }),
        None => FastPathOutcome::FallThrough,
    }
}

/// Slow path: scan every line, collecting the metadata, the first
/// title, and the full tag set.
fn parse_slow_path(raw: &str) -> Result<ParsedReport, ParseFailure> {
    let mut task_id = None;
    let mut title = None;
    let mut tags = HashSet::new();

    for line in raw.lines() {
        if task_id.is_none() {
            if let Some(caps) = xtrace_line_re().captures(line) {
                task_id = decode_task_id(&caps[1]);
                if task_id.is_none() {
                    return Err(ParseFailure::MissingTaskId);
                }
                continue;
            }
        }
        if title.is_none() {
            if let Some(value) = line.strip_prefix(TITLE_FIELD_PREFIX) {
                title = Some(value.trim().to_string());
                continue;
            }
        }
        if let Some(value) = line.strip_prefix(TAG_FIELD_PREFIX) {
            tags.insert(value.trim().to_string());
        }
    }

    let task_id = task_id.ok_or(ParseFailure::NoMetadataLine)?;
    Ok(ParsedReport {
        task_id,
        title,
        tags,
        raw: raw.to_string(),
    })
}

/// Decode the leading task-id field out of a hex metadata blob.
fn decode_task_id(hex: &str) -> Option<TaskId> {
    let hex = hex.trim();
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let task_id_hex = if hex.len() > OP_ID_HEX_LEN {
        &hex[..hex.len() - OP_ID_HEX_LEN]
    } else {
        hex
    };
    TaskId::parse(task_id_hex).ok()
}
