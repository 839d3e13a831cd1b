//! Checkpoint codec: `StateSnapshot` ⇄ comment body.
//!
//! The snapshot is the only thing a restarted, memory-less worker has. The
//! codec therefore guarantees a lossless round-trip — `decode(encode(s)) ==
//! s` for every snapshot whose values are single-line — and decoding is
//! deliberately strict about the one invariant recovery depends on: at most
//! one in-progress entry (the resume point).
//!
//! Values are markdown-hostile free text. Encoding flattens embedded
//! newlines to spaces (a multiline value would otherwise smuggle section
//! headers or extra bullets into the body), and every value is written
//! behind a bullet prefix so a value that *starts* with `####` or `- `
//! still comes back intact.
//!
//! Body layout:
//!
//! ```text
//! ### State Snapshot
//!
//! #### Completed
//! - <task>
//!
//! #### In Progress
//! - <task>
//!
//! #### Pending
//! - <task>
//!
//! #### Blockers
//! - <blocker>
//!
//! #### Modified Files
//! - <path>
//!
//! #### Next Action
//! - <free text>
//!
//! #### Branch
//! - <identifier>
//! ```

use std::fmt::Write as _;

use crate::event::MARKER_SNAPSHOT;
use crate::event::parser::{bullets, first_nonblank, sections, single_value};
use crate::model::snapshot::StateSnapshot;

/// Why a snapshot body failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotDecodeError {
    /// The body does not open with the snapshot marker.
    #[error("body does not start with '{MARKER_SNAPSHOT}'")]
    NotASnapshot,

    /// More than one in-progress entry; the resume point must be unique.
    #[error("{0} in-progress entries; a snapshot carries at most one resume point")]
    MultipleInProgress(usize),
}

/// Render a snapshot as a checkpoint comment body.
///
/// Every section header is always emitted, empty or not, so the layout is
/// deterministic and diffs between consecutive checkpoints stay readable.
#[must_use]
pub fn encode(snapshot: &StateSnapshot) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "{MARKER_SNAPSHOT}");

    write_list(&mut body, "Completed", &snapshot.completed);
    let in_progress: Vec<String> = snapshot.in_progress.iter().cloned().collect();
    write_list(&mut body, "In Progress", &in_progress);
    write_list(&mut body, "Pending", &snapshot.pending);
    write_list(&mut body, "Blockers", &snapshot.blockers);
    write_list(&mut body, "Modified Files", &snapshot.modified_files);

    write_value(&mut body, "Next Action", &snapshot.next_action);
    write_value(&mut body, "Branch", &snapshot.branch);

    body
}

fn write_list(body: &mut String, header: &str, items: &[String]) {
    let _ = writeln!(body, "\n#### {header}");
    for item in items {
        let _ = writeln!(body, "- {}", flatten(item));
    }
}

fn write_value(body: &mut String, header: &str, value: &str) {
    let _ = writeln!(body, "\n#### {header}");
    let flat = flatten(value);
    if !flat.is_empty() {
        let _ = writeln!(body, "- {flat}");
    }
}

/// Collapse a value to one trimmed line.
fn flatten(value: &str) -> String {
    value
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode a checkpoint comment body.
///
/// Tolerant of unknown sections (skipped) and missing sections (empty).
///
/// # Errors
///
/// [`SnapshotDecodeError`] when the marker is absent or the in-progress
/// section names more than one resume point.
pub fn decode(body: &str) -> Result<StateSnapshot, SnapshotDecodeError> {
    if first_nonblank(body) != Some(MARKER_SNAPSHOT) {
        return Err(SnapshotDecodeError::NotASnapshot);
    }

    let mut snapshot = StateSnapshot::default();
    for (name, lines) in sections(body) {
        match name.as_str() {
            "Completed" => snapshot.completed = bullets(&lines),
            "In Progress" => {
                let entries = bullets(&lines);
                if entries.len() > 1 {
                    return Err(SnapshotDecodeError::MultipleInProgress(entries.len()));
                }
                snapshot.in_progress = entries.into_iter().next();
            }
            "Pending" => snapshot.pending = bullets(&lines),
            "Blockers" => snapshot.blockers = bullets(&lines),
            "Modified Files" => snapshot.modified_files = bullets(&lines),
            "Next Action" => snapshot.next_action = single_value(&lines).unwrap_or_default(),
            "Branch" => snapshot.branch = single_value(&lines).unwrap_or_default(),
            _ => {}
        }
    }
    Ok(snapshot)
}
