//! Checkpoint-based crash recovery.
//!
//! A restarted worker has no memory: everything it knows must come back
//! from the item's comment log. Recovery scans backward for the most recent
//! decodable checkpoint — by log position, never timestamp; two checkpoints
//! with out-of-order clocks still resolve by where they sit in the log —
//! and rebuilds the in-memory task state from it.
//!
//! # Recovery philosophy
//!
//! - **Deterministic**: same log → same recovered state, every time. Running
//!   recovery twice against an unchanged log yields identical results.
//! - **Degrade, never crash**: a malformed snapshot is skipped with a
//!   warning and the scan continues to the next older checkpoint; a log
//!   with no usable checkpoint recovers to `NoPriorState`.
//! - **Advisory cross-checks**: branch/file existence is verified through a
//!   caller-supplied probe and *reported*, never auto-corrected — a missing
//!   branch usually means a push failed before the crash.

use tracing::warn;

use crate::checkpoint;
use crate::error::ErrorCode;
use crate::event::MARKER_SNAPSHOT;
use crate::event::parser::first_nonblank;
use crate::model::item::Comment;
use crate::model::snapshot::StateSnapshot;

/// Advisory cross-check against the external workspace (git, filesystem).
///
/// Implemented by an external collaborator; the engine itself never touches
/// a repository.
pub trait WorkspaceProbe {
    /// Whether the named branch exists (locally or on the remote the
    /// protocol pushes to).
    fn branch_exists(&self, branch: &str) -> bool;

    /// Whether the given path exists in the working tree.
    fn file_exists(&self, path: &str) -> bool;
}

/// Probe that reports everything present. Used when no workspace is
/// available to check against.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProbe;

impl WorkspaceProbe for NullProbe {
    fn branch_exists(&self, _branch: &str) -> bool {
        true
    }

    fn file_exists(&self, _path: &str) -> bool {
        true
    }
}

/// A discrepancy between the snapshot and the observable workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// The snapshot's branch is nowhere to be found — likely a failed push.
    MissingBranch(String),
    /// A file the snapshot says was modified does not exist.
    MissingFile(String),
}

/// The plan rebuilt from the authoritative checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePlan {
    /// The decoded snapshot, kept whole as last-known-good context.
    pub snapshot: StateSnapshot,
    /// Log position of the checkpoint the plan was built from.
    pub checkpoint_seq: u64,
    /// The single in-progress entry to resume, if any.
    pub resume_point: Option<String>,
    /// Operation queue: the snapshot's next action first, then pending
    /// tasks in order.
    pub operations: Vec<String>,
    /// Newer checkpoints that failed to decode and were skipped.
    pub skipped_malformed: u32,
    /// Workspace discrepancies, reported for the caller to act on.
    pub advisories: Vec<Advisory>,
}

/// Result of recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveredState {
    /// No usable checkpoint; treat as a fresh claim.
    NoPriorState,
    /// Resume from the most recent decodable checkpoint.
    Resumed(ResumePlan),
}

/// Recover task state from an item's comment log.
///
/// Pure in the log and the probe: calling it twice against an unchanged log
/// yields an identical [`RecoveredState`].
#[must_use]
pub fn recover(comments: &[Comment], probe: &impl WorkspaceProbe) -> RecoveredState {
    let mut skipped = 0_u32;
    for comment in comments.iter().rev() {
        if first_nonblank(&comment.body) != Some(MARKER_SNAPSHOT) {
            continue;
        }
        match checkpoint::decode(&comment.body) {
            Ok(snapshot) => {
                return RecoveredState::Resumed(build_plan(snapshot, comment.seq, skipped, probe));
            }
            Err(err) => {
                warn!(
                    code = %ErrorCode::MalformedSnapshot,
                    seq = comment.seq,
                    %err,
                    "skipping malformed checkpoint"
                );
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        warn!(
            code = %ErrorCode::MalformedSnapshot,
            skipped,
            "no decodable checkpoint; recovering as fresh claim"
        );
    }
    RecoveredState::NoPriorState
}

fn build_plan(
    snapshot: StateSnapshot,
    checkpoint_seq: u64,
    skipped_malformed: u32,
    probe: &impl WorkspaceProbe,
) -> ResumePlan {
    let mut operations = Vec::with_capacity(1 + snapshot.pending.len());
    if !snapshot.next_action.is_empty() {
        operations.push(snapshot.next_action.clone());
    }
    operations.extend(snapshot.pending.iter().cloned());

    let mut advisories = Vec::new();
    if !snapshot.branch.is_empty() && !probe.branch_exists(&snapshot.branch) {
        advisories.push(Advisory::MissingBranch(snapshot.branch.clone()));
    }
    for path in &snapshot.modified_files {
        if !probe.file_exists(path) {
            advisories.push(Advisory::MissingFile(path.clone()));
        }
    }

    ResumePlan {
        resume_point: snapshot.in_progress.clone(),
        snapshot,
        checkpoint_seq,
        operations,
        skipped_malformed,
        advisories,
    }
}
