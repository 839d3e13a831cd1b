//! Typed event model for the per-item comment log.
//!
//! Comments are the only durable shared state in the protocol. Structured
//! comments are recognized by a leading marker line and parsed into typed
//! [`Event`] variants; anything else degrades to [`Event::Unstructured`] and
//! is preserved but ignored by the engine.
//!
//! # Marker vocabulary
//!
//! ```text
//! ## Claimed                ## Released
//! ### Scope Declaration     ### State Snapshot
//! ## LOCK: <name>           ## UNLOCK: <name>
//! ## BROADCAST: <id>        ## ACK: <id>
//! ## Thread: <phase>        ## Thread Closed
//! ```
//!
//! Ordering is log position (`seq`), assigned by the store. Timestamps on
//! comments are display-only and never participate in any decision.

pub mod parser;
pub mod writer;

pub use parser::{parse_comment, parse_log};
pub use writer::render;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::item::{ItemId, WorkerId};
use crate::model::snapshot::{ScopeDeclaration, StateSnapshot};
use crate::phase::Phase;

/// Marker line opening a claim comment.
pub const MARKER_CLAIMED: &str = "## Claimed";
/// Marker line opening a release comment.
pub const MARKER_RELEASED: &str = "## Released";
/// Marker line opening a scope declaration.
pub const MARKER_SCOPE: &str = "### Scope Declaration";
/// Marker line opening a checkpoint snapshot.
pub const MARKER_SNAPSHOT: &str = "### State Snapshot";
/// Marker prefix for lock acquisition.
pub const MARKER_LOCK: &str = "## LOCK:";
/// Marker prefix for lock release.
pub const MARKER_UNLOCK: &str = "## UNLOCK:";
/// Marker prefix for a decision broadcast.
pub const MARKER_BROADCAST: &str = "## BROADCAST:";
/// Marker prefix for a decision acknowledgement.
pub const MARKER_ACK: &str = "## ACK:";
/// Marker prefix for opening a phase thread.
pub const MARKER_THREAD: &str = "## Thread:";
/// Marker line for closing the open phase thread.
pub const MARKER_THREAD_CLOSED: &str = "## Thread Closed";

/// How a phase thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreadOutcome {
    /// The phase's exit criteria were met.
    Pass,
    /// A review verdict failed; work demotes to dev.
    Fail,
    /// A structural issue surfaced during test; work demotes to dev.
    StructuralIssue,
}

impl ThreadOutcome {
    /// Canonical marker-grammar spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::StructuralIssue => "structural-issue",
        }
    }

    /// Parse the marker-grammar spelling. Returns `None` for anything else.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pass" => Some(Self::Pass),
            "fail" => Some(Self::Fail),
            "structural-issue" => Some(Self::StructuralIssue),
            _ => None,
        }
    }
}

impl fmt::Display for ThreadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured protocol event recognized in a comment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The worker claimed the item.
    Claimed {
        /// The claiming worker.
        worker: WorkerId,
    },
    /// The worker (or a coordinator) released the claim.
    Released {
        /// The worker whose claim ended.
        worker: WorkerId,
        /// Optional free-text reason.
        reason: Option<String>,
    },
    /// A scope declaration for the item.
    Scope(ScopeDeclaration),
    /// A checkpoint carrying a full state snapshot.
    Checkpoint(StateSnapshot),
    /// Advisory lock acquisition on the epic log.
    Lock {
        /// The named shared resource.
        resource: String,
    },
    /// Advisory lock release on the epic log.
    Unlock {
        /// The named shared resource.
        resource: String,
    },
    /// A decision broadcast (on the hub, or propagated onto a dependent).
    Broadcast {
        /// Stable decision reference.
        decision_id: String,
        /// One-paragraph decision summary.
        summary: String,
        /// Back-reference to the hub; present only on propagated copies.
        hub: Option<ItemId>,
    },
    /// Acknowledgement settling a decision for this item.
    Ack {
        /// The decision reference being settled.
        decision_id: String,
    },
    /// A phase thread was opened.
    ThreadOpened {
        /// Which phase the thread belongs to.
        phase: Phase,
    },
    /// The open phase thread was closed.
    ThreadClosed {
        /// Which phase closed, when recorded.
        phase: Option<Phase>,
        /// How the thread ended, when recorded.
        outcome: Option<ThreadOutcome>,
    },
    /// Free text: preserved in the log, ignored by the engine.
    Unstructured {
        /// The raw comment body.
        raw: String,
    },
}

impl Event {
    /// Whether this is a structured (engine-visible) event.
    #[must_use]
    pub const fn is_structured(&self) -> bool {
        !matches!(self, Self::Unstructured { .. })
    }
}

/// An [`Event`] paired with its log position and author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Store-assigned log position within the item.
    pub seq: u64,
    /// The comment's author.
    pub author: WorkerId,
    /// The parsed event.
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_outcome_round_trips() {
        for outcome in [
            ThreadOutcome::Pass,
            ThreadOutcome::Fail,
            ThreadOutcome::StructuralIssue,
        ] {
            assert_eq!(ThreadOutcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(ThreadOutcome::parse("maybe"), None);
    }

    #[test]
    fn unstructured_is_not_structured() {
        let event = Event::Unstructured {
            raw: "just a note".to_string(),
        };
        assert!(!event.is_structured());
        assert!(
            Event::Ack {
                decision_id: "D-1".to_string()
            }
            .is_structured()
        );
    }
}
