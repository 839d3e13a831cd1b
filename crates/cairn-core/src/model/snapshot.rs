use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::item::ItemId;

/// Serialized working state at a point in time.
///
/// Exactly one snapshot is authoritative for an item: the most recent
/// checkpoint by log position. Recovery idempotence is structural equality
/// of this type, so every field is ordered and deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Tasks finished before this checkpoint, in completion order.
    pub completed: Vec<String>,
    /// The single task underway, if any. The resume point after recovery.
    pub in_progress: Option<String>,
    /// Tasks not yet started, in planned order.
    pub pending: Vec<String>,
    /// Known blockers at checkpoint time.
    pub blockers: Vec<String>,
    /// Files modified so far on the working branch.
    pub modified_files: Vec<String>,
    /// Opaque description of the first operation after resume.
    pub next_action: String,
    /// Branch or resource identifier the work lives on.
    pub branch: String,
}

impl StateSnapshot {
    /// Whether the snapshot carries any state worth resuming from.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
            && self.in_progress.is_none()
            && self.pending.is_empty()
            && self.blockers.is_empty()
            && self.modified_files.is_empty()
            && self.next_action.is_empty()
            && self.branch.is_empty()
    }
}

/// A work item's stated file footprint.
///
/// `claimed` paths will be modified; `excluded` paths are explicitly left
/// alone. Overlap of claimed paths across concurrently open items in one
/// wave is a conflict that must be negotiated, never auto-resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDeclaration {
    /// Paths this item will modify.
    pub claimed: BTreeSet<String>,
    /// Paths this item explicitly will not touch.
    pub excluded: BTreeSet<String>,
}

impl ScopeDeclaration {
    /// Paths claimed by both declarations.
    #[must_use]
    pub fn overlap(&self, other: &Self) -> BTreeSet<String> {
        self.claimed.intersection(&other.claimed).cloned().collect()
    }
}

/// A decision posted on a hub item and propagated to dependents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Stable reference string, e.g. `D-014`.
    pub id: String,
    /// One-paragraph summary of what was decided.
    pub summary: String,
    /// The hub item the decision was first posted on.
    pub hub: ItemId,
}
