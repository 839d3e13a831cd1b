//! Scope declarations and file-footprint conflict detection.
//!
//! Before touching files, a claimed item declares the paths it will modify.
//! The registry scans the other in-progress items of the same wave, takes
//! each one's latest declaration (log order — a fresh declaration
//! supersedes everything before it), and intersects claimed paths.
//!
//! Conflicts are advisory: they are surfaced for negotiation and never
//! auto-resolved. Agreement is reached by both items posting fresh,
//! disjoint declarations; until then the overlap stays blocked.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::error::CoordError;
use crate::event::{Event, LogEvent, parse_log, writer};
use crate::model::item::{ItemId, Label, WorkerId};
use crate::model::snapshot::ScopeDeclaration;
use crate::store::WorkItemStore;

/// One overlapping item and the contested paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeConflict {
    /// The other in-progress item claiming the same paths.
    pub with_item: ItemId,
    /// The intersection of claimed paths.
    pub paths: BTreeSet<String>,
}

/// Outcome of a conflict scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    /// No overlap; safe to proceed.
    Clear,
    /// Overlaps found. Work on the contested paths must not start until
    /// fresh disjoint declarations land on both items.
    NeedsNegotiation(Vec<ScopeConflict>),
}

impl NegotiationState {
    /// Turn an unresolved overlap into a hard error for callers that must
    /// not start work on contested paths.
    ///
    /// # Errors
    ///
    /// [`CoordError::ScopeConflict`] when negotiation is still pending.
    pub fn require_clear(&self, item: &ItemId) -> Result<(), CoordError> {
        match self {
            Self::Clear => Ok(()),
            Self::NeedsNegotiation(conflicts) => Err(CoordError::ScopeConflict {
                item: item.clone(),
                overlaps: conflicts.len(),
            }),
        }
    }
}

/// The latest scope declaration in a parsed log, if any.
#[must_use]
pub fn latest_declaration(events: &[LogEvent]) -> Option<ScopeDeclaration> {
    events.iter().rev().find_map(|entry| match &entry.event {
        Event::Scope(declaration) => Some(declaration.clone()),
        _ => None,
    })
}

/// Append a scope declaration to the item's log.
///
/// A new declaration supersedes all earlier ones, which is also how a
/// negotiated override is recorded.
///
/// # Errors
///
/// Store failures.
pub fn declare<S: WorkItemStore>(
    store: &S,
    worker: &WorkerId,
    item: &ItemId,
    declaration: &ScopeDeclaration,
) -> Result<(), CoordError> {
    if let Some(body) = writer::render(&Event::Scope(declaration.clone())) {
        store.append_comment(item, worker, &body)?;
    }
    info!(%item, claimed = declaration.claimed.len(), "scope declared");
    Ok(())
}

/// Scan `siblings` (the other items of the item's wave) for claimed-path
/// overlap with `declaration`.
///
/// Only in-progress, non-terminal siblings participate; an item that was
/// completed or released no longer holds its paths. Siblings that vanished
/// from the store are skipped with a warning rather than failing the scan —
/// their disappearance is escalated elsewhere.
///
/// # Errors
///
/// Store failures other than a vanished sibling.
pub fn check_conflicts<S: WorkItemStore>(
    store: &S,
    item: &ItemId,
    declaration: &ScopeDeclaration,
    siblings: &[ItemId],
) -> Result<Vec<ScopeConflict>, CoordError> {
    let mut conflicts = Vec::new();
    for sibling in siblings {
        if sibling == item {
            continue;
        }
        let (sibling_item, comments) = match store.get_item(sibling) {
            Ok(found) => found,
            Err(crate::store::StoreError::ItemNotFound(id)) => {
                warn!(%id, "sibling vanished during scope scan; skipping");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        if !sibling_item.has_label(&Label::InProgress) || sibling_item.is_terminal() {
            continue;
        }
        let Some(theirs) = latest_declaration(&parse_log(&comments)) else {
            continue;
        };
        let paths = declaration.overlap(&theirs);
        if !paths.is_empty() {
            conflicts.push(ScopeConflict {
                with_item: sibling.clone(),
                paths,
            });
        }
    }
    Ok(conflicts)
}

/// Classify a scan result.
#[must_use]
pub fn negotiation_state(conflicts: Vec<ScopeConflict>) -> NegotiationState {
    if conflicts.is_empty() {
        NegotiationState::Clear
    } else {
        NegotiationState::NeedsNegotiation(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::item::WorkItem;
    use crate::store::MemStore;
    use std::collections::BTreeSet;

    fn declaration(paths: &[&str]) -> ScopeDeclaration {
        ScopeDeclaration {
            claimed: paths.iter().map(ToString::to_string).collect(),
            excluded: BTreeSet::new(),
        }
    }

    fn seed(store: &MemStore, id: &str, in_progress: bool) -> ItemId {
        let id = ItemId::new_unchecked(id);
        let mut labels = BTreeSet::new();
        labels.insert(if in_progress {
            Label::InProgress
        } else {
            Label::Ready
        });
        store.insert_item(WorkItem {
            id: id.clone(),
            title: String::new(),
            body: String::new(),
            assignee: None,
            labels,
            closed: false,
        });
        id
    }

    #[test]
    fn disjoint_declarations_are_clear() {
        let store = MemStore::new();
        let worker = WorkerId::new("alice");
        let a = seed(&store, "a", true);
        let b = seed(&store, "b", true);
        declare(&store, &worker, &b, &declaration(&["src/io.rs"])).expect("declare");

        let conflicts =
            check_conflicts(&store, &a, &declaration(&["src/auth.rs"]), &[b]).expect("scan");
        assert!(conflicts.is_empty());
        assert_eq!(negotiation_state(conflicts), NegotiationState::Clear);
    }

    #[test]
    fn overlap_with_in_progress_sibling_is_a_conflict() {
        let store = MemStore::new();
        let worker = WorkerId::new("bob");
        let a = seed(&store, "a", true);
        let b = seed(&store, "b", true);
        declare(
            &store,
            &worker,
            &b,
            &declaration(&["src/auth.rs", "src/io.rs"]),
        )
        .expect("declare");

        let conflicts = check_conflicts(
            &store,
            &a,
            &declaration(&["src/auth.rs", "src/claim.rs"]),
            &[b.clone()],
        )
        .expect("scan");
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].with_item, b);
        assert!(conflicts[0].paths.contains("src/auth.rs"));
        assert!(matches!(
            negotiation_state(conflicts),
            NegotiationState::NeedsNegotiation(_)
        ));
    }

    #[test]
    fn idle_siblings_do_not_hold_paths() {
        let store = MemStore::new();
        let worker = WorkerId::new("bob");
        let a = seed(&store, "a", true);
        let b = seed(&store, "b", false); // ready, not in-progress
        declare(&store, &worker, &b, &declaration(&["src/auth.rs"])).expect("declare");

        let conflicts =
            check_conflicts(&store, &a, &declaration(&["src/auth.rs"]), &[b]).expect("scan");
        assert!(conflicts.is_empty());
    }

    #[test]
    fn latest_declaration_supersedes_earlier_ones() {
        let store = MemStore::new();
        let worker = WorkerId::new("bob");
        let a = seed(&store, "a", true);
        let b = seed(&store, "b", true);
        declare(&store, &worker, &b, &declaration(&["src/auth.rs"])).expect("first");
        // Renegotiated: b backs off the contested path.
        declare(&store, &worker, &b, &declaration(&["src/io.rs"])).expect("second");

        let conflicts =
            check_conflicts(&store, &a, &declaration(&["src/auth.rs"]), &[b]).expect("scan");
        assert!(conflicts.is_empty());
    }

    #[test]
    fn vanished_sibling_is_skipped() {
        let store = MemStore::new();
        let a = seed(&store, "a", true);
        let ghost = ItemId::new_unchecked("ghost");
        let conflicts =
            check_conflicts(&store, &a, &declaration(&["src/auth.rs"]), &[ghost]).expect("scan");
        assert!(conflicts.is_empty());
    }

    #[test]
    fn pending_negotiation_hardens_into_a_scope_conflict_error() {
        let item = ItemId::new_unchecked("a");
        let state = negotiation_state(vec![ScopeConflict {
            with_item: ItemId::new_unchecked("b"),
            paths: ["src/auth.rs".to_string()].into_iter().collect(),
        }]);
        let err = state.require_clear(&item).expect_err("conflict");
        assert_eq!(err, CoordError::ScopeConflict { item, overlaps: 1 });
        assert!(negotiation_state(Vec::new())
            .require_clear(&ItemId::new_unchecked("a"))
            .is_ok());
    }
}
