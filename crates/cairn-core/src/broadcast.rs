//! Decision broadcast and acknowledgement tracking.
//!
//! A decision is posted once on the hub item (the epic), then explicitly
//! re-posted onto every affected item with a back-reference. Each affected
//! item settles the decision by appending an ACK that references it. There
//! is no timeout escalation: an unsettled decision blocks dependent work
//! until acknowledged or manually re-raised on the hub.

use tracing::info;

use crate::error::CoordError;
use crate::event::{Event, LogEvent, writer};
use crate::model::item::{ItemId, WorkerId};
use crate::model::snapshot::Decision;
use crate::store::WorkItemStore;

/// Post a decision on its hub item.
///
/// # Errors
///
/// Store failures.
pub fn post<S: WorkItemStore>(
    store: &S,
    worker: &WorkerId,
    decision: &Decision,
) -> Result<(), CoordError> {
    append(store, &decision.hub, worker, &Event::Broadcast {
        decision_id: decision.id.clone(),
        summary: decision.summary.clone(),
        hub: None,
    })?;
    info!(hub = %decision.hub, decision = decision.id, "decision posted");
    Ok(())
}

/// Propagate a posted decision onto each affected item.
///
/// The copies carry a back-reference to the hub so a reader of any affected
/// item can find the original thread.
///
/// # Errors
///
/// Store failures. Propagation stops at the first failing item so the
/// caller knows exactly which copies landed.
pub fn propagate<S: WorkItemStore>(
    store: &S,
    worker: &WorkerId,
    decision: &Decision,
    affected: &[ItemId],
) -> Result<(), CoordError> {
    for item in affected {
        append(store, item, worker, &Event::Broadcast {
            decision_id: decision.id.clone(),
            summary: decision.summary.clone(),
            hub: Some(decision.hub.clone()),
        })?;
    }
    info!(
        decision = decision.id,
        items = affected.len(),
        "decision propagated"
    );
    Ok(())
}

/// Record an item's acceptance of a decision.
///
/// # Errors
///
/// Store failures.
pub fn acknowledge<S: WorkItemStore>(
    store: &S,
    worker: &WorkerId,
    item: &ItemId,
    decision_id: &str,
) -> Result<(), CoordError> {
    append(store, item, worker, &Event::Ack {
        decision_id: decision_id.to_string(),
    })?;
    info!(%item, decision = decision_id, "decision acknowledged");
    Ok(())
}

/// Whether the decision is settled for an item: an ACK referencing it
/// exists on the item's own log.
#[must_use]
pub fn is_settled(events: &[LogEvent], decision_id: &str) -> bool {
    events.iter().any(|entry| {
        matches!(&entry.event, Event::Ack { decision_id: acked } if acked == decision_id)
    })
}

/// Fail with `DecisionUnsettled` unless the item has acknowledged.
///
/// # Errors
///
/// [`CoordError::DecisionUnsettled`] when no ACK exists.
pub fn require_settled(
    events: &[LogEvent],
    item: &ItemId,
    decision_id: &str,
) -> Result<(), CoordError> {
    if is_settled(events, decision_id) {
        Ok(())
    } else {
        Err(CoordError::DecisionUnsettled {
            item: item.clone(),
            decision_id: decision_id.to_string(),
        })
    }
}

fn append<S: WorkItemStore>(
    store: &S,
    item: &ItemId,
    worker: &WorkerId,
    event: &Event,
) -> Result<(), CoordError> {
    if let Some(body) = writer::render(event) {
        store.append_comment(item, worker, &body)?;
    }
    Ok(())
}
