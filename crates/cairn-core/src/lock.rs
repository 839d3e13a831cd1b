//! Advisory resource locks derived from the epic's comment log.
//!
//! No lock entity is ever stored. A resource is locked iff its `## LOCK:`
//! markers outnumber its `## UNLOCK:` markers in log order — the state is a
//! pure function of the log, so any replica that can read the epic computes
//! the same answer.
//!
//! Enforcement is cooperative only. `acquire` checks `is_locked` first and
//! aborts if held, but nothing stops a non-cooperating writer; the owner of
//! a lock is tracked as free text in the comment and never enforced. This
//! is a documented limitation, not an oversight.

use tracing::info;

use crate::error::CoordError;
use crate::event::{Event, LogEvent, writer};
use crate::model::item::{ItemId, WorkerId};
use crate::store::WorkItemStore;

/// Whether `resource` is locked per the given epic log.
#[must_use]
pub fn is_locked(events: &[LogEvent], resource: &str) -> bool {
    let mut held = 0_i64;
    for entry in events {
        match &entry.event {
            Event::Lock { resource: name } if name == resource => held += 1,
            Event::Unlock { resource: name } if name == resource => held -= 1,
            _ => {}
        }
    }
    held > 0
}

/// Acquire the advisory lock on `resource` via the epic's log.
///
/// Reads the epic log first; appending through a held lock would defeat the
/// convention, so a held lock aborts the acquire.
///
/// # Errors
///
/// [`CoordError::LockHeld`] when the balance says the lock is held; store
/// failures otherwise.
pub fn acquire<S: WorkItemStore>(
    store: &S,
    epic: &ItemId,
    worker: &WorkerId,
    resource: &str,
) -> Result<(), CoordError> {
    let (_, comments) = store.get_item(epic)?;
    let events = crate::event::parse_log(&comments);
    if is_locked(&events, resource) {
        return Err(CoordError::LockHeld {
            resource: resource.to_string(),
        });
    }
    append(store, epic, worker, &Event::Lock {
        resource: resource.to_string(),
    })?;
    info!(%epic, resource, %worker, "advisory lock acquired");
    Ok(())
}

/// Release the advisory lock on `resource`.
///
/// The releaser should be the logical owner; ownership lives in free text,
/// so this cannot be enforced and is not.
///
/// # Errors
///
/// Store failures.
pub fn release<S: WorkItemStore>(
    store: &S,
    epic: &ItemId,
    worker: &WorkerId,
    resource: &str,
) -> Result<(), CoordError> {
    append(store, epic, worker, &Event::Unlock {
        resource: resource.to_string(),
    })?;
    info!(%epic, resource, %worker, "advisory lock released");
    Ok(())
}

fn append<S: WorkItemStore>(
    store: &S,
    epic: &ItemId,
    worker: &WorkerId,
    event: &Event,
) -> Result<(), CoordError> {
    if let Some(body) = writer::render(event) {
        store.append_comment(epic, worker, &body)?;
    }
    Ok(())
}
