//! Marker-grammar writer: typed events back to comment bodies.
//!
//! Deterministic: the same event always renders to the same bytes, and
//! every structured body it produces parses back to the same event
//! (`parse(render(e)) == e`). Free text never goes through here — workers
//! append it to the store directly.

use std::fmt::Write as _;

use crate::checkpoint;
use crate::event::{
    Event, MARKER_ACK, MARKER_BROADCAST, MARKER_CLAIMED, MARKER_LOCK, MARKER_RELEASED,
    MARKER_SCOPE, MARKER_THREAD, MARKER_THREAD_CLOSED, MARKER_UNLOCK,
};

/// Render a structured event to a comment body.
///
/// Returns `None` for [`Event::Unstructured`]: free text is not re-encoded.
#[must_use]
pub fn render(event: &Event) -> Option<String> {
    let mut body = String::new();
    match event {
        Event::Claimed { worker } => {
            let _ = writeln!(body, "{MARKER_CLAIMED}\n\nworker: {worker}");
        }
        Event::Released { worker, reason } => {
            let _ = writeln!(body, "{MARKER_RELEASED}\n\nworker: {worker}");
            if let Some(reason) = reason {
                let _ = writeln!(body, "reason: {reason}");
            }
        }
        Event::Scope(declaration) => {
            let _ = writeln!(body, "{MARKER_SCOPE}\n\n#### Claimed");
            for path in &declaration.claimed {
                let _ = writeln!(body, "- {path}");
            }
            let _ = writeln!(body, "\n#### Excluded");
            for path in &declaration.excluded {
                let _ = writeln!(body, "- {path}");
            }
        }
        Event::Checkpoint(snapshot) => body = checkpoint::encode(snapshot),
        Event::Lock { resource } => {
            let _ = writeln!(body, "{MARKER_LOCK} {resource}");
        }
        Event::Unlock { resource } => {
            let _ = writeln!(body, "{MARKER_UNLOCK} {resource}");
        }
        Event::Broadcast {
            decision_id,
            summary,
            hub,
        } => {
            let _ = writeln!(body, "{MARKER_BROADCAST} {decision_id}");
            if let Some(hub) = hub {
                let _ = writeln!(body, "\nhub: {hub}");
            }
            if !summary.is_empty() {
                let _ = writeln!(body, "\n{summary}");
            }
        }
        Event::Ack { decision_id } => {
            let _ = writeln!(body, "{MARKER_ACK} {decision_id}");
        }
        Event::ThreadOpened { phase } => {
            let _ = writeln!(body, "{MARKER_THREAD} {phase}");
        }
        Event::ThreadClosed { phase, outcome } => {
            let _ = writeln!(body, "{MARKER_THREAD_CLOSED}");
            if phase.is_some() || outcome.is_some() {
                body.push('\n');
            }
            if let Some(phase) = phase {
                let _ = writeln!(body, "phase: {phase}");
            }
            if let Some(outcome) = outcome {
                let _ = writeln!(body, "outcome: {outcome}");
            }
        }
        Event::Unstructured { .. } => return None,
    }
    Some(body)
}
