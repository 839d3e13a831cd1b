//! Tolerant, deterministic marker-grammar parser.
//!
//! Turns a work item's ordered comments into typed [`LogEvent`]s. The parser
//! is total: it never errors on malformed input. Anything it cannot
//! recognize — including a recognized marker with an undecodable body —
//! degrades to [`Event::Unstructured`] carrying the raw text. Output order
//! is input order, and parsing is a pure function of the bodies, which is
//! what makes crash recovery idempotent.
//!
//! Classification looks only at the first non-blank line of a body. Detail
//! lines (`key: value`) and `####` bullet sections supply the payload.

use tracing::debug;

use crate::checkpoint;
use crate::event::{
    Event, LogEvent, MARKER_ACK, MARKER_BROADCAST, MARKER_CLAIMED, MARKER_LOCK, MARKER_RELEASED,
    MARKER_SCOPE, MARKER_SNAPSHOT, MARKER_THREAD, MARKER_THREAD_CLOSED, MARKER_UNLOCK,
    ThreadOutcome,
};
use crate::model::item::{Comment, ItemId, WorkerId};
use crate::model::snapshot::ScopeDeclaration;
use crate::phase::Phase;

/// Parse one comment into a positioned event.
///
/// Total: malformed structured comments degrade to `Unstructured` with a
/// `debug!` trace, never an error.
#[must_use]
pub fn parse_comment(comment: &Comment) -> LogEvent {
    let event = classify(comment).unwrap_or_else(|| {
        Event::Unstructured {
            raw: comment.body.clone(),
        }
    });
    LogEvent {
        seq: comment.seq,
        author: comment.author.clone(),
        event,
    }
}

/// Parse an item's full comment log, preserving order.
#[must_use]
pub fn parse_log(comments: &[Comment]) -> Vec<LogEvent> {
    comments.iter().map(parse_comment).collect()
}

fn classify(comment: &Comment) -> Option<Event> {
    let body = comment.body.as_str();
    let marker = first_nonblank(body)?;

    if marker == MARKER_CLAIMED {
        let worker = detail(body, "worker").map_or_else(|| comment.author.clone(), WorkerId::new);
        return Some(Event::Claimed { worker });
    }
    if marker == MARKER_RELEASED {
        let worker = detail(body, "worker").map_or_else(|| comment.author.clone(), WorkerId::new);
        return Some(Event::Released {
            worker,
            reason: detail(body, "reason"),
        });
    }
    if marker == MARKER_SCOPE {
        return Some(Event::Scope(parse_scope(body)));
    }
    if marker == MARKER_SNAPSHOT {
        return match checkpoint::decode(body) {
            Ok(snapshot) => Some(Event::Checkpoint(snapshot)),
            Err(err) => {
                debug!(seq = comment.seq, %err, "snapshot marker with undecodable body");
                None
            }
        };
    }
    if marker == MARKER_THREAD_CLOSED {
        let phase = detail(body, "phase").and_then(|raw| raw.parse::<Phase>().ok());
        let outcome = detail(body, "outcome").and_then(|raw| ThreadOutcome::parse(&raw));
        return Some(Event::ThreadClosed { phase, outcome });
    }
    if let Some(rest) = marker.strip_prefix(MARKER_THREAD) {
        return match rest.trim().parse::<Phase>() {
            Ok(phase) => Some(Event::ThreadOpened { phase }),
            Err(err) => {
                debug!(seq = comment.seq, %err, "thread marker with unknown phase");
                None
            }
        };
    }
    if let Some(rest) = marker.strip_prefix(MARKER_LOCK) {
        return nonempty(rest).map(|resource| Event::Lock { resource });
    }
    if let Some(rest) = marker.strip_prefix(MARKER_UNLOCK) {
        return nonempty(rest).map(|resource| Event::Unlock { resource });
    }
    if let Some(rest) = marker.strip_prefix(MARKER_BROADCAST) {
        let decision_id = nonempty(rest)?;
        let hub = detail(body, "hub").and_then(|raw| raw.parse::<ItemId>().ok());
        return Some(Event::Broadcast {
            decision_id,
            summary: broadcast_summary(body),
            hub,
        });
    }
    if let Some(rest) = marker.strip_prefix(MARKER_ACK) {
        return nonempty(rest).map(|decision_id| Event::Ack { decision_id });
    }

    None
}

/// First non-blank line of a body, trimmed of trailing whitespace.
pub(crate) fn first_nonblank(body: &str) -> Option<&str> {
    body.lines().map(str::trim_end).find(|line| !line.is_empty())
}

fn nonempty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Find a `key: value` detail line outside any `####` section.
pub(crate) fn detail(body: &str, key: &str) -> Option<String> {
    let prefix = format!("{key}: ");
    for line in body.lines() {
        if line.starts_with("####") {
            break;
        }
        if let Some(value) = line.strip_prefix(&prefix) {
            return nonempty(value);
        }
    }
    None
}

/// Split a body into `####` sections: `(name, content lines)` in order.
///
/// Lines before the first `####` header belong to no section. Section names
/// are trimmed; content lines keep their raw form for the caller to
/// interpret (bullets vs. free text).
pub(crate) fn sections(body: &str) -> Vec<(String, Vec<String>)> {
    let mut out: Vec<(String, Vec<String>)> = Vec::new();
    for line in body.lines() {
        if let Some(name) = line.strip_prefix("#### ") {
            out.push((name.trim().to_string(), Vec::new()));
        } else if let Some((_, content)) = out.last_mut() {
            content.push(line.to_string());
        }
    }
    out
}

/// Bullet items (`- x`) from section content lines.
pub(crate) fn bullets(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.trim_start().strip_prefix("- "))
        .map(|item| item.trim_end().to_string())
        .collect()
}

/// First non-blank, non-bullet content line (for single-value sections).
pub(crate) fn single_value(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("- ").unwrap_or(line).to_string())
}

fn parse_scope(body: &str) -> ScopeDeclaration {
    let mut declaration = ScopeDeclaration::default();
    for (name, lines) in sections(body) {
        match name.as_str() {
            "Claimed" => declaration.claimed.extend(bullets(&lines)),
            "Excluded" => declaration.excluded.extend(bullets(&lines)),
            other => debug!(section = other, "unknown scope declaration section"),
        }
    }
    declaration
}

/// Summary text of a broadcast body: everything after the marker line that
/// is not the `hub:` detail, with surrounding blank lines stripped.
fn broadcast_summary(body: &str) -> String {
    let lines: Vec<&str> = body
        .lines()
        .skip_while(|line| line.trim().is_empty())
        .skip(1) // the marker line
        .filter(|line| !line.starts_with("hub: "))
        .collect();
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn comment(body: &str) -> Comment {
        Comment {
            seq: 7,
            author: WorkerId::new("alice"),
            wall_ts: Utc::now(),
            body: body.to_string(),
        }
    }

    fn parse(body: &str) -> Event {
        parse_comment(&comment(body)).event
    }

    #[test]
    fn free_text_degrades_to_unstructured() {
        let event = parse("just chatting about the build");
        assert_eq!(
            event,
            Event::Unstructured {
                raw: "just chatting about the build".to_string()
            }
        );
    }

    #[test]
    fn claim_with_worker_detail() {
        let event = parse("## Claimed\n\nworker: bob");
        assert_eq!(
            event,
            Event::Claimed {
                worker: WorkerId::new("bob")
            }
        );
    }

    #[test]
    fn claim_without_detail_falls_back_to_author() {
        let event = parse("## Claimed");
        assert_eq!(
            event,
            Event::Claimed {
                worker: WorkerId::new("alice")
            }
        );
    }

    #[test]
    fn release_carries_optional_reason() {
        let event = parse("## Released\n\nworker: bob\nreason: race lost");
        assert_eq!(
            event,
            Event::Released {
                worker: WorkerId::new("bob"),
                reason: Some("race lost".to_string()),
            }
        );
    }

    #[test]
    fn scope_declaration_sections() {
        let body = "### Scope Declaration\n\n#### Claimed\n- src/a.rs\n- src/b.rs\n\n#### Excluded\n- src/c.rs\n";
        let Event::Scope(declaration) = parse(body) else {
            panic!("expected scope event");
        };
        assert_eq!(declaration.claimed.len(), 2);
        assert!(declaration.excluded.contains("src/c.rs"));
    }

    #[test]
    fn lock_and_unlock_markers() {
        assert_eq!(
            parse("## LOCK: db-config"),
            Event::Lock {
                resource: "db-config".to_string()
            }
        );
        assert_eq!(
            parse("## UNLOCK: db-config"),
            Event::Unlock {
                resource: "db-config".to_string()
            }
        );
    }

    #[test]
    fn lock_without_name_is_unstructured() {
        assert!(matches!(parse("## LOCK:"), Event::Unstructured { .. }));
        assert!(matches!(parse("## LOCK:   "), Event::Unstructured { .. }));
    }

    #[test]
    fn broadcast_with_hub_back_reference() {
        let body = "## BROADCAST: D-014\n\nhub: epic-1\n\nUse tokio for the retry layer.";
        let event = parse(body);
        assert_eq!(
            event,
            Event::Broadcast {
                decision_id: "D-014".to_string(),
                summary: "Use tokio for the retry layer.".to_string(),
                hub: Some(ItemId::new_unchecked("epic-1")),
            }
        );
    }

    #[test]
    fn hub_broadcast_has_no_back_reference() {
        let event = parse("## BROADCAST: D-2\n\nShip wave 2 behind a flag.");
        assert_eq!(
            event,
            Event::Broadcast {
                decision_id: "D-2".to_string(),
                summary: "Ship wave 2 behind a flag.".to_string(),
                hub: None,
            }
        );
    }

    #[test]
    fn ack_references_decision() {
        assert_eq!(
            parse("## ACK: D-014"),
            Event::Ack {
                decision_id: "D-014".to_string()
            }
        );
    }

    #[test]
    fn thread_markers() {
        assert_eq!(
            parse("## Thread: test"),
            Event::ThreadOpened { phase: Phase::Test }
        );
        assert_eq!(
            parse("## Thread Closed\n\nphase: test\noutcome: structural-issue"),
            Event::ThreadClosed {
                phase: Some(Phase::Test),
                outcome: Some(ThreadOutcome::StructuralIssue),
            }
        );
    }

    #[test]
    fn unknown_thread_phase_degrades() {
        assert!(matches!(
            parse("## Thread: shipping"),
            Event::Unstructured { .. }
        ));
    }

    #[test]
    fn snapshot_marker_with_undecodable_body_degrades() {
        // Two in-progress entries violate the single-resume-point rule.
        let body = "### State Snapshot\n\n#### In Progress\n- task a\n- task b\n";
        assert!(matches!(parse(body), Event::Unstructured { .. }));
    }

    #[test]
    fn parse_log_preserves_order_and_is_pure() {
        let comments = vec![
            comment("## Claimed"),
            comment("free text"),
            comment("## LOCK: ci"),
        ];
        let first = parse_log(&comments);
        let second = parse_log(&comments);
        assert_eq!(first, second);
        assert!(matches!(first[0].event, Event::Claimed { .. }));
        assert!(matches!(first[1].event, Event::Unstructured { .. }));
        assert!(matches!(first[2].event, Event::Lock { .. }));
    }

    #[test]
    fn leading_blank_lines_do_not_hide_the_marker() {
        assert!(matches!(
            parse("\n\n## Claimed\n\nworker: bob"),
            Event::Claimed { .. }
        ));
    }
}
