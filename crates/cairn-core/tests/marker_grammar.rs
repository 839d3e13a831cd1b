//! Property tests for the marker grammar and the checkpoint codec.

use chrono::Utc;
use proptest::prelude::*;

use cairn_core::checkpoint;
use cairn_core::event::{Event, parse_comment, writer};
use cairn_core::model::item::{Comment, ItemId, WorkerId};
use cairn_core::model::snapshot::StateSnapshot;
use cairn_core::phase::Phase;

fn comment(body: &str) -> Comment {
    Comment {
        seq: 1,
        author: WorkerId::new("alice"),
        wall_ts: Utc::now(),
        body: body.to_string(),
    }
}

/// Single-line tokens that survive the grammar's trimming untouched.
fn token() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-z0-9_/.-]{0,24}").expect("valid regex")
}

fn phase() -> impl Strategy<Value = Phase> {
    prop_oneof![Just(Phase::Dev), Just(Phase::Test), Just(Phase::Review)]
}

fn structured_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        token().prop_map(|w| Event::Claimed {
            worker: WorkerId::new(w),
        }),
        (token(), proptest::option::of(token())).prop_map(|(w, reason)| Event::Released {
            worker: WorkerId::new(w),
            reason,
        }),
        token().prop_map(|resource| Event::Lock { resource }),
        token().prop_map(|resource| Event::Unlock { resource }),
        token().prop_map(|decision_id| Event::Ack { decision_id }),
        phase().prop_map(|phase| Event::ThreadOpened { phase }),
        (token(), token(), proptest::option::of(token())).prop_map(|(id, summary, hub)| {
            Event::Broadcast {
                decision_id: id,
                summary,
                hub: hub.map(ItemId::new_unchecked),
            }
        }),
    ]
}

fn snapshot() -> impl Strategy<Value = StateSnapshot> {
    (
        proptest::collection::vec(token(), 0..4),
        proptest::option::of(token()),
        proptest::collection::vec(token(), 0..4),
        proptest::collection::vec(token(), 0..3),
        proptest::collection::vec(token(), 0..3),
        token(),
        token(),
    )
        .prop_map(
            |(completed, in_progress, pending, blockers, modified_files, next_action, branch)| {
                StateSnapshot {
                    completed,
                    in_progress,
                    pending,
                    blockers,
                    modified_files,
                    next_action,
                    branch,
                }
            },
        )
}

proptest! {
    /// The parser never fails: anything it cannot classify is an
    /// unstructured comment, not an error.
    #[test]
    fn parser_is_total_over_arbitrary_text(body in "\\PC{0,300}") {
        let parsed = parse_comment(&comment(&body));
        prop_assert_eq!(parsed.seq, 1);
    }

    /// Markers with garbage detail lines still classify without panicking.
    #[test]
    fn parser_is_total_over_marker_prefixed_garbage(
        marker in prop_oneof![
            Just("## Claimed"), Just("## Released"), Just("### Scope Declaration"),
            Just("### State Snapshot"), Just("## LOCK:"), Just("## BROADCAST:"),
            Just("## Thread:"),
        ],
        garbage in "\\PC{0,200}",
    ) {
        let body = format!("{marker} {garbage}\n{garbage}");
        let _ = parse_comment(&comment(&body));
    }

    /// Every structured event renders to a body that parses back to itself.
    #[test]
    fn render_then_parse_is_identity(event in structured_event()) {
        let body = writer::render(&event).expect("structured events render");
        let parsed = parse_comment(&comment(&body));
        prop_assert_eq!(parsed.event, event);
    }

    /// Checkpoint bodies are lossless for well-formed snapshots.
    #[test]
    fn checkpoint_round_trip(snapshot in snapshot()) {
        let decoded = checkpoint::decode(&checkpoint::encode(&snapshot)).expect("decode");
        prop_assert_eq!(decoded, snapshot);
    }

    /// A checkpoint body is also a parseable log event.
    #[test]
    fn checkpoint_parses_as_a_checkpoint_event(snapshot in snapshot()) {
        let body = checkpoint::encode(&snapshot);
        let parsed = parse_comment(&comment(&body));
        prop_assert_eq!(parsed.event, Event::Checkpoint(snapshot));
    }

    /// The lock fold agrees with a straight count of matching markers.
    #[test]
    fn lock_balance_matches_marker_counts(ops in proptest::collection::vec(any::<bool>(), 0..20)) {
        let events: Vec<_> = ops
            .iter()
            .enumerate()
            .map(|(i, &is_lock)| {
                let event = if is_lock {
                    Event::Lock { resource: "db".to_string() }
                } else {
                    Event::Unlock { resource: "db".to_string() }
                };
                cairn_core::event::LogEvent {
                    seq: i as u64 + 1,
                    author: WorkerId::new("alice"),
                    event,
                }
            })
            .collect();
        let locks = ops.iter().filter(|&&b| b).count() as i64;
        let unlocks = ops.len() as i64 - locks;
        prop_assert_eq!(
            cairn_core::lock::is_locked(&events, "db"),
            locks > unlocks
        );
    }
}
