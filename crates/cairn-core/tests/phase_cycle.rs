//! The dev/test/review cycle as driven through an item's comment log.

use std::collections::BTreeSet;

use cairn_core::error::CoordError;
use cairn_core::event::{Event, ThreadOutcome, parse_log, writer};
use cairn_core::model::item::{ItemId, Label, WorkItem, WorkerId};
use cairn_core::phase::{
    OperationKind, Phase, PhaseEvent, PhaseState, ThreadLedger, check_operation, transition,
};
use cairn_core::store::{MemStore, WorkItemStore};

fn seed(store: &MemStore, id: &str) -> ItemId {
    let id = ItemId::new_unchecked(id);
    store.insert_item(WorkItem {
        id: id.clone(),
        title: "phased task".to_string(),
        body: String::new(),
        assignee: Some(WorkerId::new("alice")),
        labels: [Label::InProgress].into_iter().collect::<BTreeSet<_>>(),
        closed: false,
    });
    id
}

fn append(store: &MemStore, id: &ItemId, worker: &WorkerId, event: &Event) {
    let body = writer::render(event).expect("structured event renders");
    store.append_comment(id, worker, &body).expect("append");
}

#[test]
fn clean_pass_walks_dev_test_review_complete() {
    let id = ItemId::new_unchecked("item-301");
    let mut state = PhaseState::Dev;

    state = transition(&id, state, &PhaseEvent::DevComplete { criteria_unchecked: 0 })
        .expect("dev done");
    assert_eq!(state, PhaseState::Test);
    state = transition(&id, state, &PhaseEvent::AllTestsPass).expect("tests pass");
    assert_eq!(state, PhaseState::Review);
    state = transition(&id, state, &PhaseEvent::ReviewPass { unanimous: true })
        .expect("review pass");
    assert_eq!(state, PhaseState::Complete);
}

#[test]
fn review_failure_demotes_to_dev_never_test() {
    let id = ItemId::new_unchecked("item-302");
    let state = transition(&id, PhaseState::Review, &PhaseEvent::ReviewFail {
        reason: "missing coverage for the retry path".to_string(),
    })
    .expect("demotion is a legal transition");
    // Authoring the missing tests is development work.
    assert_eq!(state, PhaseState::Dev);
}

#[test]
fn structural_issue_in_test_demotes_to_dev() {
    let id = ItemId::new_unchecked("item-303");
    let state = transition(&id, PhaseState::Test, &PhaseEvent::StructuralIssueFound {
        reason: "two modules share a hidden global".to_string(),
    })
    .expect("demotion");
    assert_eq!(state, PhaseState::Dev);
}

#[test]
fn unchecked_criteria_block_dev_exit() {
    let id = ItemId::new_unchecked("item-304");
    let err = transition(&id, PhaseState::Dev, &PhaseEvent::DevComplete {
        criteria_unchecked: 2,
    })
    .expect_err("guard holds");
    assert!(matches!(err, CoordError::PhaseViolation { .. }));
}

#[test]
fn split_verdict_does_not_complete_review() {
    let id = ItemId::new_unchecked("item-305");
    let err = transition(&id, PhaseState::Review, &PhaseEvent::ReviewPass { unanimous: false })
        .expect_err("guard holds");
    assert!(matches!(err, CoordError::PhaseViolation { .. }));
}

#[test]
fn out_of_table_transitions_fail_closed() {
    let id = ItemId::new_unchecked("item-306");
    assert!(transition(&id, PhaseState::Dev, &PhaseEvent::AllTestsPass).is_err());
    assert!(transition(&id, PhaseState::Complete, &PhaseEvent::AllTestsPass).is_err());
    assert!(
        transition(&id, PhaseState::Test, &PhaseEvent::ReviewPass { unanimous: true }).is_err()
    );
}

#[test]
fn phase_scope_guards() {
    assert!(check_operation(Phase::Dev, OperationKind::ModifyCode).is_ok());
    assert!(check_operation(Phase::Dev, OperationKind::AuthorTest).is_ok());
    // The test phase runs what exists; new tests and structural fixes go
    // back through dev.
    assert!(check_operation(Phase::Test, OperationKind::ModifyCode).is_ok());
    assert!(check_operation(Phase::Test, OperationKind::AuthorTest).is_err());
    assert!(check_operation(Phase::Test, OperationKind::StructuralChange).is_err());
    // Review only speaks in verdicts.
    assert!(check_operation(Phase::Review, OperationKind::Verdict).is_ok());
    assert!(check_operation(Phase::Review, OperationKind::ModifyCode).is_err());
}

#[test]
fn ledger_replays_one_open_thread_from_the_log() {
    let store = MemStore::new();
    let id = seed(&store, "item-307");
    let alice = WorkerId::new("alice");

    append(&store, &id, &alice, &Event::ThreadOpened { phase: Phase::Dev });
    append(&store, &id, &alice, &Event::ThreadClosed {
        phase: Some(Phase::Dev),
        outcome: Some(ThreadOutcome::Pass),
    });
    append(&store, &id, &alice, &Event::ThreadOpened { phase: Phase::Test });

    let (_, comments) = store.get_item(&id).expect("get");
    let events = parse_log(&comments);
    let ledger = ThreadLedger::from_events(&events);

    assert_eq!(ledger.open, Some(Phase::Test));
    assert_eq!(ledger.closed, vec![(Phase::Dev, Some(ThreadOutcome::Pass))]);
    assert!(ThreadLedger::open_violations(&events).is_empty());

    let err = ledger.check_can_open(&id, Phase::Review).expect_err("one thread at a time");
    assert!(matches!(err, CoordError::PhaseViolation { .. }));
}

#[test]
fn double_open_is_reported_at_its_log_position() {
    let store = MemStore::new();
    let id = seed(&store, "item-308");
    let alice = WorkerId::new("alice");

    append(&store, &id, &alice, &Event::ThreadOpened { phase: Phase::Dev });
    append(&store, &id, &alice, &Event::ThreadOpened { phase: Phase::Test });

    let (_, comments) = store.get_item(&id).expect("get");
    let events = parse_log(&comments);
    assert_eq!(ThreadLedger::open_violations(&events), vec![2]);
}
