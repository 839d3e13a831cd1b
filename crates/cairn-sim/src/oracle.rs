//! Invariant oracle for coordination runs.
//!
//! Every check is a pure function of the final store contents — the same
//! replay-from-the-log discipline the protocol itself uses. Six invariants:
//!
//! 1. **Claim exclusivity**: no item's log ever shows two unreleased claims.
//! 2. **Thread discipline**: at most one open thread per item at any log
//!    position.
//! 3. **Demotion direction**: a failed review reopens in `Dev`, never
//!    `Test`.
//! 4. **Lock balance**: no resource's lock balance goes negative or above
//!    one. (A lock still held when the run ends is legal — locks are
//!    permanent until released — so the final balance is diagnostic only.)
//! 5. **Recovery idempotence**: recovering twice from an unchanged log
//!    yields identical plans.
//! 6. **Terminal consistency**: a completed item has no assignee, no
//!    in-progress label, and a release on the record.

use std::collections::BTreeMap;

use cairn_core::error::CoordError;
use cairn_core::event::{Event, LogEvent, ThreadOutcome, parse_log};
use cairn_core::model::item::{ItemId, Label, WorkItem, WorkerId};
use cairn_core::phase::Phase;
use cairn_core::recovery::{self, NullProbe};
use cairn_core::store::{LabelFilter, WorkItemStore};

/// Oracle result for an invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    /// Every invariant violation found.
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

/// Diagnostic for a single failed invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// An item's log shows more than one unreleased claim at some point.
    ///
    /// This is exactly the double-verify hole in the optimistic claim
    /// protocol: both claimers passed their verification read. The protocol
    /// assumes the backend's serialization makes this unreachable; the
    /// oracle counts how often the assumption would have been load-bearing.
    DoubleClaim {
        /// The contested item.
        item: ItemId,
        /// Workers holding simultaneous claims.
        claimants: Vec<WorkerId>,
        /// Log position at which the second claim appeared.
        seq: u64,
    },

    /// A thread was opened over an already-open thread.
    ThreadOverlap {
        /// The item with overlapping threads.
        item: ItemId,
        /// Log positions of the offending opens.
        seqs: Vec<u64>,
    },

    /// A failed review was followed by a thread in the wrong phase.
    WrongDemotion {
        /// The demoted item.
        item: ItemId,
        /// Log position of the offending reopen.
        seq: u64,
        /// The phase actually opened (should be `Dev`).
        reopened: Phase,
    },

    /// A lock balance went negative or above one at some log position.
    LockImbalance {
        /// The item carrying the lock log (the hub).
        item: ItemId,
        /// The resource out of balance.
        resource: String,
        /// Lowest balance seen at any prefix.
        min_balance: i64,
        /// Highest balance seen at any prefix.
        max_balance: i64,
    },

    /// Recovering twice from the same log produced different plans.
    RecoveryDivergence {
        /// The item whose recovery is unstable.
        item: ItemId,
    },

    /// A completed item still looks claimed.
    TerminalState {
        /// The inconsistent item.
        item: ItemId,
        /// What exactly is inconsistent.
        reason: String,
    },
}

/// Run every invariant check against the store's final state.
///
/// # Errors
///
/// Store failures while fetching items.
pub fn check_all<S: WorkItemStore>(store: &S) -> Result<OracleResult, CoordError> {
    let refs = store.list_items(&LabelFilter::default())?;
    let mut result = OracleResult::pass();
    for entry in refs {
        let (item, comments) = store.get_item(&entry.id)?;
        let events = parse_log(&comments);
        result = result
            .merge(check_claim_exclusivity(&item.id, &events))
            .merge(check_thread_discipline(&item.id, &events))
            .merge(check_demotion_direction(&item.id, &events))
            .merge(check_lock_balance(&item.id, &events))
            .merge(check_recovery_idempotence(&item.id, &comments))
            .merge(check_terminal_consistency(&item, &events));
    }
    Ok(result)
}

/// At every log position, at most one worker holds an unreleased claim.
#[must_use]
pub fn check_claim_exclusivity(item: &ItemId, events: &[LogEvent]) -> OracleResult {
    let mut holding: Vec<WorkerId> = Vec::new();
    let mut violations = Vec::new();
    for entry in events {
        match &entry.event {
            Event::Claimed { worker } => {
                if !holding.contains(worker) {
                    holding.push(worker.clone());
                }
                if holding.len() > 1 {
                    violations.push(InvariantViolation::DoubleClaim {
                        item: item.clone(),
                        claimants: holding.clone(),
                        seq: entry.seq,
                    });
                }
            }
            Event::Released { worker, .. } => {
                holding.retain(|held| held != worker);
            }
            _ => {}
        }
    }
    OracleResult::from_violations(violations)
}

/// At most one open thread per item at any log position.
#[must_use]
pub fn check_thread_discipline(item: &ItemId, events: &[LogEvent]) -> OracleResult {
    let seqs = cairn_core::phase::ThreadLedger::open_violations(events);
    if seqs.is_empty() {
        OracleResult::pass()
    } else {
        OracleResult::from_violations(vec![InvariantViolation::ThreadOverlap {
            item: item.clone(),
            seqs,
        }])
    }
}

/// Every demotion lands in `Dev`.
///
/// A thread closed with `Fail` or `StructuralIssue` demotes the item; the
/// next thread opened on it must be a dev thread. `Review` never demotes
/// to `Test`.
#[must_use]
pub fn check_demotion_direction(item: &ItemId, events: &[LogEvent]) -> OracleResult {
    let mut demoted = false;
    let mut violations = Vec::new();
    for entry in events {
        match &entry.event {
            Event::ThreadClosed {
                outcome: Some(ThreadOutcome::Fail | ThreadOutcome::StructuralIssue),
                ..
            } => demoted = true,
            Event::ThreadOpened { phase } => {
                if demoted && *phase != Phase::Dev {
                    violations.push(InvariantViolation::WrongDemotion {
                        item: item.clone(),
                        seq: entry.seq,
                        reopened: *phase,
                    });
                }
                demoted = false;
            }
            _ => {}
        }
    }
    OracleResult::from_violations(violations)
}

/// Lock balances stay within `0..=1` at every log position.
#[must_use]
pub fn check_lock_balance(item: &ItemId, events: &[LogEvent]) -> OracleResult {
    let mut balances: BTreeMap<&str, (i64, i64, i64)> = BTreeMap::new();
    for entry in events {
        match &entry.event {
            Event::Lock { resource } => {
                let (balance, _, max) = balances.entry(resource).or_insert((0, 0, 0));
                *balance += 1;
                *max = (*max).max(*balance);
            }
            Event::Unlock { resource } => {
                let (balance, min, _) = balances.entry(resource).or_insert((0, 0, 0));
                *balance -= 1;
                *min = (*min).min(*balance);
            }
            _ => {}
        }
    }
    let violations = balances
        .into_iter()
        .filter(|&(_, (_, min, max))| min < 0 || max > 1)
        .map(|(resource, (_, min_balance, max_balance))| InvariantViolation::LockImbalance {
            item: item.clone(),
            resource: resource.to_string(),
            min_balance,
            max_balance,
        })
        .collect();
    OracleResult::from_violations(violations)
}

/// `recover` is a pure function of the log.
#[must_use]
pub fn check_recovery_idempotence(
    item: &ItemId,
    comments: &[cairn_core::model::item::Comment],
) -> OracleResult {
    let first = recovery::recover(comments, &NullProbe);
    let second = recovery::recover(comments, &NullProbe);
    if first == second {
        OracleResult::pass()
    } else {
        OracleResult::from_violations(vec![InvariantViolation::RecoveryDivergence {
            item: item.clone(),
        }])
    }
}

/// Completed items are fully released.
#[must_use]
pub fn check_terminal_consistency(item: &WorkItem, events: &[LogEvent]) -> OracleResult {
    if !item.has_label(&Label::Completed) {
        return OracleResult::pass();
    }
    let mut violations = Vec::new();
    if item.assignee.is_some() {
        violations.push(InvariantViolation::TerminalState {
            item: item.id.clone(),
            reason: "completed item still has an assignee".to_string(),
        });
    }
    if item.has_label(&Label::InProgress) {
        violations.push(InvariantViolation::TerminalState {
            item: item.id.clone(),
            reason: "completed item still labeled in-progress".to_string(),
        });
    }
    if !events
        .iter()
        .any(|entry| matches!(entry.event, Event::Released { .. }))
    {
        violations.push(InvariantViolation::TerminalState {
            item: item.id.clone(),
            reason: "completed item has no release on the record".to_string(),
        });
    }
    OracleResult::from_violations(violations)
}

/// One-line rendering for campaign reports.
#[must_use]
pub fn format_violation(violation: &InvariantViolation) -> String {
    match violation {
        InvariantViolation::DoubleClaim { item, claimants, seq } => {
            format!("double claim on {item} at seq {seq}: {claimants:?}")
        }
        InvariantViolation::ThreadOverlap { item, seqs } => {
            format!("overlapping threads on {item} at {seqs:?}")
        }
        InvariantViolation::WrongDemotion { item, seq, reopened } => {
            format!("demotion on {item} reopened in {reopened} at seq {seq}, expected dev")
        }
        InvariantViolation::LockImbalance {
            item,
            resource,
            min_balance,
            max_balance,
        } => format!(
            "lock '{resource}' on {item} out of balance (min {min_balance}, max {max_balance})"
        ),
        InvariantViolation::RecoveryDivergence { item } => {
            format!("recovery diverged on {item}")
        }
        InvariantViolation::TerminalState { item, reason } => {
            format!("terminal inconsistency on {item}: {reason}")
        }
    }
}
