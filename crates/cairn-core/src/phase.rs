//! The DEV → TEST → REVIEW phase gate.
//!
//! Each feature cycles through three phase threads with a hard invariant:
//! at most one thread is open at any time, and the next thread may not open
//! until the current one is closed. Demotions always land in `Dev` — a
//! coverage gap found in review is development work, so `Review → Test`
//! never occurs.
//!
//! The machine fails closed: any transition not in the table, any second
//! open thread, and any wave-gate violation is a `PhaseViolation`.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::CoordError;
use crate::event::{Event, LogEvent, ThreadOutcome};
use crate::model::item::ItemId;

/// The three phase-thread types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Dev,
    Test,
    Review,
}

impl Phase {
    /// Canonical label/marker spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Review => "review",
        }
    }

    /// All phases in cycle order.
    pub const ALL: [Self; 3] = [Self::Dev, Self::Test, Self::Review];
}

/// Error returned when parsing an unknown phase string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPhase(pub String);

impl fmt::Display for UnknownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown phase '{}': expected dev, test, or review", self.0)
    }
}

impl std::error::Error for UnknownPhase {}

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "review" => Ok(Self::Review),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The full lifecycle state: an active phase or terminal completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseState {
    Dev,
    Test,
    Review,
    Complete,
}

impl PhaseState {
    /// The active phase, if not terminal.
    #[must_use]
    pub const fn phase(self) -> Option<Phase> {
        match self {
            Self::Dev => Some(Phase::Dev),
            Self::Test => Some(Phase::Test),
            Self::Review => Some(Phase::Review),
            Self::Complete => None,
        }
    }
}

impl From<Phase> for PhaseState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Dev => Self::Dev,
            Phase::Test => Self::Test,
            Phase::Review => Self::Review,
        }
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Review => "review",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// Events that drive the phase machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Dev work finished. Guard: every acceptance criterion is checked.
    DevComplete {
        /// Count of unchecked acceptance criteria; must be zero.
        criteria_unchecked: usize,
    },
    /// The test phase passed with no structural findings.
    AllTestsPass,
    /// A structural issue surfaced in test; demote to dev.
    StructuralIssueFound {
        /// What was found, for the in-thread report.
        reason: String,
    },
    /// The review verdict. Guard on pass: the verdict is unanimous.
    ReviewPass {
        /// Whether every reviewer voted positive.
        unanimous: bool,
    },
    /// The review failed; demote to dev, never test.
    ReviewFail {
        /// What failed, for the in-thread report.
        reason: String,
    },
}

/// Work attempted inside a phase, classified for per-state scope guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Editing production code.
    ModifyCode,
    /// Writing a new test.
    AuthorTest,
    /// Structural change (interfaces, module layout, build wiring).
    StructuralChange,
    /// Posting a review verdict or coverage estimate.
    Verdict,
}

impl OperationKind {
    const fn describe(self) -> &'static str {
        match self {
            Self::ModifyCode => "code modification",
            Self::AuthorTest => "new test authored",
            Self::StructuralChange => "structural change",
            Self::Verdict => "verdict",
        }
    }
}

/// Apply one phase event to a state. Pure; the transition table from the
/// protocol, nothing else.
///
/// # Errors
///
/// `PhaseViolation` for any pair not in the table or any failed guard.
pub fn transition(
    item: &ItemId,
    state: PhaseState,
    event: &PhaseEvent,
) -> Result<PhaseState, CoordError> {
    match (state, event) {
        (PhaseState::Dev, PhaseEvent::DevComplete { criteria_unchecked: 0 }) => {
            Ok(PhaseState::Test)
        }
        (PhaseState::Dev, PhaseEvent::DevComplete { criteria_unchecked }) => {
            Err(CoordError::PhaseViolation {
                item: item.clone(),
                reason: format!("{criteria_unchecked} acceptance criteria still unchecked"),
            })
        }
        (PhaseState::Test, PhaseEvent::AllTestsPass) => Ok(PhaseState::Review),
        (PhaseState::Test, PhaseEvent::StructuralIssueFound { .. }) => Ok(PhaseState::Dev),
        (PhaseState::Review, PhaseEvent::ReviewPass { unanimous: true }) => {
            Ok(PhaseState::Complete)
        }
        (PhaseState::Review, PhaseEvent::ReviewPass { unanimous: false }) => {
            Err(CoordError::PhaseViolation {
                item: item.clone(),
                reason: "review pass requires a unanimous positive verdict".to_string(),
            })
        }
        // Demotion always lands in Dev. Review -> Test does not exist:
        // authoring the missing tests is development work.
        (PhaseState::Review, PhaseEvent::ReviewFail { .. }) => Ok(PhaseState::Dev),
        (from, event) => Err(CoordError::PhaseViolation {
            item: item.clone(),
            reason: format!("no transition from {from} for {event:?}"),
        }),
    }
}

/// Check an operation against the current phase's scope restrictions.
///
/// `Test` may not author tests or make structural changes in place — those
/// must be recorded as a `StructuralIssueFound` demotion. `Review` may only
/// post verdicts and coverage estimates.
///
/// # Errors
///
/// `OperationRejected` when the operation is illegal in the phase.
pub fn check_operation(phase: Phase, operation: OperationKind) -> Result<(), CoordError> {
    let legal = match phase {
        Phase::Dev => true,
        Phase::Test => !matches!(
            operation,
            OperationKind::AuthorTest | OperationKind::StructuralChange
        ),
        Phase::Review => matches!(operation, OperationKind::Verdict),
    };
    if legal {
        Ok(())
    } else {
        Err(CoordError::OperationRejected {
            phase,
            operation: operation.describe().to_string(),
        })
    }
}

/// Thread bookkeeping derived from an item's event log.
///
/// Replayed from scratch on every use; the engine holds no memory between
/// sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadLedger {
    /// The currently open thread's phase, if any.
    pub open: Option<Phase>,
    /// Every close recorded so far, in log order.
    pub closed: Vec<(Phase, Option<ThreadOutcome>)>,
}

impl ThreadLedger {
    /// Fold the thread open/close events out of a parsed log.
    ///
    /// Tolerant of malformed histories (a close with no open, a close
    /// without a recorded phase): the ledger reflects what the log says,
    /// and [`ThreadLedger::open_violations`] reports anomalies.
    #[must_use]
    pub fn from_events(events: &[LogEvent]) -> Self {
        let mut ledger = Self::default();
        for entry in events {
            match &entry.event {
                Event::ThreadOpened { phase } => {
                    ledger.open = Some(*phase);
                }
                Event::ThreadClosed { phase, outcome } => {
                    let closed_phase = phase.or(ledger.open);
                    if let Some(p) = closed_phase {
                        ledger.closed.push((p, *outcome));
                    }
                    ledger.open = None;
                }
                _ => {}
            }
        }
        ledger
    }

    /// Log positions at which a second thread was opened over an open one.
    ///
    /// A well-formed log returns an empty vec; anything else is a
    /// protocol-violation artifact worth surfacing to the oracle.
    #[must_use]
    pub fn open_violations(events: &[LogEvent]) -> Vec<u64> {
        let mut open = false;
        let mut violations = Vec::new();
        for entry in events {
            match &entry.event {
                Event::ThreadOpened { .. } => {
                    if open {
                        violations.push(entry.seq);
                    }
                    open = true;
                }
                Event::ThreadClosed { .. } => open = false,
                _ => {}
            }
        }
        violations
    }

    /// Precondition for opening a thread in `phase`.
    ///
    /// # Errors
    ///
    /// `PhaseViolation` if another thread is already open.
    pub fn check_can_open(&self, item: &ItemId, phase: Phase) -> Result<(), CoordError> {
        match self.open {
            None => Ok(()),
            Some(open_phase) => Err(CoordError::PhaseViolation {
                item: item.clone(),
                reason: format!(
                    "cannot open {phase} thread: {open_phase} thread is still open"
                ),
            }),
        }
    }
}
