use std::fmt;
use std::time::Duration;

use crate::model::item::{ItemId, WorkerId};
use crate::phase::Phase;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    RaceLost,
    PhaseViolation,
    ScopeConflict,
    LockHeld,
    DecisionUnsettled,
    QuotaExhausted,
    ItemNotFound,
    MalformedSnapshot,
    NotClaimHolder,
    StoreBackend,
    ConfigParseError,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::RaceLost => "E2101",
            Self::PhaseViolation => "E2102",
            Self::ScopeConflict => "E2103",
            Self::LockHeld => "E2104",
            Self::DecisionUnsettled => "E2105",
            Self::QuotaExhausted => "E2106",
            Self::ItemNotFound => "E2107",
            Self::MalformedSnapshot => "E2108",
            Self::NotClaimHolder => "E2109",
            Self::StoreBackend => "E5101",
            Self::ConfigParseError => "E1101",
        }
    }

    /// Short human-facing summary for logs and in-thread reports.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::RaceLost => "Claim race lost",
            Self::PhaseViolation => "Illegal phase transition or thread state",
            Self::ScopeConflict => "Scope overlap with another in-progress item",
            Self::LockHeld => "Advisory lock is held",
            Self::DecisionUnsettled => "Decision not yet acknowledged",
            Self::QuotaExhausted => "Tracker quota exhausted",
            Self::ItemNotFound => "Work item not found",
            Self::MalformedSnapshot => "Checkpoint snapshot failed to decode",
            Self::NotClaimHolder => "Caller does not hold the claim",
            Self::StoreBackend => "Work item store backend failure",
            Self::ConfigParseError => "Config file parse error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::RaceLost => Some("Release partial writes and claim a different item."),
            Self::PhaseViolation => {
                Some("Close the open thread first; Review failures demote to dev, never test.")
            }
            Self::ScopeConflict => {
                Some("Post fresh scope declarations on both items before touching shared paths.")
            }
            Self::LockHeld => Some("Wait for the matching UNLOCK comment, then retry."),
            Self::DecisionUnsettled => {
                Some("Post an ACK comment referencing the decision, or re-raise it on the hub.")
            }
            Self::QuotaExhausted => Some("Checkpoint progress, then wait for the quota reset."),
            Self::ItemNotFound => Some("Escalate to the epic thread; do not abandon silently."),
            Self::MalformedSnapshot => {
                Some("Recovery degraded to an earlier checkpoint; verify the resume point.")
            }
            Self::NotClaimHolder => Some("Only the assignee or a coordinator may release a claim."),
            Self::StoreBackend => Some("Retry once. If persistent, report the tracker outage."),
            Self::ConfigParseError => Some("Fix syntax in cairn.toml and retry."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Protocol-level errors surfaced by the coordination engine.
///
/// Propagation policy: `RaceLost` and `QuotaExhausted` are normally absorbed
/// inside the engine (session retry, quota gate) and only escape when retries
/// are exhausted. `PhaseViolation` and `ScopeConflict` are always surfaced —
/// they demand an explanatory comment, never an automatic fix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordError {
    /// Another worker's claim write landed first.
    #[error("claim race on {item} lost")]
    RaceLost {
        /// The contested item.
        item: ItemId,
        /// The worker whose write survived the verification read, when the
        /// re-read saw one.
        winner: Option<WorkerId>,
    },

    /// A transition not in the phase table, a second open thread, or a
    /// wave-gate violation.
    #[error("phase violation on {item}: {reason}")]
    PhaseViolation {
        /// The item whose thread state rejected the operation.
        item: ItemId,
        /// Human-readable explanation for the in-thread report.
        reason: String,
    },

    /// Claimed-path overlap with other in-progress items in the same wave.
    #[error("scope conflict on {item}: {overlaps} overlapping item(s)")]
    ScopeConflict {
        /// The item whose declaration collided.
        item: ItemId,
        /// Number of overlapping items (details carried by the caller).
        overlaps: usize,
    },

    /// The named advisory lock is currently held.
    #[error("lock '{resource}' is held")]
    LockHeld {
        /// The contested resource name.
        resource: String,
    },

    /// A decision this work depends on has no acknowledgement yet.
    #[error("decision '{decision_id}' unsettled on {item}")]
    DecisionUnsettled {
        /// The blocked item.
        item: ItemId,
        /// The decision reference awaiting an ACK.
        decision_id: String,
    },

    /// Tracker quota exhausted and retries ran out.
    #[error("quota exhausted; retries spent")]
    QuotaExhausted {
        /// Reset hint from the backend's last rejection, when it gave one.
        reset_after: Option<Duration>,
    },

    /// The tracked item vanished. Fatal to the task; escalate to the epic.
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    /// The releasing worker does not hold the claim.
    #[error("{caller} does not hold the claim on {item} (held by {holder:?})")]
    NotClaimHolder {
        /// The worker attempting the release.
        caller: WorkerId,
        /// The item in question.
        item: ItemId,
        /// Current assignee, if any.
        holder: Option<WorkerId>,
    },

    /// An operation illegal in the current phase.
    #[error("operation {operation} rejected in {phase} phase")]
    OperationRejected {
        /// The phase that rejected the operation.
        phase: Phase,
        /// Description of the rejected operation kind.
        operation: String,
    },

    /// A session operation that needs a claimed item ran without one.
    #[error("no active claim in this session")]
    NoActiveClaim,

    /// Opaque store backend failure.
    #[error("store backend: {0}")]
    Backend(String),
}

impl CoordError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::RaceLost { .. } => ErrorCode::RaceLost,
            Self::PhaseViolation { .. } | Self::OperationRejected { .. } => {
                ErrorCode::PhaseViolation
            }
            Self::ScopeConflict { .. } => ErrorCode::ScopeConflict,
            Self::LockHeld { .. } => ErrorCode::LockHeld,
            Self::DecisionUnsettled { .. } => ErrorCode::DecisionUnsettled,
            Self::QuotaExhausted { .. } => ErrorCode::QuotaExhausted,
            Self::ItemNotFound(_) => ErrorCode::ItemNotFound,
            Self::NotClaimHolder { .. } | Self::NoActiveClaim => ErrorCode::NotClaimHolder,
            Self::Backend(_) => ErrorCode::StoreBackend,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::RaceLost,
            ErrorCode::PhaseViolation,
            ErrorCode::ScopeConflict,
            ErrorCode::LockHeld,
            ErrorCode::DecisionUnsettled,
            ErrorCode::QuotaExhausted,
            ErrorCode::ItemNotFound,
            ErrorCode::MalformedSnapshot,
            ErrorCode::NotClaimHolder,
            ErrorCode::StoreBackend,
            ErrorCode::ConfigParseError,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::PhaseViolation.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn surfaced_violations_carry_hints() {
        assert!(ErrorCode::PhaseViolation.hint().is_some());
        assert!(ErrorCode::ScopeConflict.hint().is_some());
    }
}
