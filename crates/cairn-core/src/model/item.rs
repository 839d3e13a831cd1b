use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

use crate::phase::Phase;

/// Stable identifier for a work item, issued by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Construct without validation. Intended for tests and store backends
    /// that already guarantee well-formed IDs.
    #[must_use]
    pub fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw ID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Error for an empty or whitespace-containing item ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidItemId(pub String);

impl fmt::Display for InvalidItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid item ID '{}'", self.0)
    }
}

impl std::error::Error for InvalidItemId {}

impl FromStr for ItemId {
    type Err = InvalidItemId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(InvalidItemId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a worker agent (the tracker-side account name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Construct from any string-like value.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw worker name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The protocol label vocabulary.
///
/// Labels are the only mutable state the tracker holds besides the assignee;
/// everything else lives in the append-only comment log. Unknown labels pass
/// through as [`Label::Other`] so the engine never destroys tracker state it
/// does not understand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Label {
    /// Unclaimed and available for pickup.
    Ready,
    /// Claimed; work underway.
    InProgress,
    /// Blocked on a human or hub decision.
    NeedsInput,
    /// Blocked on another item or an unsettled decision.
    Blocked,
    /// Terminal: all phases passed.
    Completed,
    /// Active phase gate (`phase:dev` / `phase:test` / `phase:review`).
    Phase(Phase),
    /// Wave membership (`wave:<n>`).
    Wave(u32),
    /// Epic membership (`epic:<id>`).
    Epic(ItemId),
    /// Any label outside the protocol vocabulary, preserved verbatim.
    Other(String),
}

impl Label {
    /// Canonical tracker-side string for this label.
    #[must_use]
    pub fn as_str(&self) -> String {
        match self {
            Self::Ready => "ready".to_string(),
            Self::InProgress => "in-progress".to_string(),
            Self::NeedsInput => "needs-input".to_string(),
            Self::Blocked => "blocked".to_string(),
            Self::Completed => "completed".to_string(),
            Self::Phase(phase) => format!("phase:{phase}"),
            Self::Wave(n) => format!("wave:{n}"),
            Self::Epic(id) => format!("epic:{id}"),
            Self::Other(raw) => raw.clone(),
        }
    }

    /// Parse a tracker label. Total: unknown labels become [`Label::Other`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ready" => return Self::Ready,
            "in-progress" => return Self::InProgress,
            "needs-input" => return Self::NeedsInput,
            "blocked" => return Self::Blocked,
            "completed" => return Self::Completed,
            _ => {}
        }
        if let Some(rest) = raw.strip_prefix("phase:")
            && let Ok(phase) = rest.parse::<Phase>()
        {
            return Self::Phase(phase);
        }
        if let Some(rest) = raw.strip_prefix("wave:")
            && let Ok(n) = rest.parse::<u32>()
        {
            return Self::Wave(n);
        }
        if let Some(rest) = raw.strip_prefix("epic:")
            && let Ok(id) = rest.parse::<ItemId>()
        {
            return Self::Epic(id);
        }
        Self::Other(raw.to_string())
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.as_str()
    }
}

impl TryFrom<String> for Label {
    type Error = std::convert::Infallible;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Ok(Self::parse(&raw))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A work item as seen through the store.
///
/// The assignee set has at most one member (exclusivity invariant). The
/// comment log is fetched alongside via the store, not embedded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Tracker-issued identifier.
    pub id: ItemId,
    /// Human-facing title.
    pub title: String,
    /// Description body. Editable only for index maintenance, and every
    /// such edit must be paired with an explanatory appended comment.
    pub body: String,
    /// Current assignee, if claimed.
    pub assignee: Option<WorkerId>,
    /// Tracker labels, protocol and otherwise.
    pub labels: BTreeSet<Label>,
    /// Whether the tracker item is closed (terminal).
    pub closed: bool,
}

impl WorkItem {
    /// Whether this item carries the given label.
    #[must_use]
    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    /// The item's wave number, if labeled.
    #[must_use]
    pub fn wave(&self) -> Option<u32> {
        self.labels.iter().find_map(|label| match label {
            Label::Wave(n) => Some(*n),
            _ => None,
        })
    }

    /// The item's epic, if labeled.
    #[must_use]
    pub fn epic(&self) -> Option<&ItemId> {
        self.labels.iter().find_map(|label| match label {
            Label::Epic(id) => Some(id),
            _ => None,
        })
    }

    /// Terminal means closed or carrying the `completed` label.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.closed || self.has_label(&Label::Completed)
    }
}

/// An immutable comment in a work item's log.
///
/// `seq` is the store-assigned log position and the only ordering the
/// protocol trusts. `wall_ts` exists for human display and is never used as
/// a tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Log position within the item, monotonically increasing.
    pub seq: u64,
    /// Tracker account that posted the comment.
    pub author: WorkerId,
    /// Wall-clock timestamp, display only.
    pub wall_ts: DateTime<Utc>,
    /// Raw markdown body.
    pub body: String,
}
