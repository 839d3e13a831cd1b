//! The Work Item Store abstraction.
//!
//! The store is the protocol's only IPC channel: a durable log of labels,
//! assignees, and ordered comments per item, normally backed by a tracker
//! API client. The engine never talks to a concrete tracker; everything
//! goes through [`WorkItemStore`], so the backend can be swapped (tracker,
//! database, flat files) without touching the protocol.
//!
//! Guarantees the engine assumes of any backend:
//!
//! - `append_comment` assigns a per-item, monotonically increasing `seq`;
//!   comments are never reordered or deleted.
//! - `set_assignee` is an idempotent overwrite (set, not add), serialized
//!   by the backend's own internal ordering.
//! - Reads are read-your-writes for the calling worker.

pub mod mem;

pub use mem::MemStore;

use std::time::Duration;

use crate::error::CoordError;
use crate::model::item::{Comment, ItemId, Label, WorkItem, WorkerId};

/// Errors surfaced by store backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The item does not exist (deleted, transferred, or never created).
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    /// The backend's quota is exhausted; retry after the hint.
    #[error("quota exhausted; reset in {reset_after:?}")]
    QuotaExhausted {
        /// Backend-provided reset hint.
        reset_after: Duration,
    },

    /// Opaque backend failure (network, auth, 5xx).
    #[error("backend: {0}")]
    Backend(String),
}

impl From<StoreError> for CoordError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ItemNotFound(id) => Self::ItemNotFound(id),
            StoreError::QuotaExhausted { reset_after } => Self::QuotaExhausted {
                reset_after: Some(reset_after),
            },
            StoreError::Backend(msg) => Self::Backend(msg),
        }
    }
}

/// Assignee constraint for listing queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssigneeFilter {
    /// Assigned to the given worker.
    Is(WorkerId),
    /// No assignee at all.
    Unassigned,
}

/// Label/assignee filter for [`WorkItemStore::list_items`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    /// Every listed item must carry all of these.
    pub all_of: Vec<Label>,
    /// No listed item may carry any of these.
    pub none_of: Vec<Label>,
    /// Optional assignee constraint.
    pub assignee: Option<AssigneeFilter>,
}

impl LabelFilter {
    /// Items carrying `label` (builder-style).
    #[must_use]
    pub fn with(mut self, label: Label) -> Self {
        self.all_of.push(label);
        self
    }

    /// Items not carrying `label` (builder-style).
    #[must_use]
    pub fn without(mut self, label: Label) -> Self {
        self.none_of.push(label);
        self
    }

    /// Items assigned to `worker` (builder-style).
    #[must_use]
    pub fn assigned_to(mut self, worker: WorkerId) -> Self {
        self.assignee = Some(AssigneeFilter::Is(worker));
        self
    }

    /// Unassigned items only (builder-style).
    #[must_use]
    pub fn unassigned(mut self) -> Self {
        self.assignee = Some(AssigneeFilter::Unassigned);
        self
    }

    /// Whether `item` satisfies this filter.
    #[must_use]
    pub fn matches(&self, item: &WorkItem) -> bool {
        if !self.all_of.iter().all(|label| item.has_label(label)) {
            return false;
        }
        if self.none_of.iter().any(|label| item.has_label(label)) {
            return false;
        }
        match &self.assignee {
            None => true,
            Some(AssigneeFilter::Unassigned) => item.assignee.is_none(),
            Some(AssigneeFilter::Is(worker)) => item.assignee.as_ref() == Some(worker),
        }
    }
}

/// Lightweight listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItemRef {
    /// The item's ID.
    pub id: ItemId,
    /// The item's title, for selection heuristics and logs.
    pub title: String,
}

/// Reference to an appended comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRef {
    /// The item the comment landed on.
    pub item: ItemId,
    /// The store-assigned log position.
    pub seq: u64,
}

/// The abstract Work Item Store.
///
/// Implementations take `&self`; backends are expected to serialize writes
/// internally (a tracker API does; [`MemStore`] uses a mutex).
pub trait WorkItemStore {
    /// List items matching the filter.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure or quota exhaustion.
    fn list_items(&self, filter: &LabelFilter) -> Result<Vec<WorkItemRef>, StoreError>;

    /// Fetch an item and its full ordered comment log.
    ///
    /// # Errors
    ///
    /// [`StoreError::ItemNotFound`] if the item vanished.
    fn get_item(&self, id: &ItemId) -> Result<(WorkItem, Vec<Comment>), StoreError>;

    /// Set the assignee (idempotent overwrite, not add).
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure.
    fn set_assignee(&self, id: &ItemId, worker: &WorkerId) -> Result<(), StoreError>;

    /// Clear the assignee.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure.
    fn clear_assignee(&self, id: &ItemId) -> Result<(), StoreError>;

    /// Add and remove labels in one call.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure.
    fn set_labels(&self, id: &ItemId, add: &[Label], remove: &[Label]) -> Result<(), StoreError>;

    /// Append a comment; the store assigns the log position.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure.
    fn append_comment(
        &self,
        id: &ItemId,
        author: &WorkerId,
        body: &str,
    ) -> Result<CommentRef, StoreError>;

    /// Replace the item's description body. Index maintenance only; callers
    /// must pair every edit with an explanatory appended comment.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure.
    fn edit_body(&self, id: &ItemId, new_body: &str) -> Result<(), StoreError>;
}
