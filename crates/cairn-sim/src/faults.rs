//! Scripted faults layered over the in-memory store.
//!
//! Three fault families, each driven by the seeded RNG so a failing run is
//! replayable from its seed alone:
//!
//! - **Quota windows**: the backing store rejects the next call(s) with a
//!   reset hint (injected per round by the simulator).
//! - **Rival claims**: immediately after a worker's assignee write, a
//!   phantom rival's write lands on top, exactly the interleaving the
//!   claim protocol's verification read exists to catch.
//! - **Malformed checkpoints**: a checkpoint body is replaced with one
//!   that carries the snapshot marker but violates the single-resume-point
//!   rule, forcing recovery to walk back to an older checkpoint.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use cairn_core::event::MARKER_SNAPSHOT;
use cairn_core::model::item::{Comment, ItemId, Label, WorkItem, WorkerId};
use cairn_core::store::{CommentRef, LabelFilter, MemStore, StoreError, WorkItemRef, WorkItemStore};

use crate::rng::DeterministicRng;

/// Fault probabilities per store call (integer percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Chance per round that the next store call hits a quota window.
    pub quota_fault_percent: u8,
    /// Reset hint carried by injected quota faults, in seconds.
    pub quota_reset_secs: u64,
    /// Chance that a rival's write lands right after an assignee write.
    pub rival_claim_percent: u8,
    /// Chance that a checkpoint body is corrupted in flight.
    pub malformed_snapshot_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            quota_fault_percent: 10,
            quota_reset_secs: 30,
            rival_claim_percent: 10,
            malformed_snapshot_percent: 10,
        }
    }
}

impl FaultConfig {
    /// A configuration that injects nothing.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            quota_fault_percent: 0,
            quota_reset_secs: 0,
            rival_claim_percent: 0,
            malformed_snapshot_percent: 0,
        }
    }
}

/// Counts of injected faults, for the run report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultStats {
    /// Rival assignee writes injected.
    pub rival_claims: u64,
    /// Checkpoint bodies corrupted.
    pub malformed_snapshots: u64,
}

/// Store wrapper that injects rival writes and checkpoint corruption.
///
/// Single-threaded by design; interior mutability holds the RNG because the
/// store trait takes `&self`.
pub struct FaultStore {
    inner: MemStore,
    config: FaultConfig,
    rng: RefCell<DeterministicRng>,
    stats: RefCell<FaultStats>,
}

impl FaultStore {
    #[must_use]
    pub fn new(inner: MemStore, config: FaultConfig, rng: DeterministicRng) -> Self {
        Self {
            inner,
            config,
            rng: RefCell::new(rng),
            stats: RefCell::new(FaultStats::default()),
        }
    }

    /// Injection counts so far.
    #[must_use]
    pub fn stats(&self) -> FaultStats {
        *self.stats.borrow()
    }

    fn hit(&self, percent: u8) -> bool {
        self.rng.borrow_mut().chance(percent)
    }
}

/// A marker-bearing body that the checkpoint decoder must reject: two
/// resume points.
fn corrupted_snapshot_body() -> String {
    format!("{MARKER_SNAPSHOT}\n\n#### In Progress\n- phantom step one\n- phantom step two\n")
}

impl WorkItemStore for FaultStore {
    fn list_items(&self, filter: &LabelFilter) -> Result<Vec<WorkItemRef>, StoreError> {
        self.inner.list_items(filter)
    }

    fn get_item(&self, id: &ItemId) -> Result<(WorkItem, Vec<Comment>), StoreError> {
        self.inner.get_item(id)
    }

    fn set_assignee(&self, id: &ItemId, worker: &WorkerId) -> Result<(), StoreError> {
        self.inner.set_assignee(id, worker)?;
        if self.hit(self.config.rival_claim_percent) {
            self.inner.set_assignee(id, &WorkerId::new("rival-ghost"))?;
            self.stats.borrow_mut().rival_claims += 1;
        }
        Ok(())
    }

    fn clear_assignee(&self, id: &ItemId) -> Result<(), StoreError> {
        self.inner.clear_assignee(id)
    }

    fn set_labels(&self, id: &ItemId, add: &[Label], remove: &[Label]) -> Result<(), StoreError> {
        self.inner.set_labels(id, add, remove)
    }

    fn append_comment(
        &self,
        id: &ItemId,
        author: &WorkerId,
        body: &str,
    ) -> Result<CommentRef, StoreError> {
        let is_snapshot = body.trim_start().starts_with(MARKER_SNAPSHOT);
        if is_snapshot && self.hit(self.config.malformed_snapshot_percent) {
            self.stats.borrow_mut().malformed_snapshots += 1;
            return self.inner.append_comment(id, author, &corrupted_snapshot_body());
        }
        self.inner.append_comment(id, author, body)
    }

    fn edit_body(&self, id: &ItemId, new_body: &str) -> Result<(), StoreError> {
        self.inner.edit_body(id, new_body)
    }
}
