//! Simulated memory-less worker.
//!
//! Each tick performs one protocol action against the store: claim an item,
//! do a unit of work (checkpointing as it goes), or finish. The worker keeps
//! no task state beyond the id of the item it holds and a countdown; on
//! claim it replays the item's log through recovery exactly the way a real
//! worker would after a crash.

use serde::{Deserialize, Serialize};
use tracing::debug;

use cairn_core::checkpoint;
use cairn_core::claim::{ClaimManager, ClaimOutcome};
use cairn_core::error::CoordError;
use cairn_core::event::{Event, ThreadOutcome, writer};
use cairn_core::lock;
use cairn_core::model::item::{ItemId, Label, WorkerId};
use cairn_core::model::snapshot::StateSnapshot;
use cairn_core::phase::Phase;
use cairn_core::recovery::{self, NullProbe, RecoveredState};
use cairn_core::store::{LabelFilter, WorkItemStore};

use crate::rng::DeterministicRng;

/// Resource all workers serialize their finish step on.
pub const MERGE_LOCK: &str = "merge-queue";

/// Per-worker counters for the run report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Verified claims.
    pub claims_won: u64,
    /// Claims lost at the verification read.
    pub races_lost: u64,
    /// Checkpoints written (including ones faults corrupted in flight).
    pub checkpoints_written: u64,
    /// Items finished end to end.
    pub items_completed: u64,
    /// Ticks spent waiting on the merge lock.
    pub lock_waits: u64,
    /// Claims that resumed from a prior worker's checkpoint.
    pub resumes: u64,
}

impl WorkerStats {
    pub fn absorb(&mut self, other: Self) {
        self.claims_won += other.claims_won;
        self.races_lost += other.races_lost;
        self.checkpoints_written += other.checkpoints_written;
        self.items_completed += other.items_completed;
        self.lock_waits += other.lock_waits;
        self.resumes += other.resumes;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkerMode {
    Idle,
    Working {
        item: ItemId,
        steps_left: u32,
        thread_open: bool,
        holds_merge_lock: bool,
    },
}

/// One simulated worker.
#[derive(Debug)]
pub struct SimWorker {
    id: WorkerId,
    mode: WorkerMode,
    /// Counters, read by the simulator after the run.
    pub stats: WorkerStats,
}

impl SimWorker {
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            id: WorkerId::new(format!("worker-{index}")),
            mode: WorkerMode::Idle,
            stats: WorkerStats::default(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Perform one protocol action.
    ///
    /// # Errors
    ///
    /// Store failures, including injected quota windows, which the
    /// simulator absorbs as skipped ticks.
    pub fn tick<S: WorkItemStore>(
        &mut self,
        store: &S,
        hub: &ItemId,
        rng: &mut DeterministicRng,
    ) -> Result<(), CoordError> {
        match self.mode.clone() {
            WorkerMode::Idle => self.try_acquire(store, rng),
            WorkerMode::Working {
                item,
                steps_left,
                thread_open,
                holds_merge_lock,
            } => {
                if !thread_open {
                    self.open_thread(store, &item, steps_left)
                } else if steps_left > 0 {
                    self.work_step(store, &item, steps_left, holds_merge_lock)
                } else if holds_merge_lock {
                    self.finish(store, hub, &item)
                } else {
                    self.grab_merge_lock(store, hub, &item)
                }
            }
        }
    }

    fn try_acquire<S: WorkItemStore>(
        &mut self,
        store: &S,
        rng: &mut DeterministicRng,
    ) -> Result<(), CoordError> {
        // A quota window can abort a tick mid-claim, leaving the item
        // assigned to us with no claim verified. Those come first; the
        // idempotent re-claim picks up where the aborted tick stopped.
        let mine = store.list_items(&LabelFilter::default().assigned_to(self.id.clone()))?;
        let ready = store.list_items(&LabelFilter::default().with(Label::Ready).unassigned())?;
        let Some(candidate) = mine.first().or_else(|| rng.pick(&ready)) else {
            return Ok(());
        };
        let manager = ClaimManager::new(store, self.id.clone());
        match manager.try_claim(&candidate.id) {
            Ok(ClaimOutcome::Claimed) => {
                self.stats.claims_won += 1;
                let (_, comments) = store.get_item(&candidate.id)?;
                let steps = match recovery::recover(&comments, &NullProbe) {
                    RecoveredState::Resumed(plan) => {
                        self.stats.resumes += 1;
                        debug!(worker = %self.id, item = %candidate.id, seq = plan.checkpoint_seq, "resumed from checkpoint");
                        u32::try_from(plan.operations.len()).unwrap_or(1).max(1)
                    }
                    RecoveredState::NoPriorState => 1 + u32::try_from(rng.next_bounded(3)).unwrap_or(0),
                };
                self.mode = WorkerMode::Working {
                    item: candidate.id.clone(),
                    steps_left: steps,
                    thread_open: false,
                    holds_merge_lock: false,
                };
                Ok(())
            }
            Ok(ClaimOutcome::RaceLost { .. }) => {
                self.stats.races_lost += 1;
                Ok(())
            }
            Ok(ClaimOutcome::AlreadyClaimed(_)) => Ok(()),
            Err(CoordError::ItemNotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn open_thread<S: WorkItemStore>(
        &mut self,
        store: &S,
        item: &ItemId,
        steps_left: u32,
    ) -> Result<(), CoordError> {
        self.append(store, item, &Event::ThreadOpened { phase: Phase::Dev })?;
        self.mode = WorkerMode::Working {
            item: item.clone(),
            steps_left,
            thread_open: true,
            holds_merge_lock: false,
        };
        Ok(())
    }

    fn work_step<S: WorkItemStore>(
        &mut self,
        store: &S,
        item: &ItemId,
        steps_left: u32,
        holds_merge_lock: bool,
    ) -> Result<(), CoordError> {
        let snapshot = StateSnapshot {
            in_progress: Some(format!("unit {steps_left}")),
            pending: (0..steps_left.saturating_sub(1))
                .map(|n| format!("unit {n}"))
                .collect(),
            next_action: format!("continue unit {steps_left}"),
            ..StateSnapshot::default()
        };
        store.append_comment(item, &self.id, &checkpoint::encode(&snapshot))?;
        self.stats.checkpoints_written += 1;
        self.mode = WorkerMode::Working {
            item: item.clone(),
            steps_left: steps_left - 1,
            thread_open: true,
            holds_merge_lock,
        };
        Ok(())
    }

    fn grab_merge_lock<S: WorkItemStore>(
        &mut self,
        store: &S,
        hub: &ItemId,
        item: &ItemId,
    ) -> Result<(), CoordError> {
        match lock::acquire(store, hub, &self.id, MERGE_LOCK) {
            Ok(()) => {
                self.mode = WorkerMode::Working {
                    item: item.clone(),
                    steps_left: 0,
                    thread_open: true,
                    holds_merge_lock: true,
                };
                Ok(())
            }
            Err(CoordError::LockHeld { .. }) => {
                self.stats.lock_waits += 1;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn finish<S: WorkItemStore>(
        &mut self,
        store: &S,
        hub: &ItemId,
        item: &ItemId,
    ) -> Result<(), CoordError> {
        self.append(store, item, &Event::ThreadClosed {
            phase: Some(Phase::Dev),
            outcome: Some(ThreadOutcome::Pass),
        })?;
        store.set_labels(item, &[Label::Completed], &[Label::InProgress, Label::Ready])?;
        store.clear_assignee(item)?;
        self.append(store, item, &Event::Released {
            worker: self.id.clone(),
            reason: Some("work complete".to_string()),
        })?;
        lock::release(store, hub, &self.id, MERGE_LOCK)?;
        self.stats.items_completed += 1;
        self.mode = WorkerMode::Idle;
        Ok(())
    }

    fn append<S: WorkItemStore>(
        &self,
        store: &S,
        item: &ItemId,
        event: &Event,
    ) -> Result<(), CoordError> {
        if let Some(body) = writer::render(event) {
            store.append_comment(item, &self.id, &body)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::event::parse_log;
    use cairn_core::model::item::WorkItem;
    use cairn_core::store::MemStore;
    use std::collections::BTreeSet;

    fn seed_world(store: &MemStore, items: &[&str]) -> ItemId {
        let hub = ItemId::new_unchecked("epic-hub");
        store.insert_item(WorkItem {
            id: hub.clone(),
            title: "hub".to_string(),
            body: String::new(),
            assignee: None,
            labels: BTreeSet::new(),
            closed: false,
        });
        for id in items {
            store.insert_item(WorkItem {
                id: ItemId::new_unchecked(*id),
                title: String::new(),
                body: String::new(),
                assignee: None,
                labels: [Label::Ready].into_iter().collect::<BTreeSet<_>>(),
                closed: false,
            });
        }
        hub
    }

    #[test]
    fn worker_runs_an_item_to_completion() {
        let store = MemStore::new();
        let hub = seed_world(&store, &["item-1"]);
        let mut rng = DeterministicRng::new(11);
        let mut worker = SimWorker::new(0);

        for _ in 0..32 {
            worker.tick(&store, &hub, &mut rng).expect("tick");
            if worker.stats.items_completed > 0 {
                break;
            }
        }
        assert_eq!(worker.stats.items_completed, 1);
        assert_eq!(worker.stats.claims_won, 1);

        let (item, comments) = store
            .get_item(&ItemId::new_unchecked("item-1"))
            .expect("get");
        assert!(item.has_label(&Label::Completed));
        assert_eq!(item.assignee, None);

        let events = parse_log(&comments);
        assert!(events.iter().any(|e| matches!(e.event, Event::Claimed { .. })));
        assert!(events.iter().any(|e| matches!(e.event, Event::ThreadOpened { .. })));
        assert!(events.iter().any(|e| matches!(e.event, Event::Checkpoint(_))));
        assert!(events.iter().any(|e| matches!(e.event, Event::ThreadClosed { .. })));

        // The merge lock went through a full acquire/release cycle.
        let (_, hub_comments) = store.get_item(&hub).expect("get hub");
        assert!(!lock::is_locked(&parse_log(&hub_comments), MERGE_LOCK));
    }

    #[test]
    fn worker_resumes_from_an_abandoned_checkpoint() {
        let store = MemStore::new();
        let hub = seed_world(&store, &["item-1"]);
        let id = ItemId::new_unchecked("item-1");
        let crashed = WorkerId::new("worker-99");
        let snapshot = StateSnapshot {
            in_progress: Some("unit 4".to_string()),
            pending: vec!["unit 3".to_string(), "unit 2".to_string()],
            next_action: "continue unit 4".to_string(),
            ..StateSnapshot::default()
        };
        store
            .append_comment(&id, &crashed, &checkpoint::encode(&snapshot))
            .expect("append");

        let mut rng = DeterministicRng::new(5);
        let mut worker = SimWorker::new(0);
        worker.tick(&store, &hub, &mut rng).expect("claim tick");
        assert_eq!(worker.stats.resumes, 1);
    }
}
