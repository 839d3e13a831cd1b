//! One worker's session against the tracker.
//!
//! The session is the orchestration seam: candidate selection, the claim
//! retry loop, recovery on claim, scope declaration, checkpointing, and
//! finish/abandon. It carries no task memory of its own beyond the id of
//! the item it currently holds — everything else lives in the item's log,
//! which is the point.

use tracing::{debug, info};

use crate::claim::{ClaimManager, ClaimOutcome, ReleaseAuthority};
use crate::config::EngineConfig;
use crate::error::CoordError;
use crate::event::{Event, writer};
use crate::model::item::{ItemId, Label, WorkItem, WorkerId};
use crate::model::snapshot::{ScopeDeclaration, StateSnapshot};
use crate::model::wave::{Epic, WaveGate};
use crate::quota::{QuotaGate, Sleeper};
use crate::recovery::{self, RecoveredState, WorkspaceProbe};
use crate::scope::{self, NegotiationState};
use crate::store::{LabelFilter, WorkItemRef, WorkItemStore};
use crate::checkpoint;

/// A successfully claimed item plus whatever a prior worker left behind.
#[derive(Debug, Clone)]
pub struct Acquisition {
    /// The item as read immediately after the claim verified.
    pub item: WorkItem,
    /// Resume plan from the item's log, or `NoPriorState` for fresh work.
    pub recovered: RecoveredState,
}

pub struct WorkerSession<'a, S, P, Z> {
    store: &'a S,
    probe: &'a P,
    sleeper: &'a Z,
    config: &'a EngineConfig,
    worker: WorkerId,
    current: Option<ItemId>,
}

impl<'a, S, P, Z> WorkerSession<'a, S, P, Z>
where
    S: WorkItemStore,
    P: WorkspaceProbe,
    Z: Sleeper,
{
    pub fn new(
        store: &'a S,
        probe: &'a P,
        sleeper: &'a Z,
        config: &'a EngineConfig,
        worker: WorkerId,
    ) -> Self {
        Self {
            store,
            probe,
            sleeper,
            config,
            worker,
            current: None,
        }
    }

    #[must_use]
    pub const fn worker(&self) -> &WorkerId {
        &self.worker
    }

    /// The item this session currently holds, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&ItemId> {
        self.current.as_ref()
    }

    /// Candidate items in claim order: our own in-progress items first
    /// (interrupted work to resume), then unassigned ready items.
    ///
    /// # Errors
    ///
    /// Store failures; quota exhaustion past the pause budget.
    pub fn next_available(&self) -> Result<Vec<WorkItemRef>, CoordError> {
        self.gate().run(
            || Ok(()),
            || {
                let mut candidates = self.store.list_items(
                    &LabelFilter::default()
                        .with(Label::InProgress)
                        .assigned_to(self.worker.clone()),
                )?;
                candidates.extend(
                    self.store
                        .list_items(&LabelFilter::default().with(Label::Ready).unassigned())?,
                );
                Ok(candidates)
            },
        )
    }

    /// Claim the next workable item.
    ///
    /// Walks the candidate list, skipping wave-gated items, retrying
    /// immediately with the next candidate on a lost race or an item
    /// someone claimed in between. Recovery runs on the claimed item's log
    /// before the acquisition is handed back.
    ///
    /// Returns `None` when the candidates (or the configured attempt
    /// budget) run out without a verified claim.
    ///
    /// # Errors
    ///
    /// Store failures other than a candidate vanishing mid-scan.
    pub fn acquire(&mut self) -> Result<Option<Acquisition>, CoordError> {
        let manager = ClaimManager::new(self.store, self.worker.clone());
        let gate = self.gate();
        let mut attempts = 0_u32;
        for candidate in self.next_available()? {
            if attempts >= self.config.claim.max_attempts {
                debug!(attempts, "claim attempt budget spent");
                break;
            }
            attempts += 1;

            let item = match gate.run(|| Ok(()), || self.store.get_item(&candidate.id)) {
                Ok((item, _)) => item,
                Err(CoordError::ItemNotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            if let WaveGate::Blocked { pending } = self.wave_gate(&item)? {
                debug!(item = %item.id, blocked_by = pending.len(), "wave gate closed; skipping");
                continue;
            }

            match gate.run_protocol(|| Ok(()), || manager.try_claim(&item.id))? {
                ClaimOutcome::Claimed => {
                    return Ok(Some(self.complete_acquisition(&candidate.id)?));
                }
                ClaimOutcome::AlreadyClaimed(_) | ClaimOutcome::RaceLost { .. } => {}
            }
        }
        Ok(None)
    }

    /// Claim one specific item or fail.
    ///
    /// Unlike [`acquire`](Self::acquire), which shops around on a lost
    /// race, a directed claim surfaces it: a caller resuming a known item
    /// needs to hear that somebody else holds it now.
    ///
    /// # Errors
    ///
    /// [`CoordError::RaceLost`] when the item is or becomes someone
    /// else's; [`CoordError::PhaseViolation`] when its wave gate is shut;
    /// store failures.
    pub fn acquire_item(&mut self, id: &ItemId) -> Result<Acquisition, CoordError> {
        let gate = self.gate();
        let (item, _) = gate.run(|| Ok(()), || self.store.get_item(id))?;
        self.require_wave_open(&item)?;
        let manager = ClaimManager::new(self.store, self.worker.clone());
        match gate.run_protocol(|| Ok(()), || manager.try_claim(id))? {
            ClaimOutcome::Claimed => self.complete_acquisition(id),
            ClaimOutcome::AlreadyClaimed(winner) => Err(CoordError::RaceLost {
                item: id.clone(),
                winner: Some(winner),
            }),
            ClaimOutcome::RaceLost { winner } => Err(CoordError::RaceLost {
                item: id.clone(),
                winner,
            }),
        }
    }

    fn complete_acquisition(&mut self, id: &ItemId) -> Result<Acquisition, CoordError> {
        let (item, comments) = self.gate().run(|| Ok(()), || self.store.get_item(id))?;
        let recovered = recovery::recover(&comments, self.probe);
        self.current = Some(item.id.clone());
        info!(item = %item.id, worker = %self.worker, "item acquired");
        Ok(Acquisition { item, recovered })
    }

    /// Check the wave gate for an item without touching it.
    ///
    /// Items outside any epic, or without a wave label, are ungated.
    ///
    /// # Errors
    ///
    /// Store failures while fetching prior-wave siblings.
    pub fn wave_gate(&self, item: &WorkItem) -> Result<WaveGate, CoordError> {
        let (Some(wave), Some(hub)) = (item.wave(), item.epic().cloned()) else {
            return Ok(WaveGate::Open);
        };
        let members = self.epic_members(&hub)?;
        let epic = Epic::assemble(hub, &members);
        let gating: Vec<ItemId> = epic.items_before_wave(wave);
        let prior: Vec<WorkItem> = members
            .into_iter()
            .filter(|member| gating.contains(&member.id))
            .collect();
        Ok(WaveGate::evaluate(&prior))
    }

    /// Fail unless the item's wave gate is open. Used before starting work
    /// on an item that was claimed while its gate state may have changed.
    ///
    /// # Errors
    ///
    /// [`CoordError::PhaseViolation`] naming the blocking wave state.
    pub fn require_wave_open(&self, item: &WorkItem) -> Result<(), CoordError> {
        match self.wave_gate(item)? {
            WaveGate::Open => Ok(()),
            WaveGate::Blocked { pending } => Err(CoordError::PhaseViolation {
                item: item.id.clone(),
                reason: format!(
                    "wave gate blocked by {} unfinished prior-wave item(s)",
                    pending.len()
                ),
            }),
        }
    }

    /// Publish a scope declaration on the held item, then scan the wave
    /// siblings for overlap.
    ///
    /// The declaration lands before the scan: publication is what makes the
    /// claim of those paths visible to everyone else, and a conflicting
    /// result means negotiation, not retraction.
    ///
    /// # Errors
    ///
    /// [`CoordError::NoActiveClaim`] without a held item; store failures.
    pub fn declare_scope(
        &self,
        declaration: &ScopeDeclaration,
    ) -> Result<NegotiationState, CoordError> {
        let item = self.require_current()?.clone();
        let gate = self.gate();
        gate.run_protocol(
            || Ok(()),
            || scope::declare(self.store, &self.worker, &item, declaration),
        )?;
        let siblings = self.wave_siblings(&item)?;
        let conflicts = gate.run_protocol(
            || Ok(()),
            || scope::check_conflicts(self.store, &item, declaration, &siblings),
        )?;
        Ok(scope::negotiation_state(conflicts))
    }

    /// Append a state snapshot to the held item's log.
    ///
    /// Routed through the quota gate: a checkpoint that hits a quota window
    /// pauses and retries rather than getting lost.
    ///
    /// # Errors
    ///
    /// [`CoordError::NoActiveClaim`] without a held item; quota exhaustion
    /// past the pause budget; store failures.
    pub fn checkpoint(&self, snapshot: &StateSnapshot) -> Result<(), CoordError> {
        let item = self.require_current()?;
        let body = checkpoint::encode(snapshot);
        let gate = QuotaGate::new(&self.config.quota, self.sleeper);
        gate.run(
            || Ok(()),
            || self.store.append_comment(item, &self.worker, &body).map(|_| ()),
        )?;
        debug!(%item, "checkpoint written");
        Ok(())
    }

    /// Complete the held item: final checkpoint (per config), terminal
    /// labels, release.
    ///
    /// # Errors
    ///
    /// [`CoordError::NoActiveClaim`] without a held item; store failures.
    pub fn finish(&mut self, final_snapshot: Option<&StateSnapshot>) -> Result<(), CoordError> {
        let item = self.require_current()?.clone();
        if self.config.session.checkpoint_on_finish {
            if let Some(snapshot) = final_snapshot {
                self.checkpoint(snapshot)?;
            }
        }
        // Rerunning the whole block after a quota pause is safe: labels and
        // assignee writes are idempotent, and a duplicate release marker
        // folds away.
        self.gate().run(
            || Ok(()),
            || {
                self.store.set_labels(
                    &item,
                    &[Label::Completed],
                    &[Label::InProgress, Label::Ready],
                )?;
                self.store.clear_assignee(&item)?;
                if let Some(body) = writer::render(&Event::Released {
                    worker: self.worker.clone(),
                    reason: Some("work complete".to_string()),
                }) {
                    self.store.append_comment(&item, &self.worker, &body)?;
                }
                Ok(())
            },
        )?;
        self.current = None;
        info!(%item, worker = %self.worker, "item completed");
        Ok(())
    }

    /// Give the held item back to the pool with an explanation.
    ///
    /// # Errors
    ///
    /// [`CoordError::NoActiveClaim`] without a held item; store failures.
    pub fn abandon(&mut self, reason: &str) -> Result<(), CoordError> {
        let item = self.require_current()?.clone();
        let manager = ClaimManager::new(self.store, self.worker.clone());
        self.gate().run_protocol(
            || Ok(()),
            || manager.release(&item, ReleaseAuthority::Assignee, Some(reason)),
        )?;
        self.current = None;
        Ok(())
    }

    /// Rewrite an index item's body, always paired with an explanatory
    /// comment. The pairing is by construction: there is no body edit in
    /// this crate that does not leave a log entry saying why.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn edit_index(
        &self,
        item: &ItemId,
        new_body: &str,
        explanation: &str,
    ) -> Result<(), CoordError> {
        self.gate().run(
            || Ok(()),
            || {
                self.store.edit_body(item, new_body)?;
                self.store
                    .append_comment(item, &self.worker, explanation)
                    .map(|_| ())
            },
        )?;
        info!(%item, "index body rewritten");
        Ok(())
    }

    fn wave_siblings(&self, item: &ItemId) -> Result<Vec<ItemId>, CoordError> {
        let (work, _) = self.gate().run(|| Ok(()), || self.store.get_item(item))?;
        let (Some(_), Some(hub)) = (work.wave(), work.epic().cloned()) else {
            return Ok(Vec::new());
        };
        let members = self.epic_members(&hub)?;
        Ok(Epic::assemble(hub, &members).wave_siblings(item))
    }

    /// Live state of every labeled member of the epic, vanished items
    /// skipped.
    fn epic_members(&self, hub: &ItemId) -> Result<Vec<WorkItem>, CoordError> {
        let gate = self.gate();
        let refs = gate.run(
            || Ok(()),
            || {
                self.store
                    .list_items(&LabelFilter::default().with(Label::Epic(hub.clone())))
            },
        )?;
        let mut members = Vec::new();
        for entry in refs {
            match gate.run(|| Ok(()), || self.store.get_item(&entry.id)) {
                Ok((member, _)) => members.push(member),
                Err(CoordError::ItemNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(members)
    }

    fn gate(&self) -> QuotaGate<'a, Z> {
        QuotaGate::new(&self.config.quota, self.sleeper)
    }

    fn require_current(&self) -> Result<&ItemId, CoordError> {
        self.current.as_ref().ok_or(CoordError::NoActiveClaim)
    }
}
