//! Optimistic claim arbitration.
//!
//! The store offers no compare-and-swap, so a claim is a three-step
//! optimistic protocol: read the assignee, write the claim, then re-read to
//! verify the write survived. Two racing claimers are disambiguated purely
//! by whichever write lands last in the store's own serialization — the
//! verification read discovers it; timestamps are never compared.
//!
//! Claims are permanent until explicitly released. There is no TTL and no
//! staleness expiry anywhere in the protocol.

use tracing::{debug, info};

use crate::error::CoordError;
use crate::event::{Event, writer};
use crate::model::item::{ItemId, Label, WorkerId};
use crate::store::WorkItemStore;

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claim is ours and verified.
    Claimed,
    /// Someone already held the item before we wrote anything.
    AlreadyClaimed(WorkerId),
    /// Our write was overwritten before the verification read. Partial
    /// writes have been released; pick a different item.
    RaceLost {
        /// The surviving assignee, when the verification read saw one.
        winner: Option<WorkerId>,
    },
}

/// Who is allowed to release a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseAuthority {
    /// The claim holder itself.
    Assignee,
    /// A tracker owner acting as coordinator.
    Coordinator,
}

/// Claim operations for one worker against one store.
#[derive(Debug)]
pub struct ClaimManager<'a, S> {
    store: &'a S,
    worker: WorkerId,
}

impl<'a, S: WorkItemStore> ClaimManager<'a, S> {
    /// Create a manager acting as `worker`.
    pub const fn new(store: &'a S, worker: WorkerId) -> Self {
        Self { store, worker }
    }

    /// The worker this manager acts as.
    #[must_use]
    pub const fn worker(&self) -> &WorkerId {
        &self.worker
    }

    /// Attempt to claim `item`.
    ///
    /// Race losses are an outcome, not an error: the caller retries with a
    /// different item, immediately and without backoff (the check is
    /// one-shot).
    ///
    /// Known hole, deliberately not papered over: if two claimers both pass
    /// the verification read — a true double-write accepted by the backend
    /// between the rival's write and ours — both see success. The protocol
    /// assumes the store's internal serialization prevents this; the
    /// simulator measures how often the assumption is load-bearing.
    ///
    /// # Errors
    ///
    /// Store failures, including `ItemNotFound` if the item vanished.
    pub fn try_claim(&self, item: &ItemId) -> Result<ClaimOutcome, CoordError> {
        let (current, _) = self.store.get_item(item)?;
        if let Some(holder) = current.assignee {
            if holder == self.worker {
                debug!(%item, worker = %self.worker, "item already ours; claim is idempotent");
                return Ok(ClaimOutcome::Claimed);
            }
            debug!(%item, %holder, "item already claimed");
            return Ok(ClaimOutcome::AlreadyClaimed(holder));
        }

        self.store.set_assignee(item, &self.worker)?;
        self.store
            .set_labels(item, &[Label::InProgress], &[Label::Ready])?;
        self.append(item, &Event::Claimed {
            worker: self.worker.clone(),
        })?;

        // Post-write verification: the only race detection we have.
        let (verified, _) = self.store.get_item(item)?;
        if verified.assignee.as_ref() == Some(&self.worker) {
            info!(%item, worker = %self.worker, "claim verified");
            return Ok(ClaimOutcome::Claimed);
        }

        let winner = verified.assignee;
        info!(%item, worker = %self.worker, ?winner, "claim race lost");
        self.release_after_race(item, winner.as_ref())?;
        Ok(ClaimOutcome::RaceLost { winner })
    }

    /// Release a held claim. Permanent claims end only here.
    ///
    /// # Errors
    ///
    /// `NotClaimHolder` when `authority` is `Assignee` and the claim is
    /// held by someone else (or nobody); store failures otherwise.
    pub fn release(
        &self,
        item: &ItemId,
        authority: ReleaseAuthority,
        reason: Option<&str>,
    ) -> Result<(), CoordError> {
        let (current, _) = self.store.get_item(item)?;
        let holder = current.assignee.clone();
        if authority == ReleaseAuthority::Assignee && holder.as_ref() != Some(&self.worker) {
            return Err(CoordError::NotClaimHolder {
                caller: self.worker.clone(),
                item: item.clone(),
                holder,
            });
        }

        self.store.clear_assignee(item)?;
        self.store
            .set_labels(item, &[Label::Ready], &[Label::InProgress])?;
        let released = holder.unwrap_or_else(|| self.worker.clone());
        self.append(item, &Event::Released {
            worker: released,
            reason: reason.map(str::to_string),
        })?;
        info!(%item, worker = %self.worker, "claim released");
        Ok(())
    }

    /// Undo the caller's own partial writes after a lost race.
    ///
    /// The winner's claim writes the same labels ours did, so label state
    /// is only restored when the verification read saw *no* assignee at
    /// all. The assignee field is never touched — it is the winner's. The
    /// `## Released` comment is always appended so the log records that our
    /// claim attempt ended.
    fn release_after_race(
        &self,
        item: &ItemId,
        winner: Option<&WorkerId>,
    ) -> Result<(), CoordError> {
        if winner.is_none() {
            self.store
                .set_labels(item, &[Label::Ready], &[Label::InProgress])?;
        }
        self.append(item, &Event::Released {
            worker: self.worker.clone(),
            reason: Some("claim race lost".to_string()),
        })?;
        Ok(())
    }

    fn append(&self, item: &ItemId, event: &Event) -> Result<(), CoordError> {
        if let Some(body) = writer::render(event) {
            self.store.append_comment(item, &self.worker, &body)?;
        }
        Ok(())
    }
}
