//! In-memory Work Item Store.
//!
//! Deterministic backend for unit tests and the simulator. Cloning shares
//! the underlying state, so multiple "workers" racing against one
//! [`MemStore`] observe each other's writes exactly the way they would
//! through a real tracker: every call is atomic, assignee writes are
//! last-write-wins, and comment `seq` numbers are the store's internal
//! serialization.
//!
//! Quota faults can be scripted (`inject_quota_faults`) to drive the
//! rate-limit controller without a real backend.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;

use crate::model::item::{Comment, ItemId, Label, WorkItem, WorkerId};
use crate::store::{CommentRef, LabelFilter, StoreError, WorkItemRef, WorkItemStore};

#[derive(Debug)]
struct StoredItem {
    item: WorkItem,
    comments: Vec<Comment>,
    next_seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    items: BTreeMap<ItemId, StoredItem>,
    quota_faults: u32,
    quota_reset: Duration,
}

/// Shared, mutex-serialized in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned mutex means a panicking test, not corrupt data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an item. Overwrites any existing item with the same ID.
    pub fn insert_item(&self, item: WorkItem) {
        let mut inner = self.lock();
        inner.items.insert(
            item.id.clone(),
            StoredItem {
                item,
                comments: Vec::new(),
                next_seq: 1,
            },
        );
    }

    /// Fail the next `count` store calls with `QuotaExhausted`.
    pub fn inject_quota_faults(&self, count: u32, reset_after: Duration) {
        let mut inner = self.lock();
        inner.quota_faults = count;
        inner.quota_reset = reset_after;
    }

    /// Close an item (terminal state).
    ///
    /// # Errors
    ///
    /// [`StoreError::ItemNotFound`] if the item does not exist.
    pub fn close_item(&self, id: &ItemId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        consume_quota_fault(&mut inner)?;
        let stored = stored_mut(&mut inner, id)?;
        stored.item.closed = true;
        Ok(())
    }
}

fn consume_quota_fault(inner: &mut Inner) -> Result<(), StoreError> {
    if inner.quota_faults > 0 {
        inner.quota_faults -= 1;
        return Err(StoreError::QuotaExhausted {
            reset_after: inner.quota_reset,
        });
    }
    Ok(())
}

fn stored_mut<'a>(inner: &'a mut Inner, id: &ItemId) -> Result<&'a mut StoredItem, StoreError> {
    inner
        .items
        .get_mut(id)
        .ok_or_else(|| StoreError::ItemNotFound(id.clone()))
}

impl WorkItemStore for MemStore {
    fn list_items(&self, filter: &LabelFilter) -> Result<Vec<WorkItemRef>, StoreError> {
        let mut inner = self.lock();
        consume_quota_fault(&mut inner)?;
        Ok(inner
            .items
            .values()
            .filter(|stored| filter.matches(&stored.item))
            .map(|stored| WorkItemRef {
                id: stored.item.id.clone(),
                title: stored.item.title.clone(),
            })
            .collect())
    }

    fn get_item(&self, id: &ItemId) -> Result<(WorkItem, Vec<Comment>), StoreError> {
        let mut inner = self.lock();
        consume_quota_fault(&mut inner)?;
        let stored = stored_mut(&mut inner, id)?;
        Ok((stored.item.clone(), stored.comments.clone()))
    }

    fn set_assignee(&self, id: &ItemId, worker: &WorkerId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        consume_quota_fault(&mut inner)?;
        let stored = stored_mut(&mut inner, id)?;
        // Last write wins, matching tracker semantics. Racing claimers are
        // disambiguated by the post-write verification read, not here.
        stored.item.assignee = Some(worker.clone());
        Ok(())
    }

    fn clear_assignee(&self, id: &ItemId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        consume_quota_fault(&mut inner)?;
        let stored = stored_mut(&mut inner, id)?;
        stored.item.assignee = None;
        Ok(())
    }

    fn set_labels(&self, id: &ItemId, add: &[Label], remove: &[Label]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        consume_quota_fault(&mut inner)?;
        let stored = stored_mut(&mut inner, id)?;
        for label in remove {
            stored.item.labels.remove(label);
        }
        for label in add {
            stored.item.labels.insert(label.clone());
        }
        Ok(())
    }

    fn append_comment(
        &self,
        id: &ItemId,
        author: &WorkerId,
        body: &str,
    ) -> Result<CommentRef, StoreError> {
        let mut inner = self.lock();
        consume_quota_fault(&mut inner)?;
        let stored = stored_mut(&mut inner, id)?;
        let seq = stored.next_seq;
        stored.next_seq += 1;
        stored.comments.push(Comment {
            seq,
            author: author.clone(),
            wall_ts: Utc::now(),
            body: body.to_string(),
        });
        Ok(CommentRef {
            item: id.clone(),
            seq,
        })
    }

    fn edit_body(&self, id: &ItemId, new_body: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        consume_quota_fault(&mut inner)?;
        let stored = stored_mut(&mut inner, id)?;
        stored.item.body = new_body.to_string();
        Ok(())
    }
}
