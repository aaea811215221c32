//! In-Memory Cause Store
//!
//! Implements the `CauseRepository` port over a `DashMap` with an atomic id
//! sequence. Used as the default store and as the backing map of the JSON
//! file store.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::{Cause, CauseId, CauseRepository};
use crate::error::{Error, Result};

/// The id after `id`. `i64::MAX` itself is never stored, so the sequence cannot wrap.
fn following(id: CauseId) -> Result<i64> {
    id.value()
        .checked_add(1)
        .ok_or_else(|| Error::Validation(format!("cause id {id} is outside the id range")))
}

/// In-memory cause store.
///
/// Ids are assigned from a monotonically increasing sequence starting at 1
/// (or after the largest id ever stored), so concurrent creates never collide.
pub struct InMemoryCauseRepository {
    records: DashMap<CauseId, Cause>,
    next_id: AtomicI64,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl Default for InMemoryCauseRepository {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicI64::new(1),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }
}

impl InMemoryCauseRepository {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with `causes`.
    ///
    /// Causes carrying an id keep it; the rest are assigned fresh ids.
    pub fn with_causes(causes: impl IntoIterator<Item = Cause>) -> Result<Self> {
        let repo = Self::new();
        for cause in causes {
            repo.insert(cause)?;
        }
        repo.reset_stats();
        Ok(repo)
    }

    /// Fill in the id `cause` would be stored under, without storing it.
    ///
    /// Fails when the id space is exhausted. Callers that stage a write this
    /// way must serialize their writes so the peeked id stays free.
    pub(super) fn assign_id(&self, mut cause: Cause) -> Result<Cause> {
        match cause.id {
            Some(id) => {
                following(id)?;
            }
            None => {
                let next = self.next_id.load(Ordering::SeqCst);
                if next == i64::MAX {
                    return Err(Error::Store("cause id sequence exhausted".to_string()));
                }
                cause.id = Some(CauseId(next));
            }
        }
        Ok(cause)
    }

    fn insert(&self, mut cause: Cause) -> Result<Cause> {
        let id = match cause.id {
            Some(id) => {
                self.next_id.fetch_max(following(id)?, Ordering::SeqCst);
                id
            }
            None => self
                .next_id
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
                .map(CauseId)
                .map_err(|_| Error::Store("cause id sequence exhausted".to_string()))?,
        };
        cause.id = Some(id);
        self.records.insert(id, cause.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(cause)
    }

    /// Point-in-time copy of every record, ordered by id
    pub fn snapshot(&self) -> Vec<Cause> {
        let mut causes: Vec<Cause> = self.records.iter().map(|r| r.value().clone()).collect();
        causes.sort_by_key(|c| c.id);
        causes
    }

    /// Number of `find_by_id` calls served
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of `save` calls served
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of `delete_by_id` calls served
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    pub fn reset_stats(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
    }
}

#[async_trait]
impl CauseRepository for InMemoryCauseRepository {
    async fn find_all(&self) -> Result<Vec<Cause>> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }

    async fn find_by_id(&self, id: CauseId) -> Result<Option<Cause>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn save(&self, cause: Cause) -> Result<Cause> {
        self.insert(cause)
    }

    async fn delete_by_id(&self, id: CauseId) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.remove(&id).is_some())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.len())
    }
}
