//! Read-Through Caching Repository
//!
//! Decorates any [`CauseRepository`] with an in-process `id → Cause` map.
//!
//! # Consistency
//!
//! - Reads consult the map first; a miss takes the per-key lock, re-checks,
//!   fetches from the inner store and populates only if the store has it.
//! - `save` writes through and refreshes the entry for the saved id.
//! - `delete_by_id` evicts the entry whether or not the store had it.
//! - Writes for an id hold the same per-key lock as read-through populates,
//!   so a slow populate can never reinstall a snapshot older than a write.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument};

use super::stats::{CacheStats, CacheStatsSnapshot};
use crate::domain::{Cause, CauseId, CauseRepository};
use crate::error::Result;

/// Cache-aside decorator around a cause store
pub struct CachingRepository<R> {
    inner: R,
    entries: DashMap<CauseId, Cause>,
    key_locks: DashMap<CauseId, Arc<Mutex<()>>>,
    stats: CacheStats,
}

impl<R> CachingRepository<R> {
    /// Wrap `inner` with an empty cache
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            key_locks: DashMap::new(),
            stats: CacheStats::new(),
        }
    }

    /// The decorated store
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Cached snapshot for `id`, without touching the store or the stats
    pub fn cached(&self, id: CauseId) -> Option<Cause> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: CauseId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the entry for `id`. Returns whether one was present.
    pub fn evict(&self, id: CauseId) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            self.stats.record_eviction();
        }
        removed
    }

    /// Drop every entry. The inner store is untouched.
    pub fn evict_all(&self) {
        self.entries.clear();
        self.stats.record_clear();
        debug!("Cache cleared");
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot(self.entries.len())
    }

    fn key_lock(&self, id: CauseId) -> Arc<Mutex<()>> {
        Arc::clone(self.key_locks.entry(id).or_default().value())
    }

    /// Hold the lock for `id` until the returned guard drops.
    async fn lock_key(&self, id: CauseId) -> KeyGuard<'_, R> {
        let mut key = KeyGuard {
            cache: self,
            id,
            held: None,
        };
        key.held = Some(self.key_lock(id).lock_owned().await);
        key
    }

    fn release_key_lock(&self, id: CauseId) {
        // Only the map still referencing the lock means nobody is waiting on it
        self.key_locks
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn put(&self, cause: &Cause) {
        if let Some(id) = cause.id {
            self.entries.insert(id, cause.clone());
            self.stats.record_put();
        }
    }
}

/// Per-key lock held by one cache operation.
///
/// Dropping it, on completion or when the operation's future is dropped,
/// unlocks the key and forgets the lock once no one else references it.
struct KeyGuard<'a, R> {
    cache: &'a CachingRepository<R>,
    id: CauseId,
    held: Option<OwnedMutexGuard<()>>,
}

impl<R> Drop for KeyGuard<'_, R> {
    fn drop(&mut self) {
        drop(self.held.take());
        self.cache.release_key_lock(self.id);
    }
}

#[async_trait]
impl<R: CauseRepository> CauseRepository for CachingRepository<R> {
    async fn find_all(&self) -> Result<Vec<Cause>> {
        self.inner.find_all().await
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn find_by_id(&self, id: CauseId) -> Result<Option<Cause>> {
        if let Some(hit) = self.cached(id) {
            self.stats.record_hit();
            debug!("Cache hit");
            return Ok(Some(hit));
        }
        self.stats.record_miss();

        let _key = self.lock_key(id).await;

        // Another reader may have populated while we waited
        match self.cached(id) {
            Some(hit) => Ok(Some(hit)),
            None => match self.inner.find_by_id(id).await {
                Ok(Some(found)) => {
                    self.entries.insert(id, found.clone());
                    self.stats.record_load();
                    debug!("Cache populated from store");
                    Ok(Some(found))
                }
                other => other,
            },
        }
    }

    async fn save(&self, cause: Cause) -> Result<Cause> {
        let Some(id) = cause.id else {
            // Fresh id: nobody can have cached it yet
            let saved = self.inner.save(cause).await?;
            self.put(&saved);
            return Ok(saved);
        };

        let _key = self.lock_key(id).await;

        let saved = self.inner.save(cause).await?;
        self.put(&saved);
        Ok(saved)
    }

    async fn delete_by_id(&self, id: CauseId) -> Result<bool> {
        let _key = self.lock_key(id).await;

        let result = self.inner.delete_by_id(id).await;
        self.evict(id);
        result
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

// =============================================================================
// Tests
// =============================================================================
