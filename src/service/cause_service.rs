//! Cause Service
//!
//! CRUD over causes with cache-aside consistency. Every operation bumps a
//! `method.invoked.CauseService.<op>` counter and logs entry and exit.

use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use crate::cache::{CacheStatsSnapshot, CachingRepository};
use crate::domain::{Cause, CauseId, CauseRepository, CounterService};
use crate::error::{Error, Result};

/// Type-erased store handed to the service
pub type SharedRepository = Arc<dyn CauseRepository>;

const COUNTER_PREFIX: &str = "method.invoked.CauseService";

/// Business operations on the cause entity
pub struct CauseService {
    repo: CachingRepository<SharedRepository>,
    counters: Arc<dyn CounterService>,
}

impl CauseService {
    /// Build the service over `store`, fronted by a fresh cache.
    pub fn new(store: SharedRepository, counters: Arc<dyn CounterService>) -> Self {
        Self {
            repo: CachingRepository::new(store),
            counters,
        }
    }

    fn record(&self, op: &str) {
        self.counters.increment(&Self::counter_name(op));
    }

    /// Counter name for an operation, as seen by the `CounterService`
    pub fn counter_name(op: &str) -> String {
        format!("{COUNTER_PREFIX}.{op}")
    }

    /// All causes ordered by id. Bypasses the cache.
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<Cause>> {
        info!("> findAll");
        self.record("findAll");

        let mut causes = self.repo.find_all().await?;
        causes.sort_by_key(|c| c.id);

        info!(count = causes.len(), "< findAll");
        Ok(causes)
    }

    /// Cached lookup; `None` when the store has no such cause.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn find_by_id(&self, id: CauseId) -> Result<Option<Cause>> {
        info!("> findOne");
        self.record("findOne");

        let cause = self.repo.find_by_id(id).await?;

        info!(found = cause.is_some(), "< findOne");
        Ok(cause)
    }

    /// Persist a new cause. The store assigns the id.
    #[instrument(skip(self, cause))]
    pub async fn create(&self, cause: Cause) -> Result<Cause> {
        info!("> create");
        self.record("create");

        if let Some(id) = cause.id {
            error!(id = %id, "Attempted to create a cause, but the id attribute was not empty");
            return Err(Error::Validation(
                "The id attribute must be empty to persist a new entity".to_string(),
            ));
        }

        let saved = self.repo.save(cause).await?;

        info!(id = ?saved.id, "< create");
        Ok(saved)
    }

    /// Overwrite the mutable fields of an existing cause.
    #[instrument(skip(self, cause), fields(id = ?cause.id))]
    pub async fn update(&self, cause: Cause) -> Result<Cause> {
        info!("> update");
        self.record("update");

        let Some(id) = cause.id else {
            return Err(Error::Validation(
                "The id attribute is required to update an entity".to_string(),
            ));
        };

        let Some(mut stored) = self.repo.find_by_id(id).await? else {
            error!("Attempted to update a cause, but the entity does not exist");
            return Err(Error::NotFound(format!("cause {id}")));
        };

        stored.apply_changes(&cause);
        let updated = self.repo.save(stored).await?;

        info!("< update");
        Ok(updated)
    }

    /// Remove a cause and its cache entry.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete(&self, id: CauseId) -> Result<()> {
        info!("> delete");
        self.record("delete");

        let removed = self.repo.delete_by_id(id).await?;
        if !removed {
            debug!("Delete requested for a cause that was not stored");
        }

        info!("< delete");
        Ok(())
    }

    /// Clear every cache entry. The store is untouched.
    #[instrument(skip(self))]
    pub fn evict_cache(&self) {
        info!("> evictCache");
        self.record("evictCache");

        self.repo.evict_all();

        info!("< evictCache");
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.repo.stats()
    }

    /// Whether `id` currently has a cache entry
    pub fn is_cached(&self, id: CauseId) -> bool {
        self.repo.contains(id)
    }
}

// =============================================================================
// Tests
// =============================================================================
