//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! This module defines the entity model and the abstractions (ports) the
//! service layer depends on. Infrastructure adapters implement these traits
//! to provide concrete implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │   CauseRepository │ Mailer │ CounterService          │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  InMemory/JsonFile repos │ SimulatedMailer │ Prom    │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// Cause identifier (value object).
///
/// Assigned by the store on first persistence and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CauseId(pub i64);

impl CauseId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for CauseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CauseId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::str::FromStr for CauseId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}

// =============================================================================
// Entity
// =============================================================================

/// A cause: the single flat record the service manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Cause {
    /// `None` until the store assigns one
    #[serde(default)]
    pub id: Option<CauseId>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Occurrence counter
    #[serde(default)]
    pub frequency: i64,

    /// Accumulated amount
    #[serde(default)]
    pub total: f64,
}

impl Cause {
    /// Create an unsaved cause with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(CauseId(id));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_frequency(mut self, frequency: i64) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_total(mut self, total: f64) -> Self {
        self.total = total;
        self
    }

    /// True until the store has assigned an id.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Copy every mutable field from `other`, leaving the id untouched.
    pub fn apply_changes(&mut self, other: &Cause) {
        self.name = other.name.clone();
        self.description = other.description.clone();
        self.frequency = other.frequency;
        self.total = other.total;
    }
}

// =============================================================================
// Repository Port
// =============================================================================

/// Port for cause persistence.
///
/// Any durable keyed record store satisfies this. Implementations assign ids
/// on `save` for unsaved entities and serialize their own writes.
#[async_trait]
pub trait CauseRepository: Send + Sync {
    /// Fetch every stored cause, in no particular order.
    async fn find_all(&self) -> Result<Vec<Cause>>;

    /// Fetch a cause by id.
    async fn find_by_id(&self, id: CauseId) -> Result<Option<Cause>>;

    /// Insert or replace a cause, returning the stored entity (with its id).
    async fn save(&self, cause: Cause) -> Result<Cause>;

    /// Delete by id. Returns whether an entity was removed.
    async fn delete_by_id(&self, id: CauseId) -> Result<bool>;

    /// Number of stored causes.
    async fn count(&self) -> Result<usize> {
        Ok(self.find_all().await?.len())
    }
}

#[async_trait]
impl<T: CauseRepository + ?Sized> CauseRepository for std::sync::Arc<T> {
    async fn find_all(&self) -> Result<Vec<Cause>> {
        (**self).find_all().await
    }

    async fn find_by_id(&self, id: CauseId) -> Result<Option<Cause>> {
        (**self).find_by_id(id).await
    }

    async fn save(&self, cause: Cause) -> Result<Cause> {
        (**self).save(cause).await
    }

    async fn delete_by_id(&self, id: CauseId) -> Result<bool> {
        (**self).delete_by_id(id).await
    }

    async fn count(&self) -> Result<usize> {
        (**self).count().await
    }
}

// =============================================================================
// Mail Transport Port
// =============================================================================

/// Port for the outbound notification transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a notification about `cause`. Returns whether delivery succeeded.
    async fn deliver(&self, cause: &Cause) -> Result<bool>;
}

// =============================================================================
// Metrics Port
// =============================================================================

/// Port for per-operation invocation counters.
pub trait CounterService: Send + Sync {
    /// Increment the named counter by one.
    fn increment(&self, name: &str);

    /// Current value of the named counter.
    fn count(&self, name: &str) -> u64;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_id_display_and_parse() {
        let id = CauseId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!("42".parse::<CauseId>().unwrap(), id);
        assert!("forty-two".parse::<CauseId>().is_err());
    }

    #[test]
    fn test_new_cause_has_no_id() {
        let cause = Cause::new("drought");
        assert!(cause.is_new());
        assert!(!cause.with_id(1).is_new());
    }

    #[test]
    fn test_apply_changes_keeps_id() {
        let mut stored = Cause::new("old").with_id(3).with_frequency(1);
        let incoming = Cause::new("new")
            .with_id(99)
            .with_description("desc")
            .with_frequency(10)
            .with_total(2.5);

        stored.apply_changes(&incoming);

        assert_eq!(stored.id, Some(CauseId(3)));
        assert_eq!(stored.name, "new");
        assert_eq!(stored.description, "desc");
        assert_eq!(stored.frequency, 10);
        assert_eq!(stored.total, 2.5);
    }

    #[test]
    fn test_cause_json_shape() {
        let cause = Cause::new("flood").with_id(5).with_total(1.5);
        let json = serde_json::to_value(&cause).unwrap();

        assert_eq!(json["id"], 5);
        assert_eq!(json["name"], "flood");
        assert_eq!(json["total"], 1.5);

        let parsed: Cause = serde_json::from_str(r#"{"name":"fire"}"#).unwrap();
        assert!(parsed.id.is_none());
        assert_eq!(parsed.frequency, 0);
        assert_eq!(parsed.description, "");
    }
}
