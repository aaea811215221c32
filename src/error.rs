//! Error types for the Causeway service

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Causeway service
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Entity Errors
    // =========================================================================
    /// Request violates an entity invariant (e.g. create with a preset id)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity does not exist
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Persistent store failure
    #[error("Store error: {0}")]
    Store(String),

    // =========================================================================
    // Notification / Completion Errors
    // =========================================================================
    /// Outbound notification failed
    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    /// Waiting on a completion cell exceeded its deadline
    #[error("Timed out after {0:?} waiting for completion")]
    Timeout(Duration),

    /// Waited on a cancelled completion cell
    #[error("Operation was cancelled")]
    Cancelled,

    /// The producer of a completion cell failed; the cause is shared by every waiter
    #[error("Asynchronous operation failed: {0}")]
    Execution(#[source] Arc<Error>),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Innermost error behind any `Execution` wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Execution(inner) => inner.root_cause(),
            other => other,
        }
    }
}
