//! Causeway - Cause CRUD Microservice
//!
//! A small REST service managing "cause" records, with a read-through cache
//! in front of the store, simulated e-mail notifications that can be awaited
//! through a one-shot completion cell, and periodic housekeeping jobs.
//!
//! # Architecture
//!
//! ```text
//! Gateway (hyper) → CauseService → CachingRepository → CauseRepository
//!        │
//!        └─────────→ EmailDispatcher → Mailer ──▶ CompletionCell<bool>
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Infrastructure adapters implementing domain ports
//! - [`batch`] - Scheduled housekeeping jobs
//! - [`cache`] - Read-through cache decorator over a store
//! - [`completion`] - One-shot completion cell with blocking and async waits
//! - [`domain`] - Domain model and ports
//! - [`error`] - Error types
//! - [`gateway`] - HTTP request gateway
//! - [`notify`] - Notification dispatcher
//! - [`service`] - Business operations on causes

pub mod adapters;
pub mod batch;
pub mod cache;
pub mod completion;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod service;

pub use error::{Error, Result};
