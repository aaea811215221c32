//! Service Layer
//!
//! Business operations on causes, composed from a store and the cache.

mod cause_service;

pub use cause_service::{CauseService, SharedRepository};
