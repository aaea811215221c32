//! Entity Cache
//!
//! In-process read-through cache sitting in front of the cause store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │             CachingRepository<R>              │
//! │  ┌───────────────────┐  ┌──────────────────┐  │
//! │  │ DashMap<Id,Cause> │  │ per-key Mutex    │  │
//! │  │   (snapshots)     │  │ (populate/write) │  │
//! │  └───────────────────┘  └──────────────────┘  │
//! └──────────────────────┬───────────────────────┘
//!                        │ miss / write-through
//!                        ▼
//!              CauseRepository (store)
//! ```

mod repository;
mod stats;

pub use repository::CachingRepository;
pub use stats::{CacheStats, CacheStatsSnapshot};
