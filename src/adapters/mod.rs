//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │       CauseRepository │ Mailer │ CounterService             │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ InMemoryCauseRepository │ JsonFileCauseRepository          │ │
//! │  │ SimulatedMailer │ PrometheusCounterService                 │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use causeway::adapters::{InMemoryCauseRepository, SimulatedMailer};
//! use causeway::domain::CauseRepository;
//!
//! let store = InMemoryCauseRepository::new();
//! let saved = store.save(Cause::new("drought")).await?;
//! ```

mod counters;
mod json_file;
mod mailer;
mod memory;
mod seed;

pub use counters::{InMemoryCounterService, PrometheusCounterService};
pub use json_file::JsonFileCauseRepository;
pub use mailer::SimulatedMailer;
pub use memory::InMemoryCauseRepository;
pub use seed::{load_seed_file, seed_repository};
