//! Domain Layer
//!
//! The cause entity and the ports the service depends on.
//!
//! # Usage
//!
//! ```ignore
//! use causeway::domain::{Cause, CauseRepository};
//!
//! async fn rename<R: CauseRepository>(repo: &R, mut cause: Cause) -> Result<Cause> {
//!     cause.name = "renamed".to_string();
//!     repo.save(cause).await
//! }
//! ```

pub mod ports;

pub use ports::{Cause, CauseId, CauseRepository, CounterService, Mailer};
