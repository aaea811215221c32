//! Notification module
//!
//! Simulated outbound e-mail about causes.

mod dispatcher;

pub use dispatcher::{DispatcherConfig, EmailDispatcher};
