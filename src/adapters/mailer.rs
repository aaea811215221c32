//! Simulated Mail Transport
//!
//! Implements the `Mailer` port without any network: each delivery just
//! takes `delay` to complete and reports success.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{Cause, Mailer};
use crate::error::Result;

/// Mailer that simulates a slow outbound send
#[derive(Debug)]
pub struct SimulatedMailer {
    delay: Duration,
    delivered: AtomicU64,
}

impl SimulatedMailer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            delivered: AtomicU64::new(0),
        }
    }

    /// Number of completed deliveries
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Default for SimulatedMailer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Mailer for SimulatedMailer {
    async fn deliver(&self, cause: &Cause) -> Result<bool> {
        debug!(cause = ?cause.id, delay = ?self.delay, "Simulating mail delivery");
        tokio::time::sleep(self.delay).await;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }
}
