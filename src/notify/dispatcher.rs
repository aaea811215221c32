//! Email Dispatcher
//!
//! Sends one notification per cause through the `Mailer` port, in three
//! flavours:
//!
//! - [`EmailDispatcher::send`] awaits the delivery and propagates errors
//! - [`EmailDispatcher::send_detached`] runs it on another task and only logs errors
//! - [`EmailDispatcher::send_with_completion`] runs it on another task and
//!   reports through a [`CompletionCell`]
//!
//! The detached variants call `tokio::spawn` and must run inside a runtime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::adapters::SimulatedMailer;
use crate::completion::CompletionCell;
use crate::domain::{Cause, CounterService, Mailer};
use crate::error::Result;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Simulated network latency per send
    pub send_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            send_delay: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Outbound notification dispatcher
#[derive(Clone)]
pub struct EmailDispatcher {
    mailer: Arc<dyn Mailer>,
    counters: Arc<dyn CounterService>,
}

impl std::fmt::Debug for EmailDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailDispatcher").finish_non_exhaustive()
    }
}

impl EmailDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, counters: Arc<dyn CounterService>) -> Self {
        Self { mailer, counters }
    }

    /// Dispatcher backed by a [`SimulatedMailer`] using `config.send_delay`
    pub fn simulated(config: &DispatcherConfig, counters: Arc<dyn CounterService>) -> Self {
        Self::new(Arc::new(SimulatedMailer::new(config.send_delay)), counters)
    }

    /// Deliver a notification for `cause` and wait for the outcome.
    #[instrument(skip_all, fields(cause = ?cause.id))]
    pub async fn send(&self, cause: &Cause) -> Result<bool> {
        info!("> send");
        self.counters.increment("notify.send");

        let start = Instant::now();
        let sent = self.mailer.deliver(cause).await?;

        info!(sent, "Processing time was {:?}", start.elapsed());
        info!("< send");
        Ok(sent)
    }

    /// Fire-and-forget send. Errors are logged and dropped.
    pub fn send_detached(&self, cause: Cause) -> JoinHandle<()> {
        self.counters.increment("notify.send_detached");

        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.send(&cause).await {
                warn!(cause = ?cause.id, error = %e, "Detached notification failed");
            }
        })
    }

    /// Start a send on another task and return its completion cell at once.
    pub fn send_with_completion(&self, cause: Cause) -> Arc<CompletionCell<bool>> {
        self.counters.increment("notify.send_with_completion");

        let cell = Arc::new(CompletionCell::new());
        let producer = Arc::clone(&cell);
        let dispatcher = self.clone();

        tokio::spawn(async move {
            let settled = match dispatcher.send(&cause).await {
                Ok(sent) => producer.complete(sent),
                Err(e) => {
                    warn!(cause = ?cause.id, error = %e, "Notification failed");
                    producer.complete_exceptionally(e)
                }
            };
            if !settled {
                debug!(cause = ?cause.id, "Completion cell already settled, result discarded");
            }
        });

        cell
    }
}

// =============================================================================
// Tests
// =============================================================================
