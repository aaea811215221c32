//! Request Gateway
//!
//! REST surface over the cause service, served with hyper.
//!
//! # Architecture
//!
//! ```text
//!   TcpListener ──accept──▶ per-connection task ──▶ Gateway::handle
//!                                                     │
//!                              ┌──────────────────────┴─────────────┐
//!                              ▼                                    ▼
//!                        CauseService                        EmailDispatcher
//!                    (CachingRepository)                  (CompletionCell<bool>)
//! ```

mod router;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::batch::BatchProcessor;
use crate::error::{Error, Result};
use crate::notify::EmailDispatcher;
use crate::service::CauseService;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// How long `send?wait=true` waits for the notification outcome
    pub send_wait_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            send_wait_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// HTTP front door. Cheap to clone; one clone per connection.
#[derive(Clone)]
pub struct Gateway {
    service: Arc<CauseService>,
    dispatcher: EmailDispatcher,
    config: GatewayConfig,
    batch: Option<Arc<BatchProcessor>>,
}

impl Gateway {
    pub fn new(service: Arc<CauseService>, dispatcher: EmailDispatcher, config: GatewayConfig) -> Self {
        Self {
            service,
            dispatcher,
            config,
            batch: None,
        }
    }

    /// Expose the run history of `batch` on `GET /api/jobs`.
    pub fn with_batch(mut self, batch: Arc<BatchProcessor>) -> Self {
        self.batch = Some(batch);
        self
    }

    pub fn service(&self) -> &Arc<CauseService> {
        &self.service
    }

    /// Accept connections on `listener` until `shutdown` is cancelled.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("API server listening on {}", addr);

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("API server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => accepted
                    .map_err(|e| Error::Internal(format!("API server accept error: {}", e)))?,
            };

            let io = TokioIo::new(stream);
            let gateway = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let gateway = gateway.clone();
                    async move { Ok::<_, Infallible>(gateway.handle(req).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!(peer = %peer, "API server connection error: {}", e);
                }
            });
        }
    }
}

/// Bind a listener for [`Gateway::serve`].
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid API server address {}: {}", addr, e)))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind API server: {}", e)))
}
