//! Causeway
//!
//! CRUD microservice for causes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Causeway                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   Gateway    │───▶│ CauseService │───▶│    Cache     │──▶ store
//! │  │   (hyper)    │    │              │    │ (read-thru)  │       │
//! │  └──────┬───────┘    └──────────────┘    └──────────────┘       │
//! │         └──────────▶ EmailDispatcher ──▶ CompletionCell         │
//! │                                                                 │
//! │  BatchProcessor (count / fixed-rate / fixed-delay jobs)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use causeway::adapters::{
    load_seed_file, seed_repository, InMemoryCauseRepository, JsonFileCauseRepository,
    PrometheusCounterService,
};
use causeway::batch::{BatchConfig, BatchProcessor};
use causeway::error::{Error, Result};
use causeway::gateway::{self, Gateway, GatewayConfig};
use causeway::notify::{DispatcherConfig, EmailDispatcher};
use causeway::service::{CauseService, SharedRepository};

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);
static READY: AtomicBool = AtomicBool::new(false);

// =============================================================================
// CLI Arguments
// =============================================================================

/// Causeway - CRUD microservice for causes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API server bind address
    #[arg(long, env = "CAUSEWAY_API_ADDR", default_value = "0.0.0.0:8080")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "CAUSEWAY_HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "CAUSEWAY_METRICS_ADDR", default_value = "0.0.0.0:9090")]
    metrics_addr: String,

    /// Persist causes to this JSON file (in-memory store if unset)
    #[arg(long, env = "CAUSEWAY_STORE_FILE")]
    store_file: Option<PathBuf>,

    /// JSON or YAML file of causes loaded at startup
    #[arg(long, env = "CAUSEWAY_SEED_FILE")]
    seed_file: Option<PathBuf>,

    /// Simulated e-mail delivery time in seconds
    #[arg(long, env = "CAUSEWAY_SEND_DELAY_SECONDS", default_value = "5")]
    send_delay_seconds: u64,

    /// How long `send?wait=true` waits for delivery, in seconds
    #[arg(long, env = "CAUSEWAY_SEND_WAIT_TIMEOUT_SECONDS", default_value = "30")]
    send_wait_timeout_seconds: u64,

    /// Run the scheduled housekeeping jobs
    #[arg(long, env = "CAUSEWAY_BATCH")]
    batch: bool,

    /// Count job period in seconds (aligned to the wall clock)
    #[arg(long, env = "CAUSEWAY_COUNT_INTERVAL_SECONDS", default_value = "30")]
    count_interval_seconds: u64,

    /// Fixed-rate job period in seconds
    #[arg(long, env = "CAUSEWAY_FIXED_RATE_SECONDS", default_value = "15")]
    fixed_rate_seconds: u64,

    /// Fixed-delay job gap in seconds
    #[arg(long, env = "CAUSEWAY_FIXED_DELAY_SECONDS", default_value = "15")]
    fixed_delay_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    Lazy::force(&START_TIME);

    init_logging(&args)?;

    info!("Starting Causeway");
    info!("  API address: {}", args.api_addr);
    let store_label = args
        .store_file
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "in-memory".to_string());
    info!("  Store: {}", store_label);
    info!("  Send delay: {}s", args.send_delay_seconds);
    info!("  Batch jobs: {}", args.batch);

    // Store
    let store: SharedRepository = match &args.store_file {
        Some(path) => Arc::new(JsonFileCauseRepository::open(path).await?),
        None => Arc::new(InMemoryCauseRepository::new()),
    };

    if let Some(seed_file) = &args.seed_file {
        let causes = load_seed_file(seed_file).await.map_err(|e| {
            error!("Failed to load seed file {}: {}", seed_file.display(), e);
            e
        })?;
        seed_repository(store.as_ref(), causes).await?;
    }

    // Service and dispatcher share the Prometheus counters
    let counters = Arc::new(PrometheusCounterService::new(prometheus::default_registry())?);
    let service = Arc::new(CauseService::new(store, counters.clone()));

    let dispatcher_config = DispatcherConfig {
        send_delay: Duration::from_secs(args.send_delay_seconds),
    };
    let dispatcher = EmailDispatcher::simulated(&dispatcher_config, counters);

    let gateway_config = GatewayConfig {
        send_wait_timeout: Duration::from_secs(args.send_wait_timeout_seconds),
    };
    let mut gateway = Gateway::new(service.clone(), dispatcher, gateway_config);

    let shutdown = CancellationToken::new();

    // Batch jobs
    let batch_handles = if args.batch {
        let batch_config = BatchConfig {
            count_interval: Duration::from_secs(args.count_interval_seconds),
            fixed_rate: Duration::from_secs(args.fixed_rate_seconds),
            fixed_delay: Duration::from_secs(args.fixed_delay_seconds),
            ..Default::default()
        };
        let batch = BatchProcessor::new(batch_config, service).map_err(|e| {
            error!("Invalid batch configuration: {}", e);
            e
        })?;
        gateway = gateway.with_batch(batch.clone());
        batch.spawn_all(&shutdown)
    } else {
        Vec::new()
    };

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Ctrl-C triggers shutdown
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
        }
        signal_token.cancel();
    });

    let listener = gateway::bind(&args.api_addr).await?;
    READY.store(true, Ordering::SeqCst);
    gateway.serve(listener, shutdown.clone()).await?;

    READY.store(false, Ordering::SeqCst);
    shutdown.cancel();
    futures::future::join_all(batch_handles).await;

    info!("Causeway shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("h2=warn")?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

fn directive(raw: &str) -> Result<Directive> {
    raw.parse()
        .map_err(|e| Error::Config(format!("Invalid log directive {}: {}", raw, e)))
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str) -> Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    fn respond(status: StatusCode, body: String) -> Response<Full<Bytes>> {
        let mut resp = Response::new(Full::new(Bytes::from(body)));
        *resp.status_mut() = status;
        resp
    }

    async fn health_handler(
        req: Request<hyper::body::Incoming>,
    ) -> std::result::Result<Response<Full<Bytes>>, std::convert::Infallible> {
        let response = match req.uri().path() {
            "/healthz" | "/livez" => respond(
                StatusCode::OK,
                format!("ok (uptime {}s)", START_TIME.elapsed().as_secs()),
            ),
            "/readyz" if READY.load(Ordering::SeqCst) => respond(StatusCode::OK, "ok".into()),
            "/readyz" => respond(StatusCode::SERVICE_UNAVAILABLE, "not ready".into()),
            _ => respond(StatusCode::NOT_FOUND, "not found".into()),
        };
        Ok(response)
    }

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid health server address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind health server: {}", e)))?;

    info!("Health server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Health server accept error: {}", e)))?;

        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(health_handler))
                .await
            {
                tracing::error!("Health server connection error: {}", e);
            }
        });
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str) -> Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use prometheus::{Encoder, TextEncoder};

    async fn metrics_handler(
        req: Request<hyper::body::Incoming>,
    ) -> std::result::Result<Response<Full<Bytes>>, std::convert::Infallible> {
        let mut response = Response::new(Full::new(Bytes::new()));
        match req.uri().path() {
            "/metrics" => {
                let encoder = TextEncoder::new();
                let metric_families = prometheus::gather();
                let mut buffer = Vec::new();
                match encoder.encode(&metric_families, &mut buffer) {
                    Ok(()) => {
                        if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
                            response.headers_mut().insert(CONTENT_TYPE, content_type);
                        }
                        *response.body_mut() = Full::new(Bytes::from(buffer));
                    }
                    Err(e) => {
                        tracing::error!("Failed to encode metrics: {}", e);
                        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                    }
                }
            }
            _ => {
                *response.status_mut() = StatusCode::NOT_FOUND;
                *response.body_mut() = Full::new(Bytes::from("not found"));
            }
        }
        Ok(response)
    }

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid metrics server address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind metrics server: {}", e)))?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Metrics server accept error: {}", e)))?;

        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(metrics_handler))
                .await
            {
                tracing::error!("Metrics server connection error: {}", e);
            }
        });
    }
}
