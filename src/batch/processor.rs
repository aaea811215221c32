//! Batch Processor
//!
//! Periodic housekeeping jobs over the cause service.
//!
//! # Jobs
//!
//! - **count**: logs how many causes are stored, aligned to wall-clock
//!   multiples of `count_interval` (every 30s by default, on :00 and :30)
//! - **fixed-rate**: simulated work, started every `fixed_rate` measured from
//!   the previous start; a run never overlaps the previous one
//! - **fixed-delay**: simulated work, started `fixed_delay` after the previous
//!   run completed
//!
//! All jobs stop when the shutdown token is cancelled.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::error::{Error, Result};
use crate::service::CauseService;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the batch processor
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Period of the count job (wall-clock aligned)
    pub count_interval: Duration,

    /// Start-to-start period of the fixed-rate job
    pub fixed_rate: Duration,

    /// End-to-start gap of the fixed-delay job
    pub fixed_delay: Duration,

    /// Delay before the first fixed-rate / fixed-delay run
    pub initial_delay: Duration,

    /// Duration of the simulated work in each run
    pub simulated_work: Duration,

    /// Number of run records kept for inspection
    pub history_limit: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            count_interval: Duration::from_secs(30),
            fixed_rate: Duration::from_secs(15),
            fixed_delay: Duration::from_secs(15),
            initial_delay: Duration::from_secs(5),
            simulated_work: Duration::from_secs(5),
            history_limit: 100,
        }
    }
}

impl BatchConfig {
    /// Reject schedules that cannot be run: every period must be non-zero.
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("count_interval", self.count_interval),
            ("fixed_rate", self.fixed_rate),
            ("fixed_delay", self.fixed_delay),
        ];
        for (name, period) in periods {
            if period.is_zero() {
                return Err(Error::Config(format!("Batch {} must be greater than zero", name)));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Run Records
// =============================================================================

/// Which housekeeping job ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobKind {
    Count,
    FixedRate,
    FixedDelay,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Count => write!(f, "count"),
            JobKind::FixedRate => write!(f, "fixed-rate"),
            JobKind::FixedDelay => write!(f, "fixed-delay"),
        }
    }
}

/// One completed job run
#[derive(Debug, Clone, Serialize)]
pub struct JobRunRecord {
    pub job: JobKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Monotonic start, for measuring gaps between runs
    #[serde(skip)]
    pub started: Instant,
    #[serde(skip)]
    pub finished: Instant,
    /// Error message if the run failed
    pub error: Option<String>,
}

// =============================================================================
// Batch Processor
// =============================================================================

/// Runs the periodic housekeeping jobs
pub struct BatchProcessor {
    config: BatchConfig,
    service: Arc<CauseService>,
    history: Mutex<VecDeque<JobRunRecord>>,
}

impl BatchProcessor {
    /// Fails with `Error::Config` when `config` has a zero period.
    pub fn new(config: BatchConfig, service: Arc<CauseService>) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            service,
            history: Mutex::new(VecDeque::new()),
        }))
    }

    /// Completed runs, oldest first
    pub fn history(&self) -> Vec<JobRunRecord> {
        self.history.lock().iter().cloned().collect()
    }

    fn record(&self, record: JobRunRecord) {
        let mut history = self.history.lock();
        history.push_back(record);
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    /// Body of the count job: log the number of stored causes.
    #[instrument(skip(self))]
    pub async fn count_causes(&self) -> Result<usize> {
        info!("> countJob");
        let started_at = Utc::now();
        let started = Instant::now();

        let result = self.service.find_all().await.map(|causes| causes.len());
        if let Ok(count) = &result {
            info!("There are {} causes in the data store", count);
        }
        let stats = self.service.cache_stats();
        info!(
            entries = stats.entries,
            hits = stats.hits,
            misses = stats.misses,
            hit_ratio = stats.hit_ratio,
            "Cause cache statistics"
        );

        self.record(JobRunRecord {
            job: JobKind::Count,
            started_at,
            finished_at: Utc::now(),
            started,
            finished: Instant::now(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });
        info!("< countJob");
        result
    }

    /// Body of the fixed-rate and fixed-delay jobs: bounded simulated work.
    #[instrument(skip(self))]
    pub async fn simulate_work(&self, job: JobKind) {
        info!("> {}", job);
        let started_at = Utc::now();
        let started = Instant::now();

        sleep(self.config.simulated_work).await;

        info!("Processing time was {:?}", started.elapsed());
        self.record(JobRunRecord {
            job,
            started_at,
            finished_at: Utc::now(),
            started,
            finished: Instant::now(),
            error: None,
        });
        info!("< {}", job);
    }

    /// Spawn every job. Each handle finishes after `shutdown` is cancelled.
    pub fn spawn_all(self: &Arc<Self>, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        info!("Starting batch jobs with {:?}", self.config);
        vec![
            self.spawn_count_job(shutdown),
            self.spawn_fixed_rate_job(shutdown),
            self.spawn_fixed_delay_job(shutdown),
        ]
    }

    pub fn spawn_count_job(self: &Arc<Self>, shutdown: &CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { this.run_count_job(shutdown).await })
    }

    pub fn spawn_fixed_rate_job(self: &Arc<Self>, shutdown: &CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { this.run_fixed_rate_job(shutdown).await })
    }

    pub fn spawn_fixed_delay_job(self: &Arc<Self>, shutdown: &CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { this.run_fixed_delay_job(shutdown).await })
    }

    async fn run_count_job(&self, shutdown: CancellationToken) {
        let first = delay_until_aligned(Utc::now(), self.config.count_interval);
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep(first) => {}
        }

        let mut tick = interval(self.config.count_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    if let Err(e) = self.count_causes().await {
                        error!("Count job failed: {}", e);
                    }
                }
            }
        }
        info!("Count job stopped");
    }

    async fn run_fixed_rate_job(&self, shutdown: CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep(self.config.initial_delay) => {}
        }

        let mut tick = interval(self.config.fixed_rate);
        // A run longer than the period pushes the schedule back instead of bursting
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.simulate_work(JobKind::FixedRate) => {}
                    }
                }
            }
        }
        info!("Fixed-rate job stopped");
    }

    async fn run_fixed_delay_job(&self, shutdown: CancellationToken) {
        let mut wait = self.config.initial_delay;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(wait) => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.simulate_work(JobKind::FixedDelay) => {}
            }
            wait = self.config.fixed_delay;
        }
        info!("Fixed-delay job stopped");
    }
}

/// Time from `now` until the next wall-clock multiple of `period`.
pub fn delay_until_aligned(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_ms = period.as_millis().max(1) as i64;
    let into_period = now.timestamp_millis().rem_euclid(period_ms);
    if into_period == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((period_ms - into_period) as u64)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryCauseRepository, InMemoryCounterService};
    use crate::domain::Cause;
    use chrono::TimeZone;

    fn processor(config: BatchConfig, seed: usize) -> Arc<BatchProcessor> {
        let store = Arc::new(InMemoryCauseRepository::with_causes(
            (0..seed).map(|i| Cause::new(format!("c{i}"))),
        )
        .unwrap());
        let service = Arc::new(CauseService::new(
            store,
            Arc::new(InMemoryCounterService::new()),
        ));
        BatchProcessor::new(config, service).unwrap()
    }

    fn runs_of(processor: &BatchProcessor, job: JobKind) -> Vec<JobRunRecord> {
        processor
            .history()
            .into_iter()
            .filter(|r| r.job == job)
            .collect()
    }

    fn test_config() -> BatchConfig {
        BatchConfig {
            count_interval: Duration::from_secs(30),
            fixed_rate: Duration::from_secs(10),
            fixed_delay: Duration::from_secs(10),
            initial_delay: Duration::ZERO,
            simulated_work: Duration::from_secs(4),
            history_limit: 100,
        }
    }

    fn start_offsets(runs: &[JobRunRecord], origin: Instant) -> Vec<u64> {
        runs.iter()
            .map(|r| r.started.duration_since(origin).as_secs())
            .collect()
    }

    #[test]
    fn test_batch_config_default() {
        let config = BatchConfig::default();
        assert_eq!(config.count_interval, Duration::from_secs(30));
        assert_eq!(config.fixed_rate, Duration::from_secs(15));
        assert_eq!(config.fixed_delay, Duration::from_secs(15));
        assert_eq!(config.initial_delay, Duration::from_secs(5));
        assert_eq!(config.simulated_work, Duration::from_secs(5));
    }

    fn zero_period_is_rejected(config: BatchConfig, field: &str) {
        let service = Arc::new(CauseService::new(
            Arc::new(InMemoryCauseRepository::new()),
            Arc::new(InMemoryCounterService::new()),
        ));

        match BatchProcessor::new(config, service) {
            Err(Error::Config(msg)) => assert!(msg.contains(field), "{msg}"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("zero {field} was accepted"),
        }
    }

    #[test]
    fn test_zero_count_interval_is_rejected() {
        zero_period_is_rejected(
            BatchConfig {
                count_interval: Duration::ZERO,
                ..test_config()
            },
            "count_interval",
        );
    }

    #[test]
    fn test_zero_fixed_rate_is_rejected() {
        zero_period_is_rejected(
            BatchConfig {
                fixed_rate: Duration::ZERO,
                initial_delay: Duration::ZERO,
                ..test_config()
            },
            "fixed_rate",
        );
    }

    #[test]
    fn test_zero_fixed_delay_is_rejected() {
        zero_period_is_rejected(
            BatchConfig {
                fixed_delay: Duration::ZERO,
                ..test_config()
            },
            "fixed_delay",
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(BatchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_job_kind_display() {
        assert_eq!(JobKind::Count.to_string(), "count");
        assert_eq!(JobKind::FixedRate.to_string(), "fixed-rate");
        assert_eq!(JobKind::FixedDelay.to_string(), "fixed-delay");
    }

    #[test]
    fn test_delay_until_aligned() {
        let period = Duration::from_secs(30);

        let on_mark = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 30).unwrap();
        assert_eq!(delay_until_aligned(on_mark, period), Duration::ZERO);

        let mid = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 12).unwrap();
        assert_eq!(delay_until_aligned(mid, period), Duration::from_secs(18));

        let late = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 59).unwrap();
        assert_eq!(delay_until_aligned(late, period), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_count_causes() {
        let processor = processor(test_config(), 15);

        assert_eq!(processor.count_causes().await.unwrap(), 15);

        let runs = runs_of(&processor, JobKind::Count);
        assert_eq!(runs.len(), 1);
        assert!(runs[0].error.is_none());
        assert!(runs[0].finished_at >= runs[0].started_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_rate_measures_from_previous_start() {
        let processor = processor(test_config(), 0);
        let shutdown = CancellationToken::new();
        let origin = Instant::now();

        let handle = processor.spawn_fixed_rate_job(&shutdown);
        sleep(Duration::from_secs(35)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let runs = runs_of(&processor, JobKind::FixedRate);
        assert_eq!(start_offsets(&runs, origin), vec![0, 10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_measures_from_previous_completion() {
        let processor = processor(test_config(), 0);
        let shutdown = CancellationToken::new();
        let origin = Instant::now();

        let handle = processor.spawn_fixed_delay_job(&shutdown);
        sleep(Duration::from_secs(35)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let runs = runs_of(&processor, JobKind::FixedDelay);
        assert_eq!(start_offsets(&runs, origin), vec![0, 14, 28]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fixed_rate_runs_never_overlap() {
        let config = BatchConfig {
            simulated_work: Duration::from_secs(15),
            ..test_config()
        };
        let processor = processor(config, 0);
        let shutdown = CancellationToken::new();

        let handle = processor.spawn_fixed_rate_job(&shutdown);
        sleep(Duration::from_secs(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let runs = runs_of(&processor, JobKind::FixedRate);
        assert!(runs.len() >= 2);
        for pair in runs.windows(2) {
            assert!(pair[1].started >= pair[0].finished);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_all_jobs() {
        let processor = processor(test_config(), 1);
        let shutdown = CancellationToken::new();

        let handles = processor.spawn_all(&shutdown);
        sleep(Duration::from_secs(1)).await;
        shutdown.cancel();

        for result in futures::future::join_all(handles).await {
            result.unwrap();
        }
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let config = BatchConfig {
            history_limit: 2,
            ..test_config()
        };
        let processor = processor(config, 3);

        for _ in 0..5 {
            processor.count_causes().await.unwrap();
        }

        assert_eq!(processor.history().len(), 2);
    }
}
