//! Counter Adapters
//!
//! Implements the `CounterService` port with a Prometheus backend for the
//! running service and an in-memory backend for tests.

use dashmap::DashMap;
use prometheus::{IntCounterVec, Opts, Registry};

use crate::domain::CounterService;
use crate::error::Result;

/// Prometheus-backed invocation counters.
///
/// Every counter name becomes a `method` label on
/// `causeway_method_invoked_total`.
#[derive(Clone)]
pub struct PrometheusCounterService {
    invocations: IntCounterVec,
}

impl PrometheusCounterService {
    /// Create the counter family and register it with `registry`.
    pub fn new(registry: &Registry) -> Result<Self> {
        let invocations = IntCounterVec::new(
            Opts::new(
                "causeway_method_invoked_total",
                "Total number of service method invocations",
            ),
            &["method"],
        )?;
        registry.register(Box::new(invocations.clone()))?;

        Ok(Self { invocations })
    }
}

impl std::fmt::Debug for PrometheusCounterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusCounterService").finish()
    }
}

impl CounterService for PrometheusCounterService {
    fn increment(&self, name: &str) {
        self.invocations.with_label_values(&[name]).inc();
    }

    fn count(&self, name: &str) -> u64 {
        self.invocations.with_label_values(&[name]).get()
    }
}

/// In-memory counters for testing.
#[derive(Debug, Default)]
pub struct InMemoryCounterService {
    counters: DashMap<String, u64>,
}

impl InMemoryCounterService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every counter name with its value, sorted by name
    pub fn all(&self) -> Vec<(String, u64)> {
        let mut all: Vec<_> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        all.sort();
        all
    }
}

impl CounterService for InMemoryCounterService {
    fn increment(&self, name: &str) {
        *self.counters.entry(name.to_string()).or_insert(0) += 1;
    }

    fn count(&self, name: &str) -> u64 {
        self.counters.get(name).map(|c| *c).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn test_prometheus_counters() {
        let registry = Registry::new();
        let counters = PrometheusCounterService::new(&registry).unwrap();

        counters.increment("method.invoked.CauseService.findAll");
        counters.increment("method.invoked.CauseService.findAll");
        counters.increment("method.invoked.CauseService.create");

        assert_eq!(counters.count("method.invoked.CauseService.findAll"), 2);
        assert_eq!(counters.count("method.invoked.CauseService.create"), 1);

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains(
            r#"causeway_method_invoked_total{method="method.invoked.CauseService.findAll"} 2"#
        ));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        PrometheusCounterService::new(&registry).unwrap();

        assert!(PrometheusCounterService::new(&registry).is_err());
    }

    #[test]
    fn test_in_memory_counters() {
        let counters = InMemoryCounterService::new();

        counters.increment("b");
        counters.increment("a");
        counters.increment("b");

        assert_eq!(counters.count("b"), 2);
        assert_eq!(counters.count("missing"), 0);
        assert_eq!(
            counters.all(),
            vec![("a".to_string(), 1), ("b".to_string(), 2)]
        );
    }
}
