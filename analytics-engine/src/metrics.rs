//! Metrics collection for observability
//!
//! Prometheus metrics for the analytics engine, kept in a registry owned by
//! each [`Metrics`] instance.
//!
//! # Metrics
//!
//! - `analytics_requests_total` - Requests per operation
//! - `analytics_failures_total` - Failed requests per operation and error kind
//! - `analytics_operation_duration_seconds` - Latency per operation
//! - `analytics_outliers_total` - Transactions flagged as outliers
//! - `analytics_cycles_detected_total` - Ownership loops found

use crate::ErrorKind;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Requests per operation
    pub requests_total: IntCounterVec,

    /// Failures per operation and error kind
    pub failures_total: IntCounterVec,

    /// Operation latency histogram
    pub operation_duration: HistogramVec,

    /// Outliers flagged
    pub outliers_total: IntCounter,

    /// Ownership cycles found
    pub cycles_detected: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = IntCounterVec::new(
            Opts::new("analytics_requests_total", "Requests per operation"),
            &["operation"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let failures_total = IntCounterVec::new(
            Opts::new(
                "analytics_failures_total",
                "Failed requests per operation and error kind",
            ),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(failures_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "analytics_operation_duration_seconds",
                "Latency per operation",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let outliers_total = IntCounter::new(
            "analytics_outliers_total",
            "Transactions flagged as outliers",
        )?;
        registry.register(Box::new(outliers_total.clone()))?;

        let cycles_detected = IntCounter::new(
            "analytics_cycles_detected_total",
            "Ownership loops found during traversal",
        )?;
        registry.register(Box::new(cycles_detected.clone()))?;

        Ok(Self {
            requests_total,
            failures_total,
            operation_duration,
            outliers_total,
            cycles_detected,
            registry,
        })
    }

    /// Record a request
    pub fn record_request(&self, operation: &str) {
        self.requests_total.with_label_values(&[operation]).inc();
    }

    /// Record a failed request
    pub fn record_failure(&self, operation: &str, kind: ErrorKind) {
        self.failures_total
            .with_label_values(&[operation, kind.as_str()])
            .inc();
    }

    /// Record operation latency
    pub fn record_duration(&self, operation: &str, duration_seconds: f64) {
        self.operation_duration
            .with_label_values(&[operation])
            .observe(duration_seconds);
    }

    /// Record flagged outliers
    pub fn record_outliers(&self, count: usize) {
        self.outliers_total.inc_by(count as u64);
    }

    /// Record ownership cycles
    pub fn record_cycles(&self, count: usize) {
        self.cycles_detected.inc_by(count as u64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
