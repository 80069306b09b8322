//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the relay.
//!
//! # Metrics
//!
//! - `bridge_mints_submitted_total` - Mint instructions accepted by Planetmint
//! - `bridge_duplicates_evicted_total` - Requests evicted because the mint already exists
//! - `bridge_stale_evicted_total` - Requests evicted by age
//! - `bridge_ambiguous_deposits_total` - Passes that met an unattributable deposit
//! - `bridge_gateway_errors_total` - Gateway failures by operation
//! - `bridge_reconciliation_pass_seconds` - Duration of reconciliation passes
//! - `bridge_pending_requests` - Store size estimate

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Mint instructions submitted
    pub mints_submitted: IntCounter,

    /// Entries evicted as already minted
    pub duplicates_evicted: IntCounter,

    /// Entries evicted by age
    pub stale_evicted: IntCounter,

    /// Ambiguous deposits seen
    pub ambiguous_deposits: IntCounter,

    /// Gateway errors by operation
    pub gateway_errors: IntCounterVec,

    /// Reconciliation pass duration
    pub pass_duration: Histogram,

    /// Pending request count
    pub pending_requests: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let mints_submitted = IntCounter::new(
            "bridge_mints_submitted_total",
            "Mint instructions accepted by the destination gateway",
        )?;
        registry.register(Box::new(mints_submitted.clone()))?;

        let duplicates_evicted = IntCounter::new(
            "bridge_duplicates_evicted_total",
            "Requests evicted because a mint record already exists",
        )?;
        registry.register(Box::new(duplicates_evicted.clone()))?;

        let stale_evicted = IntCounter::new(
            "bridge_stale_evicted_total",
            "Requests evicted after the eviction horizon",
        )?;
        registry.register(Box::new(stale_evicted.clone()))?;

        let ambiguous_deposits = IntCounter::new(
            "bridge_ambiguous_deposits_total",
            "Deposits that cannot be attributed to a single transaction",
        )?;
        registry.register(Box::new(ambiguous_deposits.clone()))?;

        let gateway_errors = IntCounterVec::new(
            Opts::new("bridge_gateway_errors_total", "Ledger gateway failures"),
            &["operation"],
        )?;
        registry.register(Box::new(gateway_errors.clone()))?;

        let pass_duration = Histogram::with_opts(
            HistogramOpts::new(
                "bridge_reconciliation_pass_seconds",
                "Duration of reconciliation passes",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
        )?;
        registry.register(Box::new(pass_duration.clone()))?;

        let pending_requests =
            IntGauge::new("bridge_pending_requests", "Pending conversion requests")?;
        registry.register(Box::new(pending_requests.clone()))?;

        Ok(Self {
            mints_submitted,
            duplicates_evicted,
            stale_evicted,
            ambiguous_deposits,
            gateway_errors,
            pass_duration,
            pending_requests,
            registry,
        })
    }

    /// Record a gateway failure
    pub fn record_gateway_error(&self, operation: &str) {
        self.gateway_errors.with_label_values(&[operation]).inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of all metrics
    pub fn export(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.mints_submitted.get(), 0);
        assert_eq!(metrics.stale_evicted.get(), 0);

        // Independent registries: a second collector does not collide
        let other = Metrics::new().unwrap();
        other.mints_submitted.inc();
        assert_eq!(metrics.mints_submitted.get(), 0);
    }

    #[test]
    fn test_export_contains_gateway_errors() {
        let metrics = Metrics::new().unwrap();
        metrics.record_gateway_error("list_receipts");
        metrics.record_gateway_error("list_receipts");

        let text = metrics.export().unwrap();
        assert!(text.contains("bridge_gateway_errors_total{operation=\"list_receipts\"} 2"));
    }
}
