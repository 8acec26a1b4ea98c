//! ---
//! sfb_section: "03-persistence-logging"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Store port and adapters for telemetry history and alerts."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use prometheus::{self, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use crate::model::StoreOp;
use crate::Result;

/// Metrics published by the store layer.
#[derive(Clone)]
pub struct StoreMetrics {
    operations: IntCounterVec,
    failures: IntCounterVec,
    latency: HistogramVec,
    #[allow(dead_code)]
    registry: Arc<Registry>,
}

impl StoreMetrics {
    /// Register all store metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> Result<Self> {
        let operations = IntCounterVec::new(
            Opts::new(
                "sfb_store_operations_total",
                "Total number of store operations attempted",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(operations.clone()))?;

        let failures = IntCounterVec::new(
            Opts::new(
                "sfb_store_failures_total",
                "Total number of store operations that failed",
            ),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(failures.clone()))?;

        let histogram_opts = HistogramOpts::new(
            "sfb_store_latency_seconds",
            "Latency of store operations",
        )
        .buckets(prometheus::exponential_buckets(0.0005, 2.0, 14)?);
        let latency = HistogramVec::new(histogram_opts, &["operation"])?;
        registry.register(Box::new(latency.clone()))?;

        Ok(Self {
            operations,
            failures,
            latency,
            registry,
        })
    }

    /// Record one completed operation.
    pub fn observe(&self, op: StoreOp, elapsed: Duration) {
        self.operations.with_label_values(&[op.as_str()]).inc();
        self.latency
            .with_label_values(&[op.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    /// Record a failed operation.
    pub fn record_failure(&self, op: StoreOp, kind: &str) {
        self.failures.with_label_values(&[op.as_str(), kind]).inc();
    }
}
