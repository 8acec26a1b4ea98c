//! ---
//! sfb_section: "03-persistence-logging"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Store port and adapters for telemetry history and alerts."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use sfb_telemetry::FactoryId;

use crate::metrics::StoreMetrics;
use crate::model::{Alert, AlertFilter, AlertId, AlertKey, NewAlert, NewTelemetry, StoreOp, TelemetryRow};
use crate::{BridgeStore, Result, SharedStore};

/// Store wrapper recording latency and failures of every operation.
pub struct InstrumentedStore {
    inner: SharedStore,
    metrics: StoreMetrics,
}

impl InstrumentedStore {
    /// Wrap `inner`.
    pub fn new(inner: SharedStore, metrics: StoreMetrics) -> Self {
        Self { inner, metrics }
    }

    async fn timed<T, F>(&self, op: StoreOp, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = call.await;
        self.metrics.observe(op, started.elapsed());
        if let Err(err) = &result {
            // Conflicts are resolved by the caller.
            if !err.is_conflict() {
                warn!(operation = op.as_str(), error = %err, "store operation failed");
            }
            self.metrics.record_failure(op, err.kind());
        }
        result
    }
}

#[async_trait]
impl BridgeStore for InstrumentedStore {
    async fn insert_telemetry(&self, row: &NewTelemetry) -> Result<TelemetryRow> {
        self.timed(StoreOp::InsertTelemetry, self.inner.insert_telemetry(row))
            .await
    }

    async fn touch_factory(&self, factory: FactoryId, at: DateTime<Utc>) -> Result<()> {
        self.timed(StoreOp::TouchFactory, self.inner.touch_factory(factory, at))
            .await
    }

    async fn insert_alert(&self, alert: &NewAlert) -> Result<Alert> {
        self.timed(StoreOp::InsertAlert, self.inner.insert_alert(alert))
            .await
    }

    async fn find_open_alert(&self, key: &AlertKey) -> Result<Option<Alert>> {
        self.timed(StoreOp::FindOpenAlert, self.inner.find_open_alert(key))
            .await
    }

    async fn update_alert(&self, id: AlertId, message: &str, at: DateTime<Utc>) -> Result<Alert> {
        self.timed(StoreOp::UpdateAlert, self.inner.update_alert(id, message, at))
            .await
    }

    async fn resolve_alert(&self, id: AlertId, at: DateTime<Utc>) -> Result<Alert> {
        self.timed(StoreOp::ResolveAlert, self.inner.resolve_alert(id, at))
            .await
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        self.timed(StoreOp::ListAlerts, self.inner.list_alerts(filter))
            .await
    }

    async fn acknowledge_alert(&self, id: AlertId, at: DateTime<Utc>) -> Result<Alert> {
        self.timed(StoreOp::AcknowledgeAlert, self.inner.acknowledge_alert(id, at))
            .await
    }
}
