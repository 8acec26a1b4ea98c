//! ---
//! sfb_section: "01-core-functionality"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Ingest pipeline and runtime wiring."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;

use sfb_alerts::{AlertLifecycleEngine, EvaluationReport};
use sfb_logging::{sfb_error, sfb_info, sfb_warn, LogContext};
use sfb_metrics::BridgeMetrics;
use sfb_store::{NewTelemetry, SharedStore, StoreError, TelemetryRow};
use sfb_telemetry::{CanonicalRecord, Normalizer, ValidationError};

/// Result alias for pipeline calls.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Why a record was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The payload was refused; nothing was persisted.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The telemetry write failed; alert evaluation was skipped.
    #[error("telemetry write failed: {0}")]
    Store(#[source] StoreError),
    /// The detached ingest task panicked or was cancelled by the runtime.
    #[error("ingest task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    /// Label used for the rejection metric.
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::Validation(err) => err.reason(),
            PipelineError::Store(_) => "store_error",
            PipelineError::Aborted(_) => "aborted",
        }
    }
}

/// Result of one accepted record.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub record: CanonicalRecord,
    pub telemetry: TelemetryRow,
    pub report: EvaluationReport,
}

/// Normalizer, telemetry write, factory heartbeat and alert engine, in that
/// order, for one record at a time.
pub struct IngestPipeline {
    normalizer: Normalizer,
    store: SharedStore,
    engine: Arc<AlertLifecycleEngine>,
    metrics: Option<BridgeMetrics>,
}

impl IngestPipeline {
    pub fn new(normalizer: Normalizer, store: SharedStore, engine: AlertLifecycleEngine) -> Self {
        Self {
            normalizer,
            store,
            engine: Arc::new(engine),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<BridgeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn engine(&self) -> &Arc<AlertLifecycleEngine> {
        &self.engine
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Ingest a raw request body captured at `received_at`.
    pub async fn ingest_bytes(&self, body: &[u8], received_at: DateTime<Utc>) -> Result<IngestOutcome> {
        let started = Instant::now();
        let result = match self.normalizer.normalize_bytes(body, received_at) {
            Ok(record) => self.accept(record).await,
            Err(err) => Err(err.into()),
        };
        self.observe(&result, started);
        result
    }

    /// Ingest a raw body on a detached task and wait for it.
    ///
    /// Dropping the returned future (a client hanging up) does not cancel the
    /// record: the telemetry write and the alert transitions it reserved run
    /// to completion under the key locks.
    pub async fn submit(self: &Arc<Self>, body: Vec<u8>, received_at: DateTime<Utc>) -> Result<IngestOutcome> {
        let pipeline = Arc::clone(self);
        let task = tokio::spawn(async move { pipeline.ingest_bytes(&body, received_at).await });
        match task.await {
            Ok(result) => result,
            Err(err) => {
                sfb_error!("ingest task aborted: {}", err);
                Err(PipelineError::Aborted(err.to_string()))
            }
        }
    }

    /// Ingest an already parsed payload captured at `received_at`.
    pub async fn ingest(&self, payload: &Value, received_at: DateTime<Utc>) -> Result<IngestOutcome> {
        let started = Instant::now();
        let result = match self.normalizer.normalize(payload, received_at) {
            Ok(record) => self.accept(record).await,
            Err(err) => Err(err.into()),
        };
        self.observe(&result, started);
        result
    }

    async fn accept(&self, record: CanonicalRecord) -> Result<IngestOutcome> {
        // Keys are reserved before the first write so that per-key
        // processing follows arrival order.
        let reservation = self.engine.reserve(&record).await;
        let system = record.system();
        let context = LogContext::new()
            .with_factory(record.factory_id.get())
            .with_system(system.as_str())
            .with_device(&record.device_identity);

        let telemetry = self
            .store
            .insert_telemetry(&NewTelemetry::from(&record))
            .await
            .map_err(PipelineError::Store)?;

        if let Err(err) = self.store.touch_factory(record.factory_id, Utc::now()).await {
            sfb_warn!(context = context, "failed to update last_data_received: {}", err);
        }

        let report = self.engine.apply(&reservation, &record).await;
        drop(reservation);

        sfb_info!(
            context = context,
            "telemetry accepted (row {}, {} alert keys, {} failed)",
            telemetry.id,
            report.outcomes.len(),
            report.failures()
        );
        Ok(IngestOutcome {
            record,
            telemetry,
            report,
        })
    }

    fn observe(&self, result: &Result<IngestOutcome>, started: Instant) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        match result {
            Ok(outcome) => {
                metrics.record_accepted(outcome.record.factory_id.get(), outcome.record.system().as_str());
                for key in &outcome.report.outcomes {
                    metrics.record_transition(key.key.alert_type.as_str(), key.transition.as_str());
                }
                metrics.observe_ingest("accepted", started.elapsed());
            }
            Err(err) => {
                metrics.record_rejected(err.reason());
                let outcome = match err {
                    PipelineError::Validation(_) => "rejected",
                    PipelineError::Store(_) => "store_error",
                    PipelineError::Aborted(_) => "aborted",
                };
                metrics.observe_ingest(outcome, started.elapsed());
            }
        }
    }
}
