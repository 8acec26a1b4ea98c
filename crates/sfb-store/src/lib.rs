//! ---
//! sfb_section: "03-persistence-logging"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Store port and adapters for telemetry history and alerts."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Persistence port for the bridge.
//!
//! The alert engine and the ingest pipeline only talk to [`BridgeStore`].
//! Adapters: [`MemoryStore`] for development and tests, [`PostgrestStore`]
//! for a Supabase/PostgREST backend, and [`InstrumentedStore`] which wraps
//! either with Prometheus timings.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use sfb_telemetry::FactoryId;

pub mod instrumented;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod postgrest;

/// Result alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An open alert already exists for the key (uniqueness backstop).
    #[error("an open alert already exists for {0}")]
    Conflict(AlertKey),
    /// The targeted alert does not exist or is no longer mutable.
    #[error("alert {0} not found or already resolved")]
    NotFound(AlertId),
    /// The backend answered with a non-success status.
    #[error("store returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The backend returned rows that could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    /// The configured endpoint is not a valid URL.
    #[error("invalid store url: {0}")]
    Url(#[from] url::ParseError),
    /// Wrapper for Prometheus registration failures.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    /// The store is unreachable or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether this error is the uniqueness backstop firing.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Short label used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Conflict(_) => "conflict",
            StoreError::NotFound(_) => "not_found",
            StoreError::Http { .. } => "http",
            StoreError::Transport(_) => "transport",
            StoreError::Decode(_) => "decode",
            StoreError::Url(_) => "url",
            StoreError::Metrics(_) => "metrics",
            StoreError::Unavailable(_) => "unavailable",
        }
    }
}

/// Operations exposed by the store port.
#[async_trait]
pub trait BridgeStore: Send + Sync {
    /// Append one telemetry history row.
    async fn insert_telemetry(&self, row: &NewTelemetry) -> Result<TelemetryRow>;

    /// Record that data was received for a factory.
    async fn touch_factory(&self, factory: FactoryId, at: DateTime<Utc>) -> Result<()>;

    /// Insert a new open alert. Fails with [`StoreError::Conflict`] when the
    /// backend enforces open-alert uniqueness and the key already has one.
    async fn insert_alert(&self, alert: &NewAlert) -> Result<Alert>;

    /// The open alert for a key, if any.
    async fn find_open_alert(&self, key: &AlertKey) -> Result<Option<Alert>>;

    /// Refresh an open alert's message and `updated_at`.
    async fn update_alert(&self, id: AlertId, message: &str, at: DateTime<Utc>) -> Result<Alert>;

    /// Close an open alert.
    async fn resolve_alert(&self, id: AlertId, at: DateTime<Utc>) -> Result<Alert>;

    /// Alerts matching the filter, newest first.
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>>;

    /// Mark an alert as seen by an operator. Does not resolve it.
    async fn acknowledge_alert(&self, id: AlertId, at: DateTime<Utc>) -> Result<Alert>;
}

/// Shared, dynamically dispatched store handle.
pub type SharedStore = Arc<dyn BridgeStore>;

pub use instrumented::InstrumentedStore;
pub use memory::MemoryStore;
pub use metrics::StoreMetrics;
pub use model::{
    Alert, AlertFilter, AlertId, AlertKey, AlertType, NewAlert, NewTelemetry, Severity, StoreOp,
    TelemetryRow,
};
pub use postgrest::{PostgrestStore, PostgrestTables};
