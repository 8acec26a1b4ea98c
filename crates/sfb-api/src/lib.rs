//! ---
//! sfb_section: "05-networking-external-interfaces"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "HTTP ingress and read-side API."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sfb_core::{IngestOutcome, IngestPipeline, PipelineError};
use sfb_metrics::SharedRegistry;
use sfb_store::{Alert, AlertFilter, AlertId, StoreError};
use sfb_telemetry::{FactoryId, ValidationError};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state handed to every handler.
pub struct ApiState {
    pipeline: Arc<IngestPipeline>,
    registry: Option<SharedRegistry>,
    version: String,
    start: Instant,
}

impl ApiState {
    pub fn new(pipeline: Arc<IngestPipeline>, registry: Option<SharedRegistry>) -> Self {
        Self {
            pipeline,
            registry,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start: Instant::now(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok",
            version: self.version.clone(),
            uptime_seconds: self.start.elapsed().as_secs(),
            mapped_devices: self.pipeline.normalizer().identities().len(),
        }
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("version", &self.version)
            .field("metrics", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle to the running ingress server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// Bound address (resolved when the configured port was 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Routes served by the bridge.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", post(post_telemetry))
        .route("/telemetry", post(post_telemetry))
        .route("/health", get(get_health))
        .route("/alerts", get(get_alerts))
        .route("/alerts/:id/acknowledge", post(post_acknowledge))
        .route("/metrics", get(get_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the ingress server.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let router = router(state);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;
    let bound = tcp_listener
        .local_addr()
        .context("failed to read API listener address")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %bound, "ingress listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %bound, error = %err, "ingress exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: String,
    uptime_seconds: u64,
    mapped_devices: usize,
}

#[derive(Debug, Serialize)]
struct AlertSummary {
    alert_type: &'static str,
    transition: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert_id: Option<AlertId>,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    status: &'static str,
    factory_id: FactoryId,
    system: String,
    timestamp: DateTime<Utc>,
    telemetry_id: i64,
    alerts: Vec<AlertSummary>,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        let alerts = outcome
            .report
            .outcomes
            .iter()
            .map(|key| AlertSummary {
                alert_type: key.key.alert_type.as_str(),
                transition: key.transition.as_str(),
                alert_id: key.alert_id,
            })
            .collect();
        Self {
            status: "success",
            factory_id: outcome.record.factory_id,
            system: outcome.record.system().to_string(),
            timestamp: outcome.record.timestamp,
            telemetry_id: outcome.telemetry.id,
            alerts,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            status: "error",
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::Validation(ValidationError::Malformed(_))
            | PipelineError::Validation(ValidationError::NotAnObject) => StatusCode::BAD_REQUEST,
            PipelineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Store(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_GATEWAY,
        };
        ApiError::new(status, err.to_string())
    }
}

async fn post_telemetry(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    // Detached so a client disconnect cannot cut the record off between the
    // telemetry write and its alert transitions.
    let outcome = state.pipeline.submit(body.to_vec(), Utc::now()).await?;
    Ok(Json(IngestResponse::from(outcome)))
}

async fn get_health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(state.health())
}

async fn get_alerts(
    State(state): State<Arc<ApiState>>,
    Query(filter): Query<AlertFilter>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let alerts = state.pipeline.store().list_alerts(&filter).await?;
    Ok(Json(alerts))
}

async fn post_acknowledge(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<AlertId>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state
        .pipeline
        .store()
        .acknowledge_alert(id, Utc::now())
        .await?;
    info!(alert_id = alert.id, "alert acknowledged");
    Ok(Json(alert))
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> Response {
    match &state.registry {
        Some(registry) => sfb_metrics::render(registry.clone()).await,
        None => ApiError::new(StatusCode::NOT_FOUND, "metrics are disabled").into_response(),
    }
}
