//! ---
//! sfb_section: "03-persistence-logging"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Metrics collection and export utilities."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across the bridge.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || render(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;
    let bound = listener
        .local_addr()
        .with_context(|| "failed to read metrics listener address")?;

    info!(address = %bound, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape response for a registry.
pub async fn render(registry: SharedRegistry) -> Response {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Bound address (resolved when the configured port was 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
    mapped_devices: IntGauge,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "sfb_bridged_starts_total",
            "Total number of times the bridge daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "sfb_bridged_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new(
                "sfb_bridged_build_info",
                "Build metadata for the running daemon binary",
            ),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        let mapped_devices = IntGauge::with_opts(Opts::new(
            "sfb_mapped_devices",
            "Number of device identities mapped to a factory",
        ))?;
        registry.register(Box::new(mapped_devices.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            build_info,
            mapped_devices,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, profile])
            .set(1.0);
    }

    pub fn set_mapped_devices(&self, count: usize) {
        self.mapped_devices.set(count as i64);
    }
}

/// Metrics recorded along the ingest path.
#[derive(Clone)]
pub struct BridgeMetrics {
    registry: SharedRegistry,
    accepted: IntCounterVec,
    rejected: IntCounterVec,
    transitions: IntCounterVec,
    ingest_seconds: HistogramVec,
}

impl BridgeMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let accepted = IntCounterVec::new(
            Opts::new(
                "sfb_telemetry_accepted_total",
                "Telemetry records persisted, by factory and system",
            ),
            &["factory", "system"],
        )?;
        registry.register(Box::new(accepted.clone()))?;

        let rejected = IntCounterVec::new(
            Opts::new(
                "sfb_telemetry_rejected_total",
                "Telemetry records refused, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejected.clone()))?;

        let transitions = IntCounterVec::new(
            Opts::new(
                "sfb_alert_transitions_total",
                "Alert lifecycle transitions, by alert type and transition",
            ),
            &["alert_type", "transition"],
        )?;
        registry.register(Box::new(transitions.clone()))?;

        let buckets = prometheus::exponential_buckets(0.0005, 2.0, 14)
            .context("failed to construct histogram buckets")?;
        let ingest_seconds = HistogramVec::new(
            HistogramOpts::new(
                "sfb_ingest_seconds",
                "End-to-end processing time of one telemetry record",
            )
            .buckets(buckets),
            &["outcome"],
        )?;
        registry.register(Box::new(ingest_seconds.clone()))?;

        Ok(Self {
            registry,
            accepted,
            rejected,
            transitions,
            ingest_seconds,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_accepted(&self, factory: i64, system: &str) {
        self.accepted
            .with_label_values(&[&factory.to_string(), system])
            .inc();
    }

    pub fn record_rejected(&self, reason: &str) {
        self.rejected.with_label_values(&[reason]).inc();
    }

    pub fn record_transition(&self, alert_type: &str, transition: &str) {
        self.transitions
            .with_label_values(&[alert_type, transition])
            .inc();
    }

    pub fn observe_ingest(&self, outcome: &str, elapsed: Duration) {
        self.ingest_seconds
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());
    }
}

pub use prometheus;
