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

use anyhow::{Context, Result};
use tracing::info;

use sfb_alerts::AlertLifecycleEngine;
use sfb_common::{AppConfig, StoreBackend, StoreConfig};
use sfb_metrics::{BridgeMetrics, SharedRegistry};
use sfb_store::{InstrumentedStore, MemoryStore, PostgrestStore, SharedStore, StoreMetrics};
use sfb_telemetry::Normalizer;

use crate::pipeline::IngestPipeline;

/// Build the configured store adapter, wrapped with Prometheus timings when a
/// registry is supplied.
pub fn build_store(config: &StoreConfig, registry: Option<&SharedRegistry>) -> Result<SharedStore> {
    let store: SharedStore = match config.backend {
        StoreBackend::Memory => {
            Arc::new(MemoryStore::new().with_unique_open(config.enforce_unique_open))
        }
        StoreBackend::Postgrest => Arc::new(
            PostgrestStore::from_config(config)
                .context("failed to initialise postgrest store")?,
        ),
    };
    info!(backend = ?config.backend, "store initialised");

    match registry {
        Some(registry) => {
            let metrics = StoreMetrics::new(registry.clone())
                .context("failed to register store metrics")?;
            Ok(Arc::new(InstrumentedStore::new(store, metrics)))
        }
        None => Ok(store),
    }
}

/// Assemble the full pipeline from configuration.
pub fn build_pipeline(config: &AppConfig, registry: Option<&SharedRegistry>) -> Result<IngestPipeline> {
    let store = build_store(&config.store, registry)?;
    let normalizer = Normalizer::from_config(config);
    let engine = AlertLifecycleEngine::from_config(store.clone(), &config.alerts);
    let metrics = match registry {
        Some(registry) => Some(
            BridgeMetrics::new(registry.clone()).context("failed to register bridge metrics")?,
        ),
        None => None,
    };
    info!(
        devices = normalizer.identities().len(),
        cooldown_secs = config.alerts.refresh_cooldown.as_secs(),
        "ingest pipeline assembled"
    );
    Ok(IngestPipeline::new(normalizer, store, engine).with_metrics(metrics))
}
