//! ---
//! sfb_section: "01-core-functionality"
//! sfb_subsection: "binary"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Binary entrypoint for the Smart Factory bridge daemon."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sfb_api::{spawn_api_server, ApiState};
use sfb_common::{init_tracing, AppConfig, LoadedAppConfig};
use sfb_core::build_pipeline;
use sfb_metrics::{new_registry, spawn_http_server, DaemonMetrics};
use tokio::signal;
use tracing::info;

mod simulate;

const CONFIG_CANDIDATES: &[&str] = &["configs/bridge.toml", "configs/bridge.example.toml"];

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("sfb-bridged ", env!("CARGO_PKG_VERSION")),
    about = "Smart Factory telemetry bridge",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the bridge (default)")]
    Run,
    #[command(about = "Load and validate the configuration, then exit")]
    CheckConfig,
    #[command(about = "Post synthetic controller telemetry to a running bridge")]
    Simulate(simulate::SimulateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let load_started = Instant::now();
            let loaded = load_config(cli.config.as_ref())?;
            run_daemon(loaded, load_started).await
        }
        Commands::CheckConfig => {
            let loaded = load_config(cli.config.as_ref())?;
            render_config_summary(&loaded);
            Ok(())
        }
        Commands::Simulate(args) => {
            sfb_logging::init();
            simulate::run(args).await
        }
    }
}

/// `--config` wins over `SFB_CONFIG`, which wins over the default candidates.
fn load_config(explicit: Option<&PathBuf>) -> Result<LoadedAppConfig> {
    match explicit {
        Some(path) => Ok(LoadedAppConfig {
            config: AppConfig::from_path(path.clone())?,
            source: path.clone(),
        }),
        None => AppConfig::load_with_source(CONFIG_CANDIDATES),
    }
}

async fn run_daemon(loaded: LoadedAppConfig, load_started: Instant) -> Result<()> {
    let LoadedAppConfig { config, source } = loaded;
    init_tracing("sfb-bridged", &config.logging)?;

    let registry = config.metrics.enabled.then(new_registry);
    if let Some(registry) = &registry {
        let daemon_metrics = DaemonMetrics::new(registry.clone())?;
        daemon_metrics.observe_config_load(load_started.elapsed().as_secs_f64());
        daemon_metrics.inc_start();
        daemon_metrics.set_build_info(
            env!("CARGO_PKG_VERSION"),
            if cfg!(debug_assertions) { "debug" } else { "release" },
        );
        daemon_metrics.set_mapped_devices(config.device_count());
    }
    info!(
        config_path = %source.display(),
        factories = config.factories.len(),
        devices = config.device_count(),
        backend = ?config.store.backend,
        "configuration loaded"
    );

    let metrics_server = match &registry {
        Some(registry) => Some(spawn_http_server(registry.clone(), config.metrics.listen)?),
        None => {
            info!("metrics exporter disabled by configuration");
            None
        }
    };

    let pipeline = build_pipeline(&config, registry.as_ref())?;
    let state = Arc::new(ApiState::new(Arc::new(pipeline), registry.clone()));
    let api_server = spawn_api_server(state, config.api.listen)
        .context("failed to start ingress server")?;
    info!(address = %api_server.addr(), "bridge running; waiting for termination signal");

    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    api_server.shutdown().await?;
    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

fn render_config_summary(loaded: &LoadedAppConfig) {
    let config = &loaded.config;
    println!("configuration: {}", loaded.source.display());
    println!("store backend: {:?}", config.store.backend);
    println!(
        "thresholds: high {} / low {} / battery {} / weight {} (refresh cooldown {}s)",
        config.alerts.temperature_high,
        config.alerts.temperature_low,
        config.alerts.battery_low,
        config.alerts.weight_max,
        config.alerts.refresh_cooldown.as_secs()
    );
    for (slug, factory) in &config.factories {
        println!(
            "factory {} (id {}, {}): {} device(s)",
            slug,
            factory.id,
            factory.name.as_deref().unwrap_or("unnamed"),
            factory.devices.len()
        );
        for device in &factory.devices {
            println!("  - {}", sfb_common::canonical_device_identity(device));
        }
    }
}
