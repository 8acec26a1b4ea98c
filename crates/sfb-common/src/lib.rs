//! ---
//! sfb_section: "01-core-functionality"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Shared configuration and tracing bootstrap."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
//! Shared primitives for the Smart Factory bridge workspace.
//! This crate exposes configuration loading and the tracing bootstrap
//! consumed by the daemon and the library crates.

pub mod config;
pub mod logging;

pub use config::{
    canonical_device_identity, AlertsConfig, ApiConfig, AppConfig, FactoryConfig,
    LoadedAppConfig, LoggingConfig, MetricsConfig, StoreBackend, StoreConfig,
};
pub use logging::{init_tracing, LogFormat};
