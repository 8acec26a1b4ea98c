//! ---
//! sfb_section: "01-core-functionality"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Shared configuration and tracing bootstrap."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_temperature_high() -> f64 {
    30.0
}

fn default_temperature_low() -> f64 {
    15.0
}

fn default_battery_low() -> f64 {
    20.0
}

fn default_weight_max() -> f64 {
    1000.0
}

fn default_api_key_env() -> String {
    "SUPABASE_KEY".to_owned()
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_telemetry_table() -> String {
    "telemetry".to_owned()
}

fn default_alerts_table() -> String {
    "system_alerts".to_owned()
}

fn default_factories_table() -> String {
    "factories".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9898"
        .parse()
        .expect("valid default metrics address")
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8000".parse().expect("valid default api address")
}

/// Primary configuration object for the bridge runtime.
///
/// Built once at start-up and handed to the normalizer and the alert engine
/// behind an `Arc`; nothing mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub factories: IndexMap<String, FactoryConfig>,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "SFB_CONFIG";

    /// Load configuration from disk, respecting the `SFB_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Load and validate one explicit file.
    pub fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Retrieve a factory configuration by slug.
    pub fn factory(&self, slug: &str) -> Option<&FactoryConfig> {
        self.factories.get(slug)
    }

    /// Total number of device identities across all factories.
    pub fn device_count(&self) -> usize {
        self.factories.values().map(|f| f.devices.len()).sum()
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.factories.is_empty() {
            return Err(anyhow!("configuration must contain at least one factory"));
        }

        let mut ids: HashMap<i64, &str> = HashMap::new();
        let mut devices: HashMap<String, &str> = HashMap::new();
        for (slug, factory) in &self.factories {
            factory.validate(slug)?;
            if let Some(other) = ids.insert(factory.id, slug) {
                return Err(anyhow!(
                    "factories '{}' and '{}' share id {}",
                    other,
                    slug,
                    factory.id
                ));
            }
            for device in &factory.devices {
                let identity = canonical_device_identity(device);
                if let Some(other) = devices.insert(identity.clone(), slug) {
                    return Err(anyhow!(
                        "device '{}' is mapped to both '{}' and '{}'",
                        identity,
                        other,
                        slug
                    ));
                }
            }
        }

        self.alerts.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Canonical form of a hardware identity used for factory lookups.
///
/// MAC addresses arrive as `00-1A-2B-...`, `00:1a:2b:...` or with stray
/// whitespace depending on the controller firmware.
pub fn canonical_device_identity(raw: &str) -> String {
    raw.trim().replace('-', ":").to_ascii_lowercase()
}

/// One factory and the device identities that report on its behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryConfig {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub devices: Vec<String>,
}

impl FactoryConfig {
    pub fn validate(&self, slug: &str) -> Result<()> {
        if self.id <= 0 {
            return Err(anyhow!("factory '{}' must have a positive id", slug));
        }
        if self.devices.iter().any(|d| d.trim().is_empty()) {
            return Err(anyhow!("factory '{}' lists an empty device identity", slug));
        }
        Ok(())
    }
}

/// Threshold and throttling settings consumed by the alert engine.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_temperature_high")]
    pub temperature_high: f64,
    #[serde(default = "default_temperature_low")]
    pub temperature_low: f64,
    #[serde(default = "default_battery_low")]
    pub battery_low: f64,
    #[serde(default = "default_weight_max")]
    pub weight_max: f64,
    /// Minimum spacing between two refresh writes of the same open alert.
    /// Zero disables throttling.
    #[serde(default, rename = "refresh_cooldown_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub refresh_cooldown: Duration,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            temperature_high: default_temperature_high(),
            temperature_low: default_temperature_low(),
            battery_low: default_battery_low(),
            weight_max: default_weight_max(),
            refresh_cooldown: Duration::ZERO,
        }
    }
}

impl AlertsConfig {
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("temperature_high", self.temperature_high),
            ("temperature_low", self.temperature_low),
            ("battery_low", self.battery_low),
            ("weight_max", self.weight_max),
        ];
        if let Some((name, _)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(anyhow!("alerts.{} must be a finite number", name));
        }
        if self.temperature_high <= self.temperature_low {
            return Err(anyhow!(
                "alerts.temperature_high ({}) must be greater than alerts.temperature_low ({})",
                self.temperature_high,
                self.temperature_low
            ));
        }
        Ok(())
    }
}

/// Which store adapter backs the bridge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgrest,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Base URL of the PostgREST endpoint (for Supabase the project URL).
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the service key. The key itself never
    /// lives in the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_store_timeout", rename = "timeout_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
    #[serde(default = "default_telemetry_table")]
    pub telemetry_table: String,
    #[serde(default = "default_alerts_table")]
    pub alerts_table: String,
    #[serde(default = "default_factories_table")]
    pub factories_table: String,
    /// Reject a second open alert per key inside the in-memory store.
    #[serde(default = "default_true")]
    pub enforce_unique_open: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            api_key_env: default_api_key_env(),
            timeout: default_store_timeout(),
            telemetry_table: default_telemetry_table(),
            alerts_table: default_alerts_table(),
            factories_table: default_factories_table(),
            enforce_unique_open: true,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend == StoreBackend::Postgrest {
            match self.url.as_deref() {
                Some(url) if !url.trim().is_empty() => {}
                _ => return Err(anyhow!("store.url is required for the postgrest backend")),
            }
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("store.timeout_secs must be greater than zero"));
        }
        for (name, table) in [
            ("telemetry_table", &self.telemetry_table),
            ("alerts_table", &self.alerts_table),
            ("factories_table", &self.factories_table),
        ] {
            if table.trim().is_empty() {
                return Err(anyhow!("store.{} must not be empty", name));
            }
        }
        Ok(())
    }

    /// Read the service key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_metrics_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_api_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_canonicalised() {
        assert_eq!(
            canonical_device_identity(" 00-1A-2B-3C-4D-5E "),
            "00:1a:2b:3c:4d:5e"
        );
        assert_eq!(
            canonical_device_identity("00:1a:2b:3c:4d:5e"),
            "00:1a:2b:3c:4d:5e"
        );
    }

    #[test]
    fn alert_defaults_match_rule_table() {
        let alerts = AlertsConfig::default();
        assert_eq!(alerts.temperature_high, 30.0);
        assert_eq!(alerts.temperature_low, 15.0);
        assert_eq!(alerts.battery_low, 20.0);
        assert_eq!(alerts.weight_max, 1000.0);
        assert!(alerts.refresh_cooldown.is_zero());
    }
}
