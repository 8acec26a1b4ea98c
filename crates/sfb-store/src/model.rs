//! ---
//! sfb_section: "03-persistence-logging"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Store port and adapters for telemetry history and alerts."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
//! Row shapes shared by every store adapter. Column names follow the
//! dashboard schema (`system_alerts.system_name`, `telemetry.device_id`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use sfb_telemetry::{CanonicalRecord, FactoryId, SystemKind};

/// Primary key of an alert row.
pub type AlertId = i64;

/// Alert severity, fixed per alert type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Immediate danger to people or plant.
    Critical,
    /// Abnormal condition needing attention.
    Warning,
    /// Informational, no action required.
    Info,
}

impl Severity {
    /// Uppercase wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }
}

/// Abnormal condition an alert tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    /// Fire status reports a fire.
    FireDetected,
    /// Temperature above the upper band.
    HighTemperature,
    /// Temperature below the lower band.
    LowTemperature,
    /// Battery charge below threshold.
    LowBattery,
    /// Scale load above capacity.
    WeightExceeded,
    /// Conveyor reports failed items.
    ConveyorFailure,
    /// Safe room recorded refused access attempts.
    UnauthorizedAccess,
}

impl AlertType {
    /// Every alert type.
    pub const ALL: [AlertType; 7] = [
        AlertType::FireDetected,
        AlertType::HighTemperature,
        AlertType::LowTemperature,
        AlertType::LowBattery,
        AlertType::WeightExceeded,
        AlertType::ConveyorFailure,
        AlertType::UnauthorizedAccess,
    ];

    /// Severity attached to every alert of this type.
    pub fn severity(&self) -> Severity {
        match self {
            AlertType::FireDetected => Severity::Critical,
            AlertType::ConveyorFailure => Severity::Info,
            AlertType::HighTemperature
            | AlertType::LowTemperature
            | AlertType::LowBattery
            | AlertType::WeightExceeded
            | AlertType::UnauthorizedAccess => Severity::Warning,
        }
    }

    /// Wire label (`HIGH_TEMPERATURE`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::FireDetected => "FIRE_DETECTED",
            AlertType::HighTemperature => "HIGH_TEMPERATURE",
            AlertType::LowTemperature => "LOW_TEMPERATURE",
            AlertType::LowBattery => "LOW_BATTERY",
            AlertType::WeightExceeded => "WEIGHT_EXCEEDED",
            AlertType::ConveyorFailure => "CONVEYOR_FAILURE",
            AlertType::UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an alert lifecycle: at most one open alert per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlertKey {
    /// Factory the alert belongs to.
    pub factory_id: FactoryId,
    /// Subsystem the condition was evaluated on.
    pub system: SystemKind,
    /// Condition tracked.
    pub alert_type: AlertType,
}

impl AlertKey {
    /// Build a key.
    pub fn new(factory_id: FactoryId, system: SystemKind, alert_type: AlertType) -> Self {
        Self {
            factory_id,
            system,
            alert_type,
        }
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.factory_id, self.system, self.alert_type)
    }
}

/// Persisted alert row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Primary key.
    pub id: AlertId,
    /// Owning factory.
    pub factory_id: FactoryId,
    /// Subsystem tag.
    #[serde(rename = "system_name")]
    pub system: SystemKind,
    /// Condition tracked.
    pub alert_type: AlertType,
    /// Latest human-readable description.
    pub message: String,
    /// Severity fixed by the alert type.
    pub severity: Severity,
    /// Whether the condition has cleared.
    pub is_resolved: bool,
    /// Whether an operator has seen the alert.
    #[serde(default)]
    pub is_acknowledged: bool,
    /// When the alert was opened.
    pub created_at: DateTime<Utc>,
    /// Last refresh, resolve or creation instant.
    pub updated_at: DateTime<Utc>,
    /// When the condition cleared.
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    /// When an operator acknowledged the alert.
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Lifecycle key of this alert.
    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.factory_id, self.system.clone(), self.alert_type)
    }

    /// Whether the alert is still open.
    pub fn is_open(&self) -> bool {
        !self.is_resolved
    }
}

/// Insert payload for a new open alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAlert {
    /// Owning factory.
    pub factory_id: FactoryId,
    /// Subsystem tag.
    #[serde(rename = "system_name")]
    pub system: SystemKind,
    /// Condition tracked.
    pub alert_type: AlertType,
    /// Human-readable description.
    pub message: String,
    /// Severity fixed by the alert type.
    pub severity: Severity,
    /// Always `false` on insert.
    pub is_resolved: bool,
    /// Always `false` on insert.
    pub is_acknowledged: bool,
    /// Creation instant, also the initial `updated_at`.
    pub created_at: DateTime<Utc>,
    /// Equal to `created_at` on insert.
    pub updated_at: DateTime<Utc>,
}

impl NewAlert {
    /// Open alert for `key` created at `at`.
    pub fn open(key: &AlertKey, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            factory_id: key.factory_id,
            system: key.system.clone(),
            alert_type: key.alert_type,
            message: message.into(),
            severity: key.alert_type.severity(),
            is_resolved: false,
            is_acknowledged: false,
            created_at: at,
            updated_at: at,
        }
    }

    /// Lifecycle key of the alert to insert.
    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.factory_id, self.system.clone(), self.alert_type)
    }
}

/// Insert payload for one telemetry history row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTelemetry {
    /// Owning factory.
    pub factory_id: FactoryId,
    /// Subsystem tag.
    #[serde(rename = "system_name")]
    pub system: SystemKind,
    /// Canonical reporting device identity.
    #[serde(rename = "device_id")]
    pub device_identity: String,
    /// Reported status text.
    pub status: String,
    /// Observation time.
    pub recorded_at: DateTime<Utc>,
    /// Capture time.
    pub received_at: DateTime<Utc>,
    /// Coerced canonical fields.
    pub payload: Map<String, Value>,
}

impl From<&CanonicalRecord> for NewTelemetry {
    fn from(record: &CanonicalRecord) -> Self {
        Self {
            factory_id: record.factory_id,
            system: record.system(),
            device_identity: record.device_identity.clone(),
            status: record.status.clone(),
            recorded_at: record.timestamp,
            received_at: record.received_at,
            payload: record.fields(),
        }
    }
}

/// Persisted telemetry history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    /// Primary key.
    pub id: i64,
    /// Owning factory.
    pub factory_id: FactoryId,
    /// Subsystem tag.
    #[serde(rename = "system_name")]
    pub system: SystemKind,
    /// Canonical reporting device identity.
    #[serde(rename = "device_id")]
    pub device_identity: String,
    /// Reported status text.
    pub status: String,
    /// Observation time.
    pub recorded_at: DateTime<Utc>,
    /// Capture time.
    pub received_at: DateTime<Utc>,
    /// Coerced canonical fields.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl TelemetryRow {
    /// Materialize an insert payload with an assigned id.
    pub fn from_new(id: i64, row: &NewTelemetry) -> Self {
        Self {
            id,
            factory_id: row.factory_id,
            system: row.system.clone(),
            device_identity: row.device_identity.clone(),
            status: row.status.clone(),
            recorded_at: row.recorded_at,
            received_at: row.received_at,
            payload: row.payload.clone(),
        }
    }
}

/// Read-side alert query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFilter {
    /// Restrict to one factory.
    #[serde(default)]
    pub factory_id: Option<FactoryId>,
    /// Restrict to one subsystem.
    #[serde(default)]
    pub system: Option<SystemKind>,
    /// `Some(true)` for open alerts only, `Some(false)` for resolved only.
    #[serde(default)]
    pub open: Option<bool>,
    /// Maximum number of rows returned.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl AlertFilter {
    /// Whether an alert satisfies the filter (limit excluded).
    pub fn matches(&self, alert: &Alert) -> bool {
        self.factory_id.map_or(true, |id| alert.factory_id == id)
            && self.system.as_ref().map_or(true, |system| &alert.system == system)
            && self.open.map_or(true, |open| alert.is_open() == open)
    }
}

/// Store operation label used by metrics and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// [`crate::BridgeStore::insert_telemetry`].
    InsertTelemetry,
    /// [`crate::BridgeStore::touch_factory`].
    TouchFactory,
    /// [`crate::BridgeStore::insert_alert`].
    InsertAlert,
    /// [`crate::BridgeStore::find_open_alert`].
    FindOpenAlert,
    /// [`crate::BridgeStore::update_alert`].
    UpdateAlert,
    /// [`crate::BridgeStore::resolve_alert`].
    ResolveAlert,
    /// [`crate::BridgeStore::list_alerts`].
    ListAlerts,
    /// [`crate::BridgeStore::acknowledge_alert`].
    AcknowledgeAlert,
}

impl StoreOp {
    /// Snake case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::InsertTelemetry => "insert_telemetry",
            StoreOp::TouchFactory => "touch_factory",
            StoreOp::InsertAlert => "insert_alert",
            StoreOp::FindOpenAlert => "find_open_alert",
            StoreOp::UpdateAlert => "update_alert",
            StoreOp::ResolveAlert => "resolve_alert",
            StoreOp::ListAlerts => "list_alerts",
            StoreOp::AcknowledgeAlert => "acknowledge_alert",
        }
    }
}
