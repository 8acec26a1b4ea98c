//! ---
//! sfb_section: "02-telemetry-normalization"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Telemetry validation, identity resolution and coercion."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::system::{SystemKind, SystemPayload};

/// Numeric factory identifier as stored in the factory registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactoryId(pub i64);

impl FactoryId {
    /// Raw identifier value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for FactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for FactoryId {
    fn from(value: i64) -> Self {
        FactoryId(value)
    }
}

/// Where the canonical timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Parsed from the payload.
    Device,
    /// Substituted with the capture instant.
    Capture,
}

/// Validated, coerced and timestamped telemetry record.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    /// Factory resolved from the device identity.
    pub factory_id: FactoryId,
    /// Canonical (lowercase, colon separated) device identity.
    pub device_identity: String,
    /// Free text status as reported by the controller.
    pub status: String,
    /// Typed per-system readings.
    pub payload: SystemPayload,
    /// Observation time of the reading.
    pub timestamp: DateTime<Utc>,
    /// Whether `timestamp` was reported or substituted.
    pub timestamp_source: TimestampSource,
    /// Instant the bridge captured the payload.
    pub received_at: DateTime<Utc>,
}

impl CanonicalRecord {
    /// Subsystem the record belongs to.
    pub fn system(&self) -> SystemKind {
        self.payload.kind()
    }

    /// Canonical field names mapped to their coerced values.
    pub fn fields(&self) -> Map<String, Value> {
        self.payload.fields()
    }
}
