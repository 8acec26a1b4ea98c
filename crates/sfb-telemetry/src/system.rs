//! ---
//! sfb_section: "02-telemetry-normalization"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Telemetry validation, identity resolution and coercion."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
//! Closed set of factory subsystems and their typed readings.
//!
//! Controllers tag each payload with a system name. The known names map to
//! a dedicated reading struct; anything else is kept as an untyped field bag
//! and never evaluated by alert conditions.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::coerce::FieldReader;

/// Top-level keys consumed by the normalizer itself.
pub(crate) const ENVELOPE_KEYS: &[&str] = &[
    "system",
    "status",
    "device_id",
    "mac",
    "mac_address",
    "timestamp",
    "time",
    "ts",
];

/// Factory subsystem tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemKind {
    /// Smoke sensor, siren and sprinkler controller.
    FireControl,
    /// Temperature, air conditioning and furnace controller.
    Hvac,
    /// Battery bank with indicator LED.
    Battery,
    /// Scale with servo-driven gate.
    Weight,
    /// Order conveyor belt.
    Conveyor,
    /// Motion-triggered garage door.
    Garage,
    /// RFID access controlled safe room.
    SafeRoom,
    /// Any other tag, normalized to snake case.
    Other(String),
}

impl SystemKind {
    /// Every typed subsystem.
    pub const KNOWN: [SystemKind; 7] = [
        SystemKind::FireControl,
        SystemKind::Hvac,
        SystemKind::Battery,
        SystemKind::Weight,
        SystemKind::Conveyor,
        SystemKind::Garage,
        SystemKind::SafeRoom,
    ];

    /// Parse a controller tag. Accepts both the canonical names and the
    /// controller spellings (`HVAC_System`, `Fire_Control`, ...).
    pub fn parse(tag: &str) -> Self {
        let normalized = tag
            .trim()
            .to_ascii_lowercase()
            .replace(['-', ' '], "_");
        match normalized.as_str() {
            "fire_control" | "fire" => SystemKind::FireControl,
            "hvac" | "hvac_system" => SystemKind::Hvac,
            "battery" | "battery_system" => SystemKind::Battery,
            "weight" | "weight_system" => SystemKind::Weight,
            "conveyor" | "conveyor_belt" => SystemKind::Conveyor,
            "garage" | "garage_door" => SystemKind::Garage,
            "safe_room" | "saferoom" => SystemKind::SafeRoom,
            _ => SystemKind::Other(normalized),
        }
    }

    /// Canonical tag as persisted.
    pub fn as_str(&self) -> &str {
        match self {
            SystemKind::FireControl => "fire_control",
            SystemKind::Hvac => "hvac",
            SystemKind::Battery => "battery",
            SystemKind::Weight => "weight",
            SystemKind::Conveyor => "conveyor",
            SystemKind::Garage => "garage",
            SystemKind::SafeRoom => "safe_room",
            SystemKind::Other(tag) => tag,
        }
    }
}

impl fmt::Display for SystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SystemKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SystemKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(SystemKind::parse(&raw))
    }
}

/// Fire control readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[allow(missing_docs)]
pub struct FireControlReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_value: Option<f64>,
    /// Falls back to the top-level status when not reported separately.
    pub fire_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub siren: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprinkler: Option<bool>,
}

/// Temperature and climate actuator states.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[allow(missing_docs)]
pub struct HvacReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ac_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ac2_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub furnace_status: Option<String>,
}

/// Battery bank charge and indicator LED.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[allow(missing_docs)]
pub struct BatteryReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub led_brightness: Option<i64>,
}

/// Scale load and gate servo position.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[allow(missing_docs)]
pub struct WeightReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servo_angle: Option<i64>,
}

/// Conveyor throughput counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[allow(missing_docs)]
pub struct ConveyorReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conveyor_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_failed: Option<i64>,
}

/// Garage door motion sensor and door state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[allow(missing_docs)]
pub struct GarageReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion_detected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub door_state: Option<String>,
}

/// Safe room access control readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[allow(missing_docs)]
pub struct SafeRoomReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_card: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub door: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webcam: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_attempts: Option<i64>,
}

/// Typed readings, one variant per subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemPayload {
    /// Fire control readings.
    FireControl(FireControlReading),
    /// HVAC readings.
    Hvac(HvacReading),
    /// Battery readings.
    Battery(BatteryReading),
    /// Scale readings.
    Weight(WeightReading),
    /// Conveyor readings.
    Conveyor(ConveyorReading),
    /// Garage door readings.
    Garage(GarageReading),
    /// Safe room readings.
    SafeRoom(SafeRoomReading),
    /// Unrecognised subsystem; fields are kept verbatim (nulls dropped).
    Other {
        /// Normalized subsystem tag.
        system: String,
        /// Remaining non-envelope fields.
        fields: Map<String, Value>,
    },
}

impl SystemPayload {
    /// Subsystem tag of this payload.
    pub fn kind(&self) -> SystemKind {
        match self {
            SystemPayload::FireControl(_) => SystemKind::FireControl,
            SystemPayload::Hvac(_) => SystemKind::Hvac,
            SystemPayload::Battery(_) => SystemKind::Battery,
            SystemPayload::Weight(_) => SystemKind::Weight,
            SystemPayload::Conveyor(_) => SystemKind::Conveyor,
            SystemPayload::Garage(_) => SystemKind::Garage,
            SystemPayload::SafeRoom(_) => SystemKind::SafeRoom,
            SystemPayload::Other { system, .. } => SystemKind::Other(system.clone()),
        }
    }

    /// Canonical field names mapped to coerced values. Absent fields are omitted.
    pub fn fields(&self) -> Map<String, Value> {
        let value = match self {
            SystemPayload::FireControl(r) => serde_json::to_value(r),
            SystemPayload::Hvac(r) => serde_json::to_value(r),
            SystemPayload::Battery(r) => serde_json::to_value(r),
            SystemPayload::Weight(r) => serde_json::to_value(r),
            SystemPayload::Conveyor(r) => serde_json::to_value(r),
            SystemPayload::Garage(r) => serde_json::to_value(r),
            SystemPayload::SafeRoom(r) => serde_json::to_value(r),
            SystemPayload::Other { fields, .. } => return fields.clone(),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub(crate) fn read(
        kind: SystemKind,
        status: &str,
        raw: &Map<String, Value>,
        reader: &mut FieldReader<'_>,
    ) -> Self {
        match kind {
            SystemKind::FireControl => SystemPayload::FireControl(FireControlReading {
                sensor_value: reader.float(&["sensor_value"]),
                fire_status: reader
                    .string(&["fire_status"])
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| status.to_owned()),
                siren: reader.boolean(&["siren"]),
                sprinkler: reader.boolean(&["sprinkler"]),
            }),
            SystemKind::Hvac => SystemPayload::Hvac(HvacReading {
                temperature: reader.float(&["temperature"]),
                ac_status: reader.string(&["ac_status"]),
                ac2_status: reader.string(&["ac2_status"]),
                furnace_status: reader.string(&["furnace_status"]),
            }),
            SystemKind::Battery => SystemPayload::Battery(BatteryReading {
                battery_level: reader.float(&["battery_level"]),
                led_brightness: reader.integer(&["led_brightness", "led_intensity"]),
            }),
            SystemKind::Weight => SystemPayload::Weight(WeightReading {
                current_weight: reader.float(&["current_weight", "weight_val"]),
                servo_angle: reader.integer(&["servo_angle", "servo_pos"]),
            }),
            SystemKind::Conveyor => SystemPayload::Conveyor(ConveyorReading {
                order_count: reader.integer(&["order_count"]),
                conveyor_speed: reader.float(&["conveyor_speed", "sensor_value"]),
                items_failed: reader.integer(&["items_failed"]),
            }),
            SystemKind::Garage => SystemPayload::Garage(GarageReading {
                motion_detected: reader.boolean(&["motion_detected", "motion_status"]),
                door_state: reader.string(&["door_state"]),
            }),
            SystemKind::SafeRoom => SystemPayload::SafeRoom(SafeRoomReading {
                last_card: reader.string(&["last_card"]),
                access: reader.string(&["access"]),
                door: reader.string(&["door"]),
                webcam: reader.string(&["webcam"]),
                access_attempts: reader.integer(&["access_attempts"]),
            }),
            SystemKind::Other(system) => SystemPayload::Other {
                system,
                fields: raw
                    .iter()
                    .filter(|(key, value)| {
                        !value.is_null() && !ENVELOPE_KEYS.contains(&key.as_str())
                    })
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            },
        }
    }
}
