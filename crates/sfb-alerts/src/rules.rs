//! ---
//! sfb_section: "04-alert-lifecycle"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Alert condition rules and lifecycle state machine."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
//! Condition table. Comparisons are strict: a reading exactly on a
//! threshold is normal. A condition whose field is absent is not evaluated.

use std::fmt::Display;

use sfb_common::AlertsConfig;
use sfb_store::AlertType;
use sfb_telemetry::{CanonicalRecord, SystemKind, SystemPayload};

/// Numeric thresholds, taken from the `[alerts]` configuration section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub temperature_high: f64,
    pub temperature_low: f64,
    pub battery_low: f64,
    pub weight_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&AlertsConfig::default())
    }
}

impl From<&AlertsConfig> for Thresholds {
    fn from(config: &AlertsConfig) -> Self {
        Self {
            temperature_high: config.temperature_high,
            temperature_low: config.temperature_low,
            battery_low: config.battery_low,
            weight_max: config.weight_max,
        }
    }
}

/// Verdict for one alert type on one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub alert_type: AlertType,
    pub abnormal: bool,
    /// Description stored on the alert; only meaningful when abnormal.
    pub message: String,
}

impl Evaluation {
    fn new(alert_type: AlertType, abnormal: bool, message: impl FnOnce() -> String) -> Self {
        let message = if abnormal { message() } else { String::new() };
        Self {
            alert_type,
            abnormal,
            message,
        }
    }
}

/// Alert types a subsystem can raise.
pub fn alert_types_for(system: &SystemKind) -> &'static [AlertType] {
    match system {
        SystemKind::FireControl => &[AlertType::FireDetected],
        SystemKind::Hvac => &[AlertType::HighTemperature, AlertType::LowTemperature],
        SystemKind::Battery => &[AlertType::LowBattery],
        SystemKind::Weight => &[AlertType::WeightExceeded],
        SystemKind::Conveyor => &[AlertType::ConveyorFailure],
        SystemKind::SafeRoom => &[AlertType::UnauthorizedAccess],
        SystemKind::Garage | SystemKind::Other(_) => &[],
    }
}

fn or_na<T: Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "N/A".to_owned())
}

/// Whether a fire status string reports a fire.
pub fn is_fire(status: &str) -> bool {
    let status = status.trim().to_uppercase();
    status.contains("FIRE") && status != "SAFE"
}

/// Evaluate every condition the record's subsystem defines.
pub fn evaluate(record: &CanonicalRecord, thresholds: &Thresholds) -> Vec<Evaluation> {
    let mut verdicts = Vec::new();
    match &record.payload {
        SystemPayload::FireControl(fire) => {
            verdicts.push(Evaluation::new(
                AlertType::FireDetected,
                is_fire(&fire.fire_status),
                || {
                    format!(
                        "FIRE DETECTED! Status: {} | Sensor: {} | Sprinklers & Siren ACTIVATED",
                        fire.fire_status,
                        or_na(&fire.sensor_value)
                    )
                },
            ));
        }
        SystemPayload::Hvac(hvac) => {
            if let Some(temperature) = hvac.temperature {
                verdicts.push(Evaluation::new(
                    AlertType::HighTemperature,
                    temperature > thresholds.temperature_high,
                    || {
                        format!(
                            "High Temperature: {}°C (Threshold: {}°C) | AC: {}",
                            temperature,
                            thresholds.temperature_high,
                            or_na(&hvac.ac_status)
                        )
                    },
                ));
                verdicts.push(Evaluation::new(
                    AlertType::LowTemperature,
                    temperature < thresholds.temperature_low,
                    || {
                        format!(
                            "Low Temperature: {}°C (Threshold: {}°C) | Furnace: {}",
                            temperature,
                            thresholds.temperature_low,
                            or_na(&hvac.furnace_status)
                        )
                    },
                ));
            }
        }
        SystemPayload::Battery(battery) => {
            if let Some(level) = battery.battery_level {
                verdicts.push(Evaluation::new(
                    AlertType::LowBattery,
                    level < thresholds.battery_low,
                    || {
                        format!(
                            "Low Battery: {}% (Threshold: {}%) | LED: {} | Charge immediately",
                            level,
                            thresholds.battery_low,
                            or_na(&battery.led_brightness)
                        )
                    },
                ));
            }
        }
        SystemPayload::Weight(weight) => {
            if let Some(load) = weight.current_weight {
                verdicts.push(Evaluation::new(
                    AlertType::WeightExceeded,
                    load > thresholds.weight_max,
                    || {
                        format!(
                            "Weight Exceeded: {}g (Limit: {}g) | Servo: {}",
                            load,
                            thresholds.weight_max,
                            or_na(&weight.servo_angle)
                        )
                    },
                ));
            }
        }
        SystemPayload::Conveyor(conveyor) => {
            if let Some(failed) = conveyor.items_failed {
                verdicts.push(Evaluation::new(AlertType::ConveyorFailure, failed > 0, || {
                    format!(
                        "Conveyor Failure: {} item(s) failed | Orders: {}",
                        failed,
                        or_na(&conveyor.order_count)
                    )
                }));
            }
        }
        SystemPayload::SafeRoom(room) => {
            if let Some(attempts) = room.access_attempts {
                verdicts.push(Evaluation::new(
                    AlertType::UnauthorizedAccess,
                    attempts > 0,
                    || {
                        format!(
                            "Unauthorized Access: {} attempt(s) | Card: {} | Door: {}",
                            attempts,
                            room.last_card.as_deref().unwrap_or("Unknown"),
                            or_na(&room.door)
                        )
                    },
                ));
            }
        }
        SystemPayload::Garage(_) | SystemPayload::Other { .. } => {}
    }
    verdicts
}
