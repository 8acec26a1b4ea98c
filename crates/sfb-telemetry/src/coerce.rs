//! ---
//! sfb_section: "02-telemetry-normalization"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Telemetry validation, identity resolution and coercion."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
//! Wire values arrive stringly typed; every known field declares the type it
//! must coerce to.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ValidationError;

/// Declared semantic type of a telemetry field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Finite floating point reading.
    Float,
    /// Whole number counter.
    Integer,
    /// On/off flag.
    Boolean,
    /// Free text state.
    String,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Float => "float",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::String => "string",
        };
        f.write_str(name)
    }
}

/// A supplied field that could not be coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Wire key as supplied by the device.
    pub field: String,
    /// Type the field must coerce to.
    pub expected: FieldType,
    /// Raw JSON rendering of the offending value.
    pub found: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, got {}", self.field, self.expected, self.found)
    }
}

pub(crate) fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Coerce a JSON value to a finite float.
pub fn coerce_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Coerce a JSON value to an integer. Integral floats (`3.0`) are accepted.
pub fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

fn integral(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64)
        .then_some(value as i64)
}

/// Coerce a JSON value to a boolean flag.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" | "detected" => Some(true),
            "false" | "0" | "off" | "no" | "clear" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Coerce a JSON scalar to text. Arrays and objects are refused.
pub fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Reads typed fields out of a raw payload, collecting every failure so the
/// caller can reject the whole record at once.
pub(crate) struct FieldReader<'a> {
    fields: &'a Map<String, Value>,
    errors: Vec<FieldError>,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(fields: &'a Map<String, Value>) -> Self {
        Self {
            fields,
            errors: Vec::new(),
        }
    }

    /// First present, non-null value among the accepted wire keys.
    fn lookup(&self, keys: &[&str]) -> Option<(&'a str, &'a Value)> {
        keys.iter().find_map(|key| {
            self.fields
                .get_key_value(*key)
                .filter(|(_, value)| !value.is_null())
                .map(|(k, v)| (k.as_str(), v))
        })
    }

    fn read<T>(
        &mut self,
        keys: &[&str],
        expected: FieldType,
        coerce: impl Fn(&Value) -> Option<T>,
    ) -> Option<T> {
        let (key, value) = self.lookup(keys)?;
        match coerce(value) {
            Some(parsed) => Some(parsed),
            None => {
                self.errors.push(FieldError {
                    field: key.to_owned(),
                    expected,
                    found: value.to_string(),
                });
                None
            }
        }
    }

    pub(crate) fn float(&mut self, keys: &[&str]) -> Option<f64> {
        self.read(keys, FieldType::Float, coerce_float)
    }

    pub(crate) fn integer(&mut self, keys: &[&str]) -> Option<i64> {
        self.read(keys, FieldType::Integer, coerce_integer)
    }

    pub(crate) fn boolean(&mut self, keys: &[&str]) -> Option<bool> {
        self.read(keys, FieldType::Boolean, coerce_bool)
    }

    pub(crate) fn string(&mut self, keys: &[&str]) -> Option<String> {
        self.read(keys, FieldType::String, coerce_string)
    }

    pub(crate) fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::InvalidFields(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn floats_accept_numbers_and_numeric_strings() {
        assert_eq!(coerce_float(&json!(45.5)), Some(45.5));
        assert_eq!(coerce_float(&json!("45.5")), Some(45.5));
        assert_eq!(coerce_float(&json!(" 7 ")), Some(7.0));
        assert_eq!(coerce_float(&json!("hot")), None);
        assert_eq!(coerce_float(&json!("NaN")), None);
        assert_eq!(coerce_float(&json!(true)), None);
    }

    #[test]
    fn integers_reject_fractions() {
        assert_eq!(coerce_integer(&json!(3)), Some(3));
        assert_eq!(coerce_integer(&json!("3")), Some(3));
        assert_eq!(coerce_integer(&json!(3.0)), Some(3));
        assert_eq!(coerce_integer(&json!("2.5")), None);
        assert_eq!(coerce_integer(&json!("three")), None);
    }

    #[test]
    fn booleans_understand_controller_vocabulary() {
        assert_eq!(coerce_bool(&json!(1)), Some(true));
        assert_eq!(coerce_bool(&json!("0")), Some(false));
        assert_eq!(coerce_bool(&json!("DETECTED")), Some(true));
        assert_eq!(coerce_bool(&json!("Clear")), Some(false));
        assert_eq!(coerce_bool(&json!("ON")), Some(true));
        assert_eq!(coerce_bool(&json!(2)), None);
        assert_eq!(coerce_bool(&json!("maybe")), None);
    }

    #[test]
    fn reader_collects_every_failure() {
        let payload = json!({"temperature": "warm", "battery_level": "low", "ok": null});
        let map = payload.as_object().unwrap();
        let mut reader = FieldReader::new(map);
        assert_eq!(reader.float(&["temperature"]), None);
        assert_eq!(reader.float(&["battery_level"]), None);
        assert_eq!(reader.string(&["ok"]), None);
        assert_eq!(reader.integer(&["absent"]), None);
        let Err(ValidationError::InvalidFields(errors)) = reader.finish() else {
            panic!("expected invalid fields");
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "temperature");
        assert_eq!(errors[1].expected, FieldType::Float);
    }

    #[test]
    fn reader_prefers_first_alias_present() {
        let payload = json!({"weight_val": "512", "current_weight": null});
        let map = payload.as_object().unwrap();
        let mut reader = FieldReader::new(map);
        assert_eq!(reader.float(&["current_weight", "weight_val"]), Some(512.0));
        assert!(reader.finish().is_ok());
    }
}
