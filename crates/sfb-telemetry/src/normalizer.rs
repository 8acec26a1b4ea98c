//! ---
//! sfb_section: "02-telemetry-normalization"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Telemetry validation, identity resolution and coercion."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use sfb_common::AppConfig;

use crate::coerce::{coerce_string, FieldReader};
use crate::identity::IdentityMap;
use crate::record::{CanonicalRecord, TimestampSource};
use crate::system::{SystemKind, SystemPayload};
use crate::{Result, ValidationError};

const IDENTITY_KEYS: &[&str] = &["device_id", "mac", "mac_address"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "ts"];
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Validates raw payloads and resolves them into [`CanonicalRecord`]s.
#[derive(Debug, Clone)]
pub struct Normalizer {
    identities: IdentityMap,
}

impl Normalizer {
    /// Build a normalizer over an explicit identity map.
    pub fn new(identities: IdentityMap) -> Self {
        Self { identities }
    }

    /// Build a normalizer from the factory section of the configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(IdentityMap::from_config(config))
    }

    /// Identity map backing this normalizer.
    pub fn identities(&self) -> &IdentityMap {
        &self.identities
    }

    /// Parse a raw request body and normalize it.
    pub fn normalize_bytes(&self, body: &[u8], received_at: DateTime<Utc>) -> Result<CanonicalRecord> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|err| ValidationError::Malformed(err.to_string()))?;
        self.normalize(&value, received_at)
    }

    /// Normalize one payload. `received_at` is the capture instant, used
    /// when the payload carries no usable timestamp.
    ///
    /// The identity is checked first so that unmapped devices are refused
    /// whatever the rest of the payload looks like.
    pub fn normalize(&self, payload: &Value, received_at: DateTime<Utc>) -> Result<CanonicalRecord> {
        let raw = payload.as_object().ok_or(ValidationError::NotAnObject)?;

        let identity = required_text(raw, IDENTITY_KEYS).ok_or(ValidationError::MissingField("device_id"))?;
        let factory = self
            .identities
            .resolve(&identity)
            .ok_or_else(|| ValidationError::UnmappedDevice(identity.clone()))?;

        let system = required_text(raw, &["system"]).ok_or(ValidationError::MissingField("system"))?;
        let status = required_text(raw, &["status"]).ok_or(ValidationError::MissingField("status"))?;

        let mut reader = FieldReader::new(raw);
        let payload = SystemPayload::read(SystemKind::parse(&system), &status, raw, &mut reader);
        reader.finish()?;

        let (timestamp, timestamp_source) = match lookup(raw, TIMESTAMP_KEYS).and_then(parse_timestamp) {
            Some(parsed) => (parsed, TimestampSource::Device),
            None => (received_at, TimestampSource::Capture),
        };

        let record = CanonicalRecord {
            factory_id: factory.id,
            device_identity: sfb_common::canonical_device_identity(&identity),
            status,
            payload,
            timestamp,
            timestamp_source,
            received_at,
        };
        debug!(
            factory = record.factory_id.get(),
            system = %record.system(),
            device = %record.device_identity,
            timestamp_source = ?record.timestamp_source,
            "telemetry normalized"
        );
        Ok(record)
    }
}

fn lookup<'a>(raw: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| raw.get(*key).filter(|value| !value.is_null()))
}

fn required_text(raw: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    lookup(raw, keys)
        .and_then(coerce_string)
        .filter(|text| !text.is_empty())
}

/// Parse an RFC 3339 or `YYYY-MM-DD HH:MM:SS` (UTC) timestamp.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, NAIVE_TIMESTAMP_FORMAT)
                .ok()
                .map(|naive| naive.and_utc())
        })
}
