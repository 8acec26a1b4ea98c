//! ---
//! sfb_section: "02-telemetry-normalization"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Telemetry validation, identity resolution and coercion."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Turns loosely typed controller payloads into canonical records.
//!
//! The normalizer is pure: it never touches the store. Persistence and alert
//! evaluation happen downstream once a [`CanonicalRecord`] is produced.

pub mod coerce;
pub mod identity;
pub mod normalizer;
pub mod record;
pub mod system;

/// Result alias used throughout the telemetry crate.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Reasons a payload is refused before anything is persisted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// The body could not be parsed as JSON at all.
    #[error("malformed payload: {0}")]
    Malformed(String),
    /// The body parsed, but is not a JSON object.
    #[error("payload must be a JSON object")]
    NotAnObject,
    /// A required top-level field is absent or blank.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    /// The reporting device is not assigned to any factory.
    #[error("device '{0}' is not mapped to any factory")]
    UnmappedDevice(String),
    /// One or more supplied fields could not be coerced to their declared type.
    #[error("invalid field values: {}", coerce::describe(.0))]
    InvalidFields(Vec<coerce::FieldError>),
}

impl ValidationError {
    /// Short machine-friendly label, used as a metrics dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::Malformed(_) => "malformed",
            ValidationError::NotAnObject => "not_an_object",
            ValidationError::MissingField(_) => "missing_field",
            ValidationError::UnmappedDevice(_) => "unmapped_device",
            ValidationError::InvalidFields(_) => "invalid_fields",
        }
    }
}

pub use coerce::{FieldError, FieldType};
pub use identity::{FactoryRef, IdentityMap};
pub use normalizer::Normalizer;
pub use record::{CanonicalRecord, FactoryId, TimestampSource};
pub use system::{
    BatteryReading, ConveyorReading, FireControlReading, GarageReading, HvacReading,
    SafeRoomReading, SystemKind, SystemPayload, WeightReading,
};
