//! ---
//! sfb_section: "02-telemetry-normalization"
//! sfb_subsection: "integration-tests"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Telemetry validation, identity resolution and coercion."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use chrono::{TimeZone, Utc};
use serde_json::json;
use sfb_common::AppConfig;
use sfb_telemetry::{
    FactoryId, FieldType, Normalizer, SystemKind, SystemPayload, TimestampSource, ValidationError,
};

const CONFIG: &str = r#"
[factories.factory_1]
id = 1
devices = ["00:1A:2B:3C:4D:5E"]

[factories.factory_2]
id = 2
devices = ["00-1A-2B-3C-4D-6F"]
"#;

fn normalizer() -> Normalizer {
    let config: AppConfig = CONFIG.parse().expect("config");
    Normalizer::from_config(&config)
}

#[test]
fn hvac_payload_is_coerced_and_resolved() {
    let captured = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    let record = normalizer()
        .normalize(
            &json!({
                "device_id": "00-1a-2b-3c-4d-5e",
                "system": "HVAC_System",
                "status": "ON",
                "temperature": "45.5",
                "ac_status": "ON",
                "timestamp": "2024-06-01 07:59:58"
            }),
            captured,
        )
        .unwrap();

    assert_eq!(record.factory_id, FactoryId(1));
    assert_eq!(record.system(), SystemKind::Hvac);
    assert_eq!(record.device_identity, "00:1a:2b:3c:4d:5e");
    assert_eq!(record.timestamp_source, TimestampSource::Device);
    assert_eq!(record.timestamp, Utc.with_ymd_and_hms(2024, 6, 1, 7, 59, 58).unwrap());
    let SystemPayload::Hvac(reading) = &record.payload else {
        panic!("expected hvac payload");
    };
    assert_eq!(reading.temperature, Some(45.5));
    assert_eq!(reading.ac_status.as_deref(), Some("ON"));
    assert_eq!(reading.furnace_status, None);
}

#[test]
fn missing_or_unparsable_timestamp_uses_capture_instant() {
    let captured = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    let normalizer = normalizer();
    for payload in [
        json!({"mac": "00:1a:2b:3c:4d:6f", "system": "battery", "status": "OK", "battery_level": 80}),
        json!({"mac": "00:1a:2b:3c:4d:6f", "system": "battery", "status": "OK", "ts": "soon"}),
    ] {
        let record = normalizer.normalize(&payload, captured).unwrap();
        assert_eq!(record.factory_id, FactoryId(2));
        assert_eq!(record.timestamp, captured);
        assert_eq!(record.timestamp_source, TimestampSource::Capture);
    }
}

#[test]
fn unmapped_device_is_rejected_before_payload_checks() {
    let err = normalizer()
        .normalize(&json!({"device_id": "ff:ff:ff:ff:ff:ff", "temperature": "hot"}), Utc::now())
        .unwrap_err();
    assert_eq!(err, ValidationError::UnmappedDevice("ff:ff:ff:ff:ff:ff".into()));
}

#[test]
fn required_fields_are_enforced() {
    let normalizer = normalizer();
    let err = normalizer
        .normalize(&json!({"system": "hvac", "status": "ON"}), Utc::now())
        .unwrap_err();
    assert_eq!(err, ValidationError::MissingField("device_id"));

    let err = normalizer
        .normalize(&json!({"device_id": "00:1a:2b:3c:4d:5e", "status": "ON"}), Utc::now())
        .unwrap_err();
    assert_eq!(err, ValidationError::MissingField("system"));

    let err = normalizer
        .normalize(
            &json!({"device_id": "00:1a:2b:3c:4d:5e", "system": "hvac", "status": null}),
            Utc::now(),
        )
        .unwrap_err();
    assert_eq!(err, ValidationError::MissingField("status"));

    let err = normalizer
        .normalize(
            &json!({"device_id": "00:1a:2b:3c:4d:5e", "system": "hvac", "temperature": "45.5"}),
            Utc::now(),
        )
        .unwrap_err();
    assert_eq!(err, ValidationError::MissingField("status"));
}

#[test]
fn every_failing_field_is_reported() {
    let err = normalizer()
        .normalize(
            &json!({
                "device_id": "00:1a:2b:3c:4d:5e",
                "system": "conveyor",
                "status": "RUNNING",
                "order_count": "many",
                "items_failed": 1.5,
                "conveyor_speed": "2.0"
            }),
            Utc::now(),
        )
        .unwrap_err();
    let ValidationError::InvalidFields(errors) = err else {
        panic!("expected invalid fields");
    };
    let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["order_count", "items_failed"]);
    assert!(errors.iter().all(|e| e.expected == FieldType::Integer));
}

#[test]
fn null_fields_are_absent_not_zero() {
    let record = normalizer()
        .normalize(
            &json!({
                "device_id": "00:1a:2b:3c:4d:5e",
                "system": "Weight_System",
                "status": "IDLE",
                "current_weight": null,
                "servo_pos": "90"
            }),
            Utc::now(),
        )
        .unwrap();
    let SystemPayload::Weight(reading) = record.payload else {
        panic!("expected weight payload");
    };
    assert_eq!(reading.current_weight, None);
    assert_eq!(reading.servo_angle, Some(90));
}

#[test]
fn fire_status_falls_back_to_status() {
    let record = normalizer()
        .normalize(
            &json!({
                "device_id": "00:1a:2b:3c:4d:5e",
                "system": "Fire_Control",
                "status": "FIRE DETECTED",
                "siren": "on",
                "sprinkler": 0
            }),
            Utc::now(),
        )
        .unwrap();
    let SystemPayload::FireControl(reading) = record.payload else {
        panic!("expected fire payload");
    };
    assert_eq!(reading.fire_status, "FIRE DETECTED");
    assert_eq!(reading.siren, Some(true));
    assert_eq!(reading.sprinkler, Some(false));
}

#[test]
fn unknown_systems_keep_their_fields() {
    let record = normalizer()
        .normalize(
            &json!({
                "device_id": "00:1a:2b:3c:4d:5e",
                "system": "Water Pump",
                "status": "OK",
                "pressure": 3.2,
                "valve": null
            }),
            Utc::now(),
        )
        .unwrap();
    assert_eq!(record.system(), SystemKind::Other("water_pump".into()));
    let fields = record.fields();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields["pressure"], json!(3.2));
}

#[test]
fn non_object_bodies_are_rejected() {
    let normalizer = normalizer();
    assert_eq!(
        normalizer.normalize(&json!([1, 2, 3]), Utc::now()).unwrap_err(),
        ValidationError::NotAnObject
    );
    assert!(matches!(
        normalizer.normalize_bytes(b"{not json", Utc::now()),
        Err(ValidationError::Malformed(_))
    ));
}
