//! ---
//! sfb_section: "01-core-functionality"
//! sfb_subsection: "integration-tests"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Ingest pipeline and runtime wiring."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sfb_alerts::{AlertLifecycleEngine, Transition};
use sfb_common::AppConfig;
use sfb_core::{build_pipeline, IngestPipeline, PipelineError};
use sfb_metrics::{new_registry, BridgeMetrics};
use sfb_store::{AlertType, MemoryStore, StoreOp};
use sfb_telemetry::{FactoryId, Normalizer, ValidationError};

fn config() -> AppConfig {
    r#"
[factories.factory_1]
id = 1
devices = ["00:1A:2B:3C:4D:5E"]

[factories.factory_2]
id = 2
devices = ["AA-BB-CC-DD-EE-FF"]
"#
    .parse()
    .expect("config")
}

fn pipeline(store: Arc<MemoryStore>) -> IngestPipeline {
    let config = config();
    let engine = AlertLifecycleEngine::from_config(store.clone(), &config.alerts);
    IngestPipeline::new(Normalizer::from_config(&config), store, engine)
}

#[tokio::test]
async fn accepted_record_is_persisted_and_heartbeats_factory() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store.clone());
    let body = br#"{"device_id":"00:1a:2b:3c:4d:5e","system":"HVAC_System","status":"RUNNING","temperature":"31.5"}"#;

    let outcome = pipeline.ingest_bytes(body, Utc::now()).await.unwrap();

    assert_eq!(outcome.record.factory_id, FactoryId(1));
    assert_eq!(outcome.telemetry.payload["temperature"], json!(31.5));
    assert_eq!(
        outcome.report.transition(AlertType::HighTemperature),
        Some(&Transition::Created)
    );
    assert_eq!(
        outcome.report.transition(AlertType::LowTemperature),
        Some(&Transition::Unchanged)
    );
    assert_eq!(store.telemetry().len(), 1);
    assert!(store.last_data_received(FactoryId(1)).is_some());
    assert!(store.last_data_received(FactoryId(2)).is_none());
}

#[tokio::test]
async fn validation_failure_persists_nothing() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store.clone());

    let err = pipeline
        .ingest(&json!({"device_id": "de:ad:be:ef:00:01", "system": "hvac", "status": "OK"}), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::UnmappedDevice(_))
    ));
    assert_eq!(err.reason(), "unmapped_device");

    let err = pipeline.ingest_bytes(b"not json", Utc::now()).await.unwrap_err();
    assert_eq!(err.reason(), "malformed");

    assert!(store.telemetry().is_empty());
    assert!(store.alerts().is_empty());
}

#[tokio::test]
async fn telemetry_write_failure_skips_alert_evaluation() {
    let store = Arc::new(MemoryStore::new());
    store.fail(StoreOp::InsertTelemetry);
    let pipeline = pipeline(store.clone());

    let err = pipeline
        .ingest(
            &json!({"device_id": "aa:bb:cc:dd:ee:ff", "system": "fire_control", "status": "FIRE"}),
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Store(_)));
    assert!(store.alerts().is_empty());
    assert_eq!(pipeline.engine().locks().active(), 0);
}

#[tokio::test]
async fn dropped_submitter_still_evaluates_alerts() {
    let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(20)));
    let pipeline = Arc::new(pipeline(store.clone()));
    let body = br#"{"device_id":"00:1a:2b:3c:4d:5e","system":"hvac","status":"RUNNING","temperature":45.5}"#;

    let waited = tokio::time::timeout(
        Duration::from_millis(30),
        pipeline.submit(body.to_vec(), Utc::now()),
    )
    .await;
    assert!(waited.is_err(), "caller should give up before the record finishes");

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(store.telemetry().len(), 1);
    let open: Vec<_> = store
        .alerts()
        .into_iter()
        .filter(|alert| alert.alert_type == AlertType::HighTemperature && alert.is_open())
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(pipeline.engine().locks().active(), 0);
}

#[tokio::test]
async fn submit_returns_the_same_outcome_as_inline_ingest() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Arc::new(pipeline(store.clone()));

    let outcome = pipeline
        .submit(
            br#"{"device_id":"aa:bb:cc:dd:ee:ff","system":"fire_control","status":"FIRE"}"#.to_vec(),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.record.factory_id, FactoryId(2));
    assert_eq!(
        outcome.report.transition(AlertType::FireDetected),
        Some(&Transition::Created)
    );

    let err = pipeline.submit(b"{}".to_vec(), Utc::now()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(store.telemetry().len(), 1);
}

#[tokio::test]
async fn heartbeat_failure_does_not_fail_the_record() {
    let store = Arc::new(MemoryStore::new());
    store.fail(StoreOp::TouchFactory);
    let pipeline = pipeline(store.clone());

    let outcome = pipeline
        .ingest(
            &json!({"device_id": "aa:bb:cc:dd:ee:ff", "system": "battery", "status": "OK", "battery_level": 12}),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome.report.transition(AlertType::LowBattery),
        Some(&Transition::Created)
    );
    assert!(store.last_data_received(FactoryId(2)).is_none());
}

#[tokio::test]
async fn metrics_follow_outcomes() {
    let registry = new_registry();
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store).with_metrics(Some(BridgeMetrics::new(registry.clone()).unwrap()));

    pipeline
        .ingest(
            &json!({"device_id": "00:1a:2b:3c:4d:5e", "system": "weight", "status": "OK", "weight_val": 1500}),
            Utc::now(),
        )
        .await
        .unwrap();
    pipeline
        .ingest(&json!({"device_id": "00:1a:2b:3c:4d:5e", "status": "OK"}), Utc::now())
        .await
        .unwrap_err();

    let encoded = prometheus::TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap();
    assert!(encoded.contains("sfb_telemetry_accepted_total{factory=\"1\",system=\"weight\"} 1"));
    assert!(encoded.contains("sfb_telemetry_rejected_total{reason=\"missing_field\"} 1"));
    assert!(encoded.contains(
        "sfb_alert_transitions_total{alert_type=\"WEIGHT_EXCEEDED\",transition=\"created\"} 1"
    ));
}

#[tokio::test]
async fn pipeline_from_config_uses_instrumented_memory_store() {
    let registry = new_registry();
    let pipeline = build_pipeline(&config(), Some(&registry)).unwrap();
    pipeline
        .ingest(
            &json!({"device_id": "00:1a:2b:3c:4d:5e", "system": "garage", "status": "OPEN", "motion_status": "DETECTED"}),
            Utc::now(),
        )
        .await
        .unwrap();

    let encoded = prometheus::TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap();
    assert!(encoded.contains("sfb_store_operations_total"));
    assert_eq!(pipeline.normalizer().identities().len(), 2);
}
