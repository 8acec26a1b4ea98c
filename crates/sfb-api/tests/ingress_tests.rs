//! ---
//! sfb_section: "05-networking-external-interfaces"
//! sfb_subsection: "integration-tests"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "HTTP ingress and read-side API."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};
use sfb_api::{spawn_api_server, ApiServer, ApiState};
use sfb_common::AppConfig;
use sfb_core::build_pipeline;
use sfb_metrics::new_registry;
use sfb_store::StoreOp;

const CONFIG: &str = r#"
[factories.factory_1]
id = 1
devices = ["00:1A:2B:3C:4D:5E"]
"#;

async fn start(with_metrics: bool) -> (ApiServer, String) {
    let config: AppConfig = CONFIG.parse().expect("config");
    let registry = with_metrics.then(new_registry);
    let pipeline = build_pipeline(&config, registry.as_ref()).expect("pipeline");
    let state = Arc::new(ApiState::new(Arc::new(pipeline), registry));
    let server = spawn_api_server(state, "127.0.0.1:0".parse().unwrap()).expect("server");
    let base = format!("http://{}", server.addr());
    (server, base)
}

async fn post(client: &reqwest::Client, url: &str, body: &str) -> (StatusCode, Value) {
    let response = client
        .post(url)
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn telemetry_is_accepted_without_content_type() {
    let (server, base) = start(false).await;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        &format!("{base}/telemetry"),
        r#"{"device_id":"00-1a-2b-3c-4d-5e","system":"HVAC_System","status":"RUNNING","temperature":45.5}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["factory_id"], 1);
    assert_eq!(body["system"], "hvac");
    let alerts = body["alerts"].as_array().unwrap();
    let high = alerts
        .iter()
        .find(|alert| alert["alert_type"] == "HIGH_TEMPERATURE")
        .unwrap();
    assert_eq!(high["transition"], "created");
    assert!(high["alert_id"].is_i64());
    assert!(alerts.contains(&json!({"alert_type": "LOW_TEMPERATURE", "transition": "unchanged"})));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn root_path_accepts_controller_posts() {
    let (server, base) = start(false).await;
    let client = reqwest::Client::new();
    let (status, body) = post(
        &client,
        &format!("{base}/"),
        r#"{"mac":"00:1A:2B:3C:4D:5E","system":"garage","status":"OPEN","motion_status":"CLEAR"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alerts"], json!([]));
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn error_statuses_follow_failure_class() {
    let (server, base) = start(false).await;
    let client = reqwest::Client::new();
    let url = format!("{base}/telemetry");

    let (status, body) = post(&client, &url, "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, _) = post(&client, &url, "[1, 2, 3]").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(
        &client,
        &url,
        r#"{"device_id":"ff:ff:ff:ff:ff:ff","system":"hvac","status":"OK"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("ff:ff:ff:ff:ff:ff"));

    let (status, body) = post(
        &client,
        &url,
        r#"{"device_id":"00:1a:2b:3c:4d:5e","system":"hvac","status":"OK","temperature":"warm"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("temperature"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn alerts_can_be_listed_and_acknowledged() {
    let (server, base) = start(false).await;
    let client = reqwest::Client::new();
    let url = format!("{base}/telemetry");
    post(
        &client,
        &url,
        r#"{"device_id":"00:1a:2b:3c:4d:5e","system":"fire_control","status":"FIRE"}"#,
    )
    .await;

    let open: Vec<Value> = client
        .get(format!("{base}/alerts?factory_id=1&open=true"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0]["alert_type"], "FIRE_DETECTED");
    assert_eq!(open[0]["severity"], "CRITICAL");
    let id = open[0]["id"].as_i64().unwrap();

    let (status, acked) = post(&client, &format!("{base}/alerts/{id}/acknowledge"), "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acked["is_acknowledged"], true);
    assert_eq!(acked["is_resolved"], false);

    let (status, _) = post(&client, &format!("{base}/alerts/999/acknowledge"), "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn health_and_metrics_endpoints() {
    let (server, base) = start(true).await;
    let client = reqwest::Client::new();
    post(
        &client,
        &format!("{base}/telemetry"),
        r#"{"device_id":"00:1a:2b:3c:4d:5e","system":"battery","status":"OK","battery_level":80}"#,
    )
    .await;
    let health: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["mapped_devices"], 1);

    let metrics = reqwest::get(format!("{base}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("sfb_telemetry_accepted_total{factory=\"1\",system=\"battery\"} 1"));
    assert!(metrics.contains("sfb_store_operations_total"));
    server.shutdown().await.unwrap();

    let (server, base) = start(false).await;
    let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn store_failure_maps_to_bad_gateway() {
    use sfb_alerts::AlertLifecycleEngine;
    use sfb_core::IngestPipeline;
    use sfb_store::MemoryStore;
    use sfb_telemetry::Normalizer;

    let config: AppConfig = CONFIG.parse().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.fail(StoreOp::InsertTelemetry);
    let engine = AlertLifecycleEngine::from_config(store.clone(), &config.alerts);
    let pipeline = IngestPipeline::new(Normalizer::from_config(&config), store.clone(), engine);
    let state = Arc::new(ApiState::new(Arc::new(pipeline), None));
    let server = spawn_api_server(state, "127.0.0.1:0".parse().unwrap()).unwrap();

    let client = reqwest::Client::new();
    let (status, body) = post(
        &client,
        &format!("http://{}/telemetry", server.addr()),
        r#"{"device_id":"00:1a:2b:3c:4d:5e","system":"fire_control","status":"FIRE"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], "error");
    assert!(store.alerts().is_empty());
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn client_hangup_does_not_cancel_alert_evaluation() {
    use std::time::Duration;

    use sfb_alerts::AlertLifecycleEngine;
    use sfb_core::IngestPipeline;
    use sfb_store::{AlertType, MemoryStore};
    use sfb_telemetry::Normalizer;

    let config: AppConfig = CONFIG.parse().unwrap();
    let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(20)));
    let engine = AlertLifecycleEngine::from_config(store.clone(), &config.alerts);
    let pipeline = IngestPipeline::new(Normalizer::from_config(&config), store.clone(), engine);
    let state = Arc::new(ApiState::new(Arc::new(pipeline), None));
    let server = spawn_api_server(state, "127.0.0.1:0".parse().unwrap()).unwrap();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(30))
        .build()
        .unwrap();
    let sent = client
        .post(format!("http://{}/telemetry", server.addr()))
        .body(r#"{"device_id":"00:1a:2b:3c:4d:5e","system":"hvac","status":"RUNNING","temperature":45.5}"#)
        .send()
        .await;
    assert!(sent.is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(store.telemetry().len(), 1);
    assert!(store
        .alerts()
        .iter()
        .any(|alert| alert.alert_type == AlertType::HighTemperature && alert.is_open()));
    server.shutdown().await.unwrap();
}
