//! ---
//! sfb_section: "15-testing-qa-runbook"
//! sfb_subsection: "integration-tests"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Integration and validation tests for the bridge stack."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
//! End-to-end scenarios: HTTP ingress through the pipeline into the store.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use sfb_alerts::AlertLifecycleEngine;
use sfb_api::{spawn_api_server, ApiServer, ApiState};
use sfb_common::AppConfig;
use sfb_core::IngestPipeline;
use sfb_store::{Alert, AlertType, MemoryStore, Severity};
use sfb_telemetry::{FactoryId, Normalizer};

const DEVICE: &str = "00:1A:2B:3C:4D:5E";

fn config() -> AppConfig {
    r#"
[factories.factory_1]
id = 1
devices = ["00:1A:2B:3C:4D:5E"]
"#
    .parse()
    .expect("config")
}

fn pipeline(store: Arc<MemoryStore>) -> IngestPipeline {
    let config = config();
    let engine = AlertLifecycleEngine::from_config(store.clone(), &config.alerts);
    IngestPipeline::new(Normalizer::from_config(&config), store, engine)
}

struct Bridge {
    store: Arc<MemoryStore>,
    server: ApiServer,
    client: reqwest::Client,
}

impl Bridge {
    async fn start() -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = Arc::new(ApiState::new(Arc::new(pipeline(store.clone())), None));
        let server = spawn_api_server(state, "127.0.0.1:0".parse().unwrap()).expect("server");
        Self {
            store,
            server,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, payload: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("http://{}/telemetry", self.server.addr()))
            .json(&payload)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    fn alerts_of(&self, alert_type: AlertType) -> Vec<Alert> {
        self.store
            .alerts()
            .into_iter()
            .filter(|alert| alert.alert_type == alert_type)
            .collect()
    }
}

#[tokio::test]
async fn fire_alert_opens_and_resolves_in_place() {
    let bridge = Bridge::start().await;

    let (status, _) = bridge
        .post(json!({"device_id": DEVICE, "system": "fire_control", "status": "CRITICAL FIRE"}))
        .await;
    assert_eq!(status, 200);
    let alerts = bridge.alerts_of(AlertType::FireDetected);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert!(alerts[0].is_open());

    let (status, body) = bridge
        .post(json!({"device_id": DEVICE, "system": "fire_control", "status": "SAFE"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["alerts"][0]["transition"], "resolved");
    let alerts = bridge.alerts_of(AlertType::FireDetected);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].is_resolved);
    assert!(alerts[0].resolved_at.is_some());

    bridge.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn string_temperature_is_coerced_into_the_alert_message() {
    let bridge = Bridge::start().await;
    let (status, _) = bridge
        .post(json!({"device_id": DEVICE, "system": "hvac", "status": "RUNNING", "temperature": "45.5"}))
        .await;
    assert_eq!(status, 200);

    let alerts = bridge.alerts_of(AlertType::HighTemperature);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Warning);
    assert!(alerts[0].message.contains("45.5"));
    assert_eq!(bridge.store.telemetry()[0].payload["temperature"], json!(45.5));

    bridge.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn unmapped_identity_is_rejected_before_any_write() {
    let bridge = Bridge::start().await;
    for payload in [
        json!({"device_id": "11:22:33:44:55:66", "system": "fire_control", "status": "FIRE"}),
        json!({"device_id": "11:22:33:44:55:66"}),
        json!({"device_id": "11:22:33:44:55:66", "system": "hvac", "status": "OK", "temperature": "hot"}),
    ] {
        let (status, body) = bridge.post(payload).await;
        assert_eq!(status, 422);
        assert!(body["message"].as_str().unwrap().contains("not mapped"));
    }
    assert!(bridge.store.telemetry().is_empty());
    assert!(bridge.store.alerts().is_empty());
    assert!(bridge.store.last_data_received(FactoryId(1)).is_none());

    bridge.server.shutdown().await.unwrap();
}

async fn submit_in_order(first: Value, second: Value) -> Vec<Alert> {
    let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(5)));
    let pipeline = pipeline(store.clone());
    let (a, b) = tokio::join!(
        pipeline.ingest(&first, Utc::now()),
        pipeline.ingest(&second, Utc::now())
    );
    a.unwrap();
    b.unwrap();
    store
        .alerts()
        .into_iter()
        .filter(|alert| alert.alert_type == AlertType::HighTemperature)
        .collect()
}

#[tokio::test]
async fn later_submission_determines_final_state() {
    let hot = json!({"device_id": DEVICE, "system": "hvac", "status": "OK", "temperature": 40});
    let mild = json!({"device_id": DEVICE, "system": "hvac", "status": "OK", "temperature": 22});

    let alerts = submit_in_order(hot.clone(), mild.clone()).await;
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].is_resolved);

    let alerts = submit_in_order(mild, hot).await;
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].is_open());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_keep_one_open_alert() {
    let store = Arc::new(
        MemoryStore::new()
            .with_unique_open(false)
            .with_latency(Duration::from_millis(2)),
    );
    let state = Arc::new(ApiState::new(Arc::new(pipeline(store.clone())), None));
    let server = spawn_api_server(state, "127.0.0.1:0".parse().unwrap()).unwrap();
    let url = format!("http://{}/telemetry", server.addr());
    let client = reqwest::Client::new();

    let requests = (0..16).map(|i| {
        let client = client.clone();
        let url = url.clone();
        async move {
            client
                .post(url)
                .json(&json!({
                    "device_id": DEVICE,
                    "system": "battery",
                    "status": "OK",
                    "battery_level": 5 + i,
                }))
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        }
    });
    let statuses = futures::future::join_all(requests).await;
    assert!(statuses.iter().all(|status| *status == 200));

    let open: Vec<Alert> = store.alerts().into_iter().filter(Alert::is_open).collect();
    assert_eq!(open.len(), 1);
    assert_eq!(store.telemetry().len(), 16);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn reopen_after_resolve_creates_a_new_row() {
    let bridge = Bridge::start().await;
    for level in [10, 80, 12] {
        bridge
            .post(json!({"device_id": DEVICE, "system": "battery", "status": "OK", "battery_level": level}))
            .await;
    }
    let alerts = bridge.alerts_of(AlertType::LowBattery);
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts.iter().filter(|alert| alert.is_open()).count(), 1);
    assert_eq!(alerts.iter().filter(|alert| alert.is_resolved).count(), 1);

    bridge.server.shutdown().await.unwrap();
}
