//! ---
//! sfb_section: "11-simulation-test-harness"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Synthetic controller telemetry for exercising a running bridge."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::Args;
use rand::prelude::*;
use serde_json::{json, Value};
use tracing::{info, warn};
use url::Url;

const SYSTEMS: &[&str] = &[
    "Fire_Control",
    "HVAC_System",
    "Battery_System",
    "Weight_System",
    "Conveyor_Belt",
    "Garage_Door",
    "Safe_Room",
];

#[derive(Debug, Args)]
pub struct SimulateArgs {
    #[arg(long, default_value = "http://127.0.0.1:8000/telemetry", help = "Ingress URL")]
    target: Url,
    #[arg(long, help = "Device identity reported by the simulated controller")]
    device: String,
    #[arg(long, default_value_t = 1.0, help = "Payloads per second")]
    rate: f64,
    #[arg(long, default_value_t = 70, help = "Number of payloads to send (0 = unbounded)")]
    count: u64,
    #[arg(long, help = "Seed for reproducible readings")]
    seed: Option<u64>,
}

/// Emits payloads in the shape the factory controllers post.
#[derive(Debug)]
pub struct ControllerSimulator {
    device: String,
    rng: StdRng,
}

impl ControllerSimulator {
    pub fn new(device: impl Into<String>, seed: u64) -> Self {
        Self {
            device: device.into(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Payload for tick `tick`; systems rotate so every subsystem reports.
    pub fn next_payload(&mut self, tick: u64) -> Value {
        let system = SYSTEMS[(tick % SYSTEMS.len() as u64) as usize];
        let abnormal = self.rng.gen_bool(0.25);
        let mut payload = match system {
            "Fire_Control" => {
                let status = if abnormal { "FIRE DETECTED" } else { "SAFE" };
                json!({
                    "status": status,
                    "sensor_value": self.rng.gen_range(0..1024),
                    "siren": abnormal,
                    "sprinkler": if abnormal { "ON" } else { "OFF" },
                })
            }
            "HVAC_System" => {
                let temperature = if abnormal {
                    if self.rng.gen_bool(0.5) {
                        self.rng.gen_range(30.5..45.0)
                    } else {
                        self.rng.gen_range(5.0..14.5)
                    }
                } else {
                    self.rng.gen_range(16.0..29.0)
                };
                json!({
                    "status": "RUNNING",
                    "temperature": round(temperature),
                    "ac_status": if temperature > 30.0 { "ON" } else { "OFF" },
                    "furnace_status": if temperature < 15.0 { "ON" } else { "OFF" },
                })
            }
            "Battery_System" => {
                let level = if abnormal {
                    self.rng.gen_range(1.0..19.0)
                } else {
                    self.rng.gen_range(25.0..100.0)
                };
                json!({
                    "status": "OK",
                    "battery_level": round(level),
                    "led_intensity": self.rng.gen_range(0..=255),
                })
            }
            "Weight_System" => {
                let weight = if abnormal {
                    self.rng.gen_range(1001.0..2000.0)
                } else {
                    self.rng.gen_range(0.0..950.0)
                };
                json!({
                    "status": "OK",
                    "weight_val": round(weight),
                    "servo_pos": if abnormal { 90 } else { 0 },
                })
            }
            "Conveyor_Belt" => json!({
                "status": "RUNNING",
                "order_count": self.rng.gen_range(0..50),
                "sensor_value": round(self.rng.gen_range(0.5..2.0)),
                "items_failed": if abnormal { self.rng.gen_range(1..5) } else { 0 },
            }),
            "Garage_Door" => json!({
                "status": if abnormal { "OPEN" } else { "CLOSED" },
                "motion_status": if abnormal { "DETECTED" } else { "CLEAR" },
            }),
            _ => json!({
                "status": "LOCKED",
                "last_card": format!("{:08X}", self.rng.gen::<u32>()),
                "door": "CLOSED",
                "access_attempts": if abnormal { self.rng.gen_range(1..4) } else { 0 },
            }),
        };
        payload["device_id"] = json!(self.device);
        payload["system"] = json!(system);
        payload["timestamp"] = json!(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string());
        payload
    }
}

fn round(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub async fn run(args: SimulateArgs) -> Result<()> {
    if !(args.rate.is_finite() && args.rate > 0.0) {
        return Err(anyhow!("--rate must be a positive number"));
    }
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build http client")?;
    let seed = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut simulator = ControllerSimulator::new(args.device.clone(), seed);
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / args.rate));
    info!(url = %args.target, device = %args.device, rate = args.rate, seed, "simulation started");

    let mut tick = 0u64;
    while args.count == 0 || tick < args.count {
        interval.tick().await;
        let payload = simulator.next_payload(tick);
        match client.post(args.target.clone()).json(&payload).send().await {
            Ok(response) => {
                let status = response.status();
                let body: Value = response.json().await.unwrap_or(Value::Null);
                if status.is_success() {
                    info!(tick, system = %payload["system"], alerts = %body["alerts"], "payload accepted");
                } else {
                    warn!(tick, status = status.as_u16(), message = %body["message"], "payload refused");
                }
            }
            Err(err) => warn!(tick, error = %err, "failed to post payload"),
        }
        tick += 1;
    }
    info!(sent = tick, "simulation finished");
    Ok(())
}
