//! ---
//! sfb_section: "03-persistence-logging"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Store port and adapters for telemetry history and alerts."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use sfb_telemetry::FactoryId;

use crate::model::{Alert, AlertFilter, AlertId, AlertKey, NewAlert, NewTelemetry, StoreOp, TelemetryRow};
use crate::{BridgeStore, Result, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    next_telemetry_id: i64,
    next_alert_id: AlertId,
    telemetry: Vec<TelemetryRow>,
    alerts: BTreeMap<AlertId, Alert>,
    heartbeats: HashMap<FactoryId, DateTime<Utc>>,
}

/// In-process store guarded by a `parking_lot` mutex.
///
/// Optionally enforces the one-open-alert-per-key uniqueness rule the way a
/// partial unique index would, and can inject latency or failures per
/// operation for tests.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    enforce_unique_open: bool,
    latency: Option<Duration>,
    failing: Mutex<HashSet<StoreOp>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store enforcing open-alert uniqueness.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            enforce_unique_open: true,
            latency: None,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Toggle the uniqueness backstop.
    pub fn with_unique_open(mut self, enforce: bool) -> Self {
        self.enforce_unique_open = enforce;
        self
    }

    /// Delay every operation by `latency` before it touches state.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make `op` fail with [`StoreError::Unavailable`] until [`Self::recover`].
    pub fn fail(&self, op: StoreOp) {
        self.failing.lock().insert(op);
    }

    /// Stop failing `op`.
    pub fn recover(&self, op: StoreOp) {
        self.failing.lock().remove(&op);
    }

    /// Snapshot of every alert row, ordered by id.
    pub fn alerts(&self) -> Vec<Alert> {
        self.state.lock().alerts.values().cloned().collect()
    }

    /// Snapshot of the telemetry history.
    pub fn telemetry(&self) -> Vec<TelemetryRow> {
        self.state.lock().telemetry.clone()
    }

    /// Last heartbeat recorded for a factory.
    pub fn last_data_received(&self, factory: FactoryId) -> Option<DateTime<Utc>> {
        self.state.lock().heartbeats.get(&factory).copied()
    }

    async fn enter(&self, op: StoreOp) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.lock().contains(&op) {
            return Err(StoreError::Unavailable(format!("{} disabled", op.as_str())));
        }
        Ok(())
    }
}

fn open_alert<'a>(alerts: &'a mut BTreeMap<AlertId, Alert>, id: AlertId) -> Result<&'a mut Alert> {
    alerts
        .get_mut(&id)
        .filter(|alert| alert.is_open())
        .ok_or(StoreError::NotFound(id))
}

#[async_trait]
impl BridgeStore for MemoryStore {
    async fn insert_telemetry(&self, row: &NewTelemetry) -> Result<TelemetryRow> {
        self.enter(StoreOp::InsertTelemetry).await?;
        let mut state = self.state.lock();
        state.next_telemetry_id += 1;
        let stored = TelemetryRow::from_new(state.next_telemetry_id, row);
        state.telemetry.push(stored.clone());
        Ok(stored)
    }

    async fn touch_factory(&self, factory: FactoryId, at: DateTime<Utc>) -> Result<()> {
        self.enter(StoreOp::TouchFactory).await?;
        self.state.lock().heartbeats.insert(factory, at);
        Ok(())
    }

    async fn insert_alert(&self, alert: &NewAlert) -> Result<Alert> {
        self.enter(StoreOp::InsertAlert).await?;
        let key = alert.key();
        let mut state = self.state.lock();
        if self.enforce_unique_open
            && state
                .alerts
                .values()
                .any(|existing| existing.is_open() && existing.key() == key)
        {
            return Err(StoreError::Conflict(key));
        }
        state.next_alert_id += 1;
        let stored = Alert {
            id: state.next_alert_id,
            factory_id: alert.factory_id,
            system: alert.system.clone(),
            alert_type: alert.alert_type,
            message: alert.message.clone(),
            severity: alert.severity,
            is_resolved: false,
            is_acknowledged: false,
            created_at: alert.created_at,
            updated_at: alert.updated_at,
            resolved_at: None,
            acknowledged_at: None,
        };
        state.alerts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_open_alert(&self, key: &AlertKey) -> Result<Option<Alert>> {
        self.enter(StoreOp::FindOpenAlert).await?;
        let state = self.state.lock();
        Ok(state
            .alerts
            .values()
            .rev()
            .find(|alert| alert.is_open() && &alert.key() == key)
            .cloned())
    }

    async fn update_alert(&self, id: AlertId, message: &str, at: DateTime<Utc>) -> Result<Alert> {
        self.enter(StoreOp::UpdateAlert).await?;
        let mut state = self.state.lock();
        let alert = open_alert(&mut state.alerts, id)?;
        alert.message = message.to_owned();
        alert.updated_at = at;
        Ok(alert.clone())
    }

    async fn resolve_alert(&self, id: AlertId, at: DateTime<Utc>) -> Result<Alert> {
        self.enter(StoreOp::ResolveAlert).await?;
        let mut state = self.state.lock();
        let alert = open_alert(&mut state.alerts, id)?;
        alert.is_resolved = true;
        alert.resolved_at = Some(at);
        alert.updated_at = at;
        Ok(alert.clone())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        self.enter(StoreOp::ListAlerts).await?;
        let state = self.state.lock();
        let mut alerts: Vec<Alert> = state
            .alerts
            .values()
            .filter(|alert| filter.matches(alert))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            alerts.truncate(limit);
        }
        Ok(alerts)
    }

    async fn acknowledge_alert(&self, id: AlertId, at: DateTime<Utc>) -> Result<Alert> {
        self.enter(StoreOp::AcknowledgeAlert).await?;
        let mut state = self.state.lock();
        let alert = state.alerts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !alert.is_acknowledged {
            alert.is_acknowledged = true;
            alert.acknowledged_at = Some(at);
        }
        Ok(alert.clone())
    }
}
