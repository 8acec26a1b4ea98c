//! ---
//! sfb_section: "04-alert-lifecycle"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Alert condition rules and lifecycle state machine."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use sfb_common::AlertsConfig;
use sfb_logging::{log_alert_transition, LogContext, TransitionOutcome};
use sfb_store::{Alert, AlertId, AlertKey, AlertType, NewAlert, SharedStore};
use sfb_telemetry::CanonicalRecord;

use crate::locks::{KeyedLocks, Reservation};
use crate::rules::{alert_types_for, evaluate, Evaluation, Thresholds};
use crate::{AlertError, Result};

/// What happened to one key while applying a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// NONE or CLOSED to OPEN: a new alert row.
    Created,
    /// OPEN stays OPEN with a new message.
    Refreshed,
    /// OPEN stays OPEN; refresh skipped by the cooldown.
    Throttled,
    /// OPEN to CLOSED.
    Resolved,
    /// Normal reading with no open alert.
    Unchanged,
    /// The store failed; state for this key is as it was.
    Failed(String),
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Created => "created",
            Transition::Refreshed => "refreshed",
            Transition::Throttled => "throttled",
            Transition::Resolved => "resolved",
            Transition::Unchanged => "unchanged",
            Transition::Failed(_) => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Transition::Failed(_))
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Transition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Outcome for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOutcome {
    pub key: AlertKey,
    pub transition: Transition,
    /// Alert row touched, when there was one.
    pub alert_id: Option<AlertId>,
}

/// Per-key outcomes of applying one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    pub outcomes: Vec<KeyOutcome>,
}

impl EvaluationReport {
    /// Transition recorded for an alert type, if it was evaluated.
    pub fn transition(&self, alert_type: AlertType) -> Option<&Transition> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.key.alert_type == alert_type)
            .map(|outcome| &outcome.transition)
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.transition.is_failure())
            .count()
    }
}

/// Drives the create / refresh / resolve state machine against the store.
pub struct AlertLifecycleEngine {
    store: SharedStore,
    thresholds: Thresholds,
    refresh_cooldown: Duration,
    locks: Arc<KeyedLocks>,
}

impl AlertLifecycleEngine {
    pub fn new(store: SharedStore, thresholds: Thresholds) -> Self {
        Self {
            store,
            thresholds,
            refresh_cooldown: Duration::ZERO,
            locks: KeyedLocks::new(),
        }
    }

    /// Engine configured from the `[alerts]` section.
    pub fn from_config(store: SharedStore, config: &AlertsConfig) -> Self {
        Self::new(store, Thresholds::from(config)).with_refresh_cooldown(config.refresh_cooldown)
    }

    /// Skip refreshes of alerts updated less than `cooldown` ago. Zero disables.
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn locks(&self) -> &Arc<KeyedLocks> {
        &self.locks
    }

    /// Keys a record can touch.
    pub fn keys_for(record: &CanonicalRecord) -> Vec<AlertKey> {
        let system = record.system();
        alert_types_for(&system)
            .iter()
            .map(|alert_type| AlertKey::new(record.factory_id, system.clone(), *alert_type))
            .collect()
    }

    /// Reserve every key the record can touch. Call on arrival, before any
    /// store write, so per-key processing follows arrival order.
    pub async fn reserve(&self, record: &CanonicalRecord) -> Reservation {
        self.locks.reserve(Self::keys_for(record)).await
    }

    /// Reserve then apply.
    pub async fn process(&self, record: &CanonicalRecord) -> EvaluationReport {
        let reservation = self.reserve(record).await;
        self.apply(&reservation, record).await
    }

    /// Evaluate the record and apply one transition per evaluated key.
    /// A failing key is reported and does not stop the others.
    pub async fn apply(&self, reservation: &Reservation, record: &CanonicalRecord) -> EvaluationReport {
        let system = record.system();
        let mut report = EvaluationReport::default();
        for evaluation in evaluate(record, &self.thresholds) {
            let key = AlertKey::new(record.factory_id, system.clone(), evaluation.alert_type);
            let context = LogContext::new()
                .with_factory(record.factory_id.get())
                .with_system(system.as_str())
                .with_alert_type(evaluation.alert_type.as_str())
                .with_device(&record.device_identity);

            let result = if reservation.covers(&key) {
                self.transition(&key, &evaluation, Utc::now()).await
            } else {
                Err(AlertError::NotReserved(key.clone()))
            };
            let outcome = match result {
                Ok((transition, alert_id)) => {
                    log_alert_transition(&context, transition.as_str(), alert_id, TransitionOutcome::Committed);
                    KeyOutcome {
                        key,
                        transition,
                        alert_id,
                    }
                }
                Err(err) => {
                    log_alert_transition(&context, "failed", None, TransitionOutcome::Fault);
                    sfb_logging::sfb_error!(context = context, "alert evaluation failed: {}", err);
                    KeyOutcome {
                        key,
                        transition: Transition::Failed(err.to_string()),
                        alert_id: None,
                    }
                }
            };
            report.outcomes.push(outcome);
        }
        report
    }

    async fn transition(
        &self,
        key: &AlertKey,
        evaluation: &Evaluation,
        now: DateTime<Utc>,
    ) -> Result<(Transition, Option<AlertId>)> {
        let open = self
            .store
            .find_open_alert(key)
            .await
            .map_err(AlertError::store("find_open_alert"))?;

        match (evaluation.abnormal, open) {
            (true, None) => self.create(key, &evaluation.message, now).await,
            (true, Some(alert)) => self.refresh(alert, &evaluation.message, now).await,
            (false, Some(alert)) => {
                let resolved = self
                    .store
                    .resolve_alert(alert.id, now)
                    .await
                    .map_err(AlertError::store("resolve_alert"))?;
                Ok((Transition::Resolved, Some(resolved.id)))
            }
            (false, None) => Ok((Transition::Unchanged, None)),
        }
    }

    async fn create(
        &self,
        key: &AlertKey,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<(Transition, Option<AlertId>)> {
        match self.store.insert_alert(&NewAlert::open(key, message, now)).await {
            Ok(alert) => Ok((Transition::Created, Some(alert.id))),
            Err(err) if err.is_conflict() => {
                // Another writer opened the key first; continue on its row.
                debug!(%key, "insert conflict, falling back to refresh");
                let existing = self
                    .store
                    .find_open_alert(key)
                    .await
                    .map_err(AlertError::store("find_open_alert"))?
                    .ok_or_else(|| AlertError::ConflictVanished(key.clone()))?;
                self.refresh(existing, message, now).await
            }
            Err(err) => Err(AlertError::store("insert_alert")(err)),
        }
    }

    async fn refresh(
        &self,
        alert: Alert,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<(Transition, Option<AlertId>)> {
        if self.within_cooldown(&alert, now) {
            return Ok((Transition::Throttled, Some(alert.id)));
        }
        let updated = self
            .store
            .update_alert(alert.id, message, now)
            .await
            .map_err(AlertError::store("update_alert"))?;
        Ok((Transition::Refreshed, Some(updated.id)))
    }

    fn within_cooldown(&self, alert: &Alert, now: DateTime<Utc>) -> bool {
        if self.refresh_cooldown.is_zero() {
            return false;
        }
        match (now - alert.updated_at).to_std() {
            Ok(elapsed) => elapsed < self.refresh_cooldown,
            // updated_at ahead of the local clock
            Err(_) => true,
        }
    }
}
