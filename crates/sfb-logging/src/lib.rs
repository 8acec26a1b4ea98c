//! ---
//! sfb_section: "03-persistence-logging"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Structured logging context and macros."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Context-carrying logging helpers used by the normalizer, the alert
//! engine and the ingress.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

#[doc(hidden)]
pub use tracing;

/// Initialize a baseline tracing subscriber suitable for tests and tools.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Factory identifier the event belongs to.
    pub factory: Option<i64>,
    /// Subsystem tag (`hvac`, `fire_control`, ...).
    pub system: Option<&'a str>,
    /// Alert condition, when the event concerns one lifecycle key.
    pub alert_type: Option<&'a str>,
    /// Reporting device identity.
    pub device: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a factory identifier.
    pub fn with_factory(mut self, factory: i64) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Attach a subsystem tag.
    pub fn with_system(mut self, system: &'a str) -> Self {
        self.system = Some(system);
        self
    }

    /// Attach an alert type.
    pub fn with_alert_type(mut self, alert_type: &'a str) -> Self {
        self.alert_type = Some(alert_type);
        self
    }

    /// Attach a device identity.
    pub fn with_device(mut self, device: &'a str) -> Self {
        self.device = Some(device);
        self
    }
}

/// Outcome attached to a lifecycle log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was committed (or deliberately skipped).
    Committed,
    /// The store rejected or failed the transition.
    Fault,
}

impl TransitionOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            TransitionOutcome::Committed => "committed",
            TransitionOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized alert lifecycle event.
pub fn log_alert_transition(
    context: &LogContext<'_>,
    transition: &str,
    alert_id: Option<i64>,
    outcome: TransitionOutcome,
) {
    match outcome {
        TransitionOutcome::Committed => tracing::event!(
            Level::INFO,
            event = "alert.transition",
            transition,
            outcome = outcome.as_str(),
            alert_id = alert_id.unwrap_or_default(),
            factory = context.factory.unwrap_or_default(),
            system = context.system.unwrap_or(""),
            alert_type = context.alert_type.unwrap_or(""),
            device = context.device.unwrap_or(""),
        ),
        TransitionOutcome::Fault => tracing::event!(
            Level::ERROR,
            event = "alert.transition",
            transition,
            outcome = outcome.as_str(),
            alert_id = alert_id.unwrap_or_default(),
            factory = context.factory.unwrap_or_default(),
            system = context.system.unwrap_or(""),
            alert_type = context.alert_type.unwrap_or(""),
            device = context.device.unwrap_or(""),
        ),
    }
}
