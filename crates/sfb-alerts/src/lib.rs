//! ---
//! sfb_section: "04-alert-lifecycle"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Alert condition rules and lifecycle state machine."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
//! Alert lifecycle engine.
//!
//! Each canonical record is evaluated against the condition table of its
//! subsystem. Every `(factory, system, alert type)` key then moves through
//! NONE / OPEN / CLOSED: a TRUE verdict opens or refreshes the single open
//! alert, a FALSE verdict resolves it. The check-then-act sequence per key
//! runs under a FIFO lock reserved when the record arrives.

pub mod engine;
pub mod locks;
pub mod rules;

use sfb_store::{AlertKey, StoreError};

/// Result alias used throughout the alerts crate.
pub type Result<T> = std::result::Result<T, AlertError>;

/// Failure while driving one key's lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The store failed the named operation.
    #[error("{operation} failed: {source}")]
    Store {
        /// Store operation label.
        operation: &'static str,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
    /// Insert hit the uniqueness backstop but no open alert could be found.
    #[error("open alert for {0} vanished after insert conflict")]
    ConflictVanished(AlertKey),
    /// The caller applied a record without holding the key's lock.
    #[error("no reservation held for {0}")]
    NotReserved(AlertKey),
}

impl AlertError {
    pub(crate) fn store(operation: &'static str) -> impl FnOnce(StoreError) -> AlertError {
        move |source| AlertError::Store { operation, source }
    }
}

pub use engine::{AlertLifecycleEngine, EvaluationReport, KeyOutcome, Transition};
pub use locks::{KeyedLocks, Reservation};
pub use rules::{alert_types_for, evaluate, Evaluation, Thresholds};
