//! ---
//! sfb_section: "04-alert-lifecycle"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Alert condition rules and lifecycle state machine."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
//! Keyed mutual exclusion.
//!
//! One FIFO `tokio` mutex per alert key, created on demand and dropped once
//! no holder or waiter remains. A record reserves all of its keys at once in
//! ascending key order, so two records never wait on each other crosswise.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use sfb_store::AlertKey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// Registry of per-key locks.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<AlertKey, Slot>>,
}

impl KeyedLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of keys currently held or awaited.
    pub fn active(&self) -> usize {
        self.slots.lock().len()
    }

    fn slot(&self, key: &AlertKey) -> Slot {
        self.slots.lock().entry(key.clone()).or_default().clone()
    }

    /// Acquire every key, waiting in arrival order behind earlier holders.
    pub async fn reserve<I>(self: &Arc<Self>, keys: I) -> Reservation
    where
        I: IntoIterator<Item = AlertKey>,
    {
        let ordered: BTreeSet<AlertKey> = keys.into_iter().collect();
        let mut held = Vec::with_capacity(ordered.len());
        for key in ordered {
            let slot = self.slot(&key);
            let guard = slot.clone().lock_owned().await;
            held.push(KeyGuard {
                key,
                slot,
                guard: Some(guard),
                locks: Arc::clone(self),
            });
        }
        Reservation { held }
    }

    fn release(&self, key: &AlertKey, slot: &Slot) {
        let mut slots = self.slots.lock();
        let idle = slots
            .get(key)
            .map(|current| Arc::ptr_eq(current, slot) && Arc::strong_count(slot) == 2)
            .unwrap_or(false);
        if idle {
            slots.remove(key);
        }
    }
}

#[derive(Debug)]
struct KeyGuard {
    key: AlertKey,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<KeyedLocks>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Unlock before inspecting the count: the guard owns a clone of the slot.
        drop(self.guard.take());
        self.locks.release(&self.key, &self.slot);
    }
}

/// Locks held for one record, released on drop.
#[derive(Debug)]
pub struct Reservation {
    held: Vec<KeyGuard>,
}

impl Reservation {
    /// Whether this reservation holds `key`.
    pub fn covers(&self, key: &AlertKey) -> bool {
        self.held.iter().any(|guard| &guard.key == key)
    }

    /// Keys held, in acquisition order.
    pub fn keys(&self) -> impl Iterator<Item = &AlertKey> {
        self.held.iter().map(|guard| &guard.key)
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}
