//! Shared fixtures for integration tests.
//!
//! Provides a ledger grain and in-memory stores kept as concrete types so
//! tests can inspect what was persisted.

#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use grainlog::config::{ArchiveOptions, CoreOptions};
use grainlog::storage::{GrainStorage, MemoryArchiveStore, MemoryEventStore, MemorySnapshotStore};
use grainlog::{DomainEvent, FullyEvent, Grain, GrainRuntime, Snapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LedgerEvent {
    Credited { amount: i64 },
    Debited { amount: i64 },
}

impl DomainEvent for LedgerEvent {
    fn type_code(&self) -> &'static str {
        match self {
            LedgerEvent::Credited { .. } => "Credited",
            LedgerEvent::Debited { .. } => "Debited",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub balance: i64,
    pub entries: Vec<i64>,
}

pub struct Ledger;

impl Grain for Ledger {
    const GRAIN_TYPE: &'static str = "ledger";

    type Key = i64;
    type State = LedgerState;
    type Event = LedgerEvent;

    fn apply(&self, snapshot: &mut Snapshot<i64, LedgerState>, event: &FullyEvent<i64, LedgerEvent>) {
        let delta = match event.event {
            LedgerEvent::Credited { amount } => amount,
            LedgerEvent::Debited { amount } => -amount,
        };
        snapshot.state.balance += delta;
        snapshot.state.entries.push(delta);
    }
}

pub fn credit(amount: i64) -> LedgerEvent {
    LedgerEvent::Credited { amount }
}

pub fn debit(amount: i64) -> LedgerEvent {
    LedgerEvent::Debited { amount }
}

pub struct Stores {
    pub events: Arc<MemoryEventStore<i64, LedgerEvent>>,
    pub snapshots: Arc<MemorySnapshotStore<i64, LedgerState>>,
    pub archives: Arc<MemoryArchiveStore<i64, LedgerState, LedgerEvent>>,
}

impl Stores {
    pub fn new() -> Self {
        let events = Arc::new(MemoryEventStore::new());
        Self {
            archives: Arc::new(MemoryArchiveStore::new(Arc::clone(&events))),
            events,
            snapshots: Arc::new(MemorySnapshotStore::new()),
        }
    }

    pub fn storage(&self) -> GrainStorage<Ledger> {
        GrainStorage {
            events: self.events.clone(),
            snapshots: self.snapshots.clone(),
            archives: Some(self.archives.clone()),
        }
    }

    /// A fresh, activated runtime over these stores.
    pub async fn runtime(&self, core: CoreOptions, archive: ArchiveOptions) -> GrainRuntime<Ledger> {
        let mut runtime =
            GrainRuntime::new(Ledger, 7, self.storage()).with_options(core, archive);
        runtime.activate().await.expect("activation");
        runtime
    }
}

pub fn snapshot_every(interval: i64) -> CoreOptions {
    CoreOptions {
        snapshot_version_interval: interval,
        ..CoreOptions::default()
    }
}
