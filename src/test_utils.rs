//! Test fixtures: an account grain, observers and wired in-memory stores.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::bus::{BusError, FrameHandler, Result as BusResult};
use crate::codec::EventBytes;
use crate::event::{DomainEvent, FullyEvent};
use crate::grain::Grain;
use crate::observer::{FollowHandler, Observer};
use crate::snapshot::Snapshot;
use crate::storage::{GrainStorage, MemoryArchiveStore, MemoryEventStore, MemorySnapshotStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AccountEvent {
    Deposited { amount: i64 },
    Withdrawn { amount: i64 },
}

impl DomainEvent for AccountEvent {
    fn type_code(&self) -> &'static str {
        match self {
            AccountEvent::Deposited { .. } => "Deposited",
            AccountEvent::Withdrawn { .. } => "Withdrawn",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: i64,
    pub transactions: u32,
}

/// Grain keeping a running balance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Account;

impl Grain for Account {
    const GRAIN_TYPE: &'static str = "account";

    type Key = i64;
    type State = AccountState;
    type Event = AccountEvent;

    fn apply(&self, snapshot: &mut Snapshot<i64, AccountState>, event: &FullyEvent<i64, AccountEvent>) {
        match event.event {
            AccountEvent::Deposited { amount } => snapshot.state.balance += amount,
            AccountEvent::Withdrawn { amount } => snapshot.state.balance -= amount,
        }
        snapshot.state.transactions += 1;
    }
}

pub fn deposit(amount: i64) -> AccountEvent {
    AccountEvent::Deposited { amount }
}

/// In-memory stores kept as concrete types so tests can flip failure
/// switches and inspect contents.
pub struct MemoryStores {
    pub events: Arc<MemoryEventStore<i64, AccountEvent>>,
    pub snapshots: Arc<MemorySnapshotStore<i64, AccountState>>,
    pub archives: Arc<MemoryArchiveStore<i64, AccountState, AccountEvent>>,
}

impl MemoryStores {
    pub fn new() -> Self {
        let events = Arc::new(MemoryEventStore::new());
        Self {
            archives: Arc::new(MemoryArchiveStore::new(Arc::clone(&events))),
            events,
            snapshots: Arc::new(MemorySnapshotStore::new()),
        }
    }

    pub fn storage(&self) -> GrainStorage<Account> {
        GrainStorage {
            events: self.events.clone(),
            snapshots: self.snapshots.clone(),
            archives: Some(self.archives.clone()),
        }
    }
}

/// Observer reporting a settable processed version.
pub struct LaggingObserver {
    version: AtomicI64,
    frames: AtomicUsize,
    fail_on_handle: std::sync::atomic::AtomicBool,
}

impl LaggingObserver {
    pub fn new(version: i64) -> Self {
        Self {
            version: AtomicI64::new(version),
            frames: AtomicUsize::new(0),
            fail_on_handle: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn set_version(&self, version: i64) {
        self.version.store(version, Ordering::SeqCst);
    }

    pub fn set_fail_on_handle(&self, fail: bool) {
        self.fail_on_handle.store(fail, Ordering::SeqCst);
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Observer<i64> for LaggingObserver {
    fn name(&self) -> &str {
        "lagging"
    }

    async fn get_and_save_version(&self, _state_id: &i64, _src_version: i64) -> BusResult<i64> {
        Ok(self.version.load(Ordering::SeqCst))
    }

    async fn handle(&self, _frame: Bytes) -> BusResult<()> {
        if self.fail_on_handle.load(Ordering::SeqCst) {
            return Err(BusError::ObserverFailed {
                name: "lagging".to_string(),
                message: "injected".to_string(),
            });
        }
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Follow handler recording the versions it saw.
#[derive(Default)]
pub struct RecordingFollow {
    seen: RwLock<Vec<(i64, i64)>>,
}

impl RecordingFollow {
    /// `(state_id, version)` pairs in delivery order.
    pub async fn seen(&self) -> Vec<(i64, i64)> {
        self.seen.read().await.clone()
    }
}

#[async_trait]
impl FollowHandler for RecordingFollow {
    type Key = i64;
    type Event = AccountEvent;

    async fn on_event(&self, event: &FullyEvent<i64, AccountEvent>) -> BusResult<()> {
        self.seen.write().await.push((event.state_id, event.version()));
        Ok(())
    }
}

/// Frame handler counting deliveries.
pub struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.count)
    }
}

impl FrameHandler for CountingHandler {
    fn handle(&self, _frame: Bytes) -> BoxFuture<'static, BusResult<()>> {
        let count = Arc::clone(&self.count);
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Frame for an account event.
pub fn frame(state_id: i64, version: i64, amount: i64) -> Bytes {
    let event = FullyEvent::new(
        state_id,
        deposit(amount),
        crate::event::EventBase::new(version, 1_000 + version),
    );
    EventBytes::from_event(&event)
        .and_then(|b| b.to_frame())
        .unwrap()
}
