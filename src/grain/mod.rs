//! Grain runtime: lifecycle, recovery and the event-raising pipeline.
//!
//! A [`Grain`] supplies the pure `apply` function of one entity type; the
//! [`GrainRuntime`] owns one entity's snapshot and archive bookkeeping and
//! drives every storage, observer and bus interaction around it.
//!
//! The runtime assumes a single writer per entity. Callers that need
//! concurrent access go through [`BatchingGrain`], which moves the runtime
//! into one task.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::archive::ArchiveState;
use crate::bus::EventProducer;
use crate::config::{ArchiveOptions, CoreOptions};
use crate::error::{GrainError, Result};
use crate::event::{DomainEvent, FullyEvent, StateKey};
use crate::observer::ObserverUnit;
use crate::registry::GrainRegistry;
use crate::snapshot::Snapshot;
use crate::storage::{ArchiveStorage, GrainStorage};

mod activation;
mod archiving;
mod batching;
mod raise;
mod snapshot_ops;
mod transaction;

pub use archiving::OverType;
pub use batching::{BatchingGrain, Decision};

use transaction::Transaction;

/// Behaviour of one entity type.
#[async_trait]
pub trait Grain: Send + Sync + 'static {
    /// Stable name of the entity type, used in logs, errors and config.
    const GRAIN_TYPE: &'static str;

    type Key: StateKey;
    type State: Default + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static;
    type Event: DomainEvent;

    /// Fold one event into the snapshot's domain state.
    ///
    /// Must be deterministic: replaying the log reproduces the same state.
    /// Version bookkeeping is handled by the runtime.
    fn apply(
        &self,
        snapshot: &mut Snapshot<Self::Key, Self::State>,
        event: &FullyEvent<Self::Key, Self::Event>,
    );

    /// Called once activation has recovered the snapshot.
    async fn on_activated(&self, _snapshot: &Snapshot<Self::Key, Self::State>) -> Result<()> {
        Ok(())
    }

    /// Called after the deactivation flush.
    async fn on_deactivated(&self, _snapshot: &Snapshot<Self::Key, Self::State>) -> Result<()> {
        Ok(())
    }
}

/// Lifecycle of a runtime instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Activating,
    Ready,
    Deactivating,
    Deactivated,
}

/// Runtime state for one entity.
pub struct GrainRuntime<G: Grain> {
    grain: G,
    state_id: G::Key,
    core: CoreOptions,
    archive_options: ArchiveOptions,
    storage: GrainStorage<G>,
    observers: ObserverUnit<G::Key>,
    producer: Option<Arc<dyn EventProducer>>,
    lifecycle: Lifecycle,
    snapshot: Snapshot<G::Key, G::State>,
    /// Version at which the snapshot was last durably written.
    saved_version: i64,
    /// Whether a snapshot row exists, selecting insert or update.
    snapshot_stored: bool,
    archive: ArchiveState,
    transaction: Option<Transaction<G>>,
}

impl<G: Grain> GrainRuntime<G> {
    /// Runtime with default options, no observers and no producer.
    pub fn new(grain: G, state_id: G::Key, storage: GrainStorage<G>) -> Self {
        Self {
            grain,
            snapshot: Snapshot::empty(state_id.clone()),
            state_id,
            core: CoreOptions::default(),
            archive_options: ArchiveOptions::default(),
            storage,
            observers: ObserverUnit::new(),
            producer: None,
            lifecycle: Lifecycle::Uninitialized,
            saved_version: 0,
            snapshot_stored: false,
            archive: ArchiveState::default(),
            transaction: None,
        }
    }

    /// Runtime wired from the binding registered for `G`.
    pub fn from_registry(registry: &GrainRegistry, grain: G, state_id: G::Key) -> Result<Self> {
        let binding = registry
            .get::<G>()
            .ok_or(GrainError::NotRegistered {
                grain_type: G::GRAIN_TYPE,
            })?;
        let mut runtime = Self::new(grain, state_id, binding.storage.clone())
            .with_options(binding.core.clone(), binding.archive.clone())
            .with_observers(binding.observers.clone());
        runtime.producer = binding.producer.clone();
        Ok(runtime)
    }

    pub fn with_options(mut self, core: CoreOptions, archive: ArchiveOptions) -> Self {
        self.core = core;
        self.archive_options = archive;
        self
    }

    pub fn with_observers(mut self, observers: ObserverUnit<G::Key>) -> Self {
        self.observers = observers;
        self
    }

    pub fn with_producer(mut self, producer: Arc<dyn EventProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn grain(&self) -> &G {
        &self.grain
    }

    pub fn state_id(&self) -> &G::Key {
        &self.state_id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn snapshot(&self) -> &Snapshot<G::Key, G::State> {
        &self.snapshot
    }

    pub fn state(&self) -> &G::State {
        &self.snapshot.state
    }

    pub fn version(&self) -> i64 {
        self.snapshot.version()
    }

    /// Version of the last durable snapshot write.
    pub fn saved_version(&self) -> i64 {
        self.saved_version
    }

    pub fn archive(&self) -> &ArchiveState {
        &self.archive
    }

    pub fn core_options(&self) -> &CoreOptions {
        &self.core
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Archive storage when archiving is switched on for this type.
    fn archives(&self) -> Option<&Arc<dyn ArchiveStorage<G::Key, G::State>>> {
        if self.archive_options.enabled {
            self.storage.archives.as_ref()
        } else {
            None
        }
    }

    fn archive_enabled(&self) -> bool {
        self.archives().is_some()
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Ready => Ok(()),
            lifecycle => Err(GrainError::NotActive {
                state_id: self.state_id.to_string(),
                lifecycle,
            }),
        }
    }

    /// Speculative transaction state must never reach storage outside a
    /// commit.
    fn ensure_no_transaction(&self) -> Result<()> {
        match &self.transaction {
            Some(tx) => Err(GrainError::TransactionPending {
                state_id: self.state_id.to_string(),
                start_version: tx.start_version,
            }),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.snapshot.base.is_over {
            return Err(GrainError::StateIsOver {
                grain_type: G::GRAIN_TYPE,
                state_id: self.state_id.to_string(),
            });
        }
        Ok(())
    }
}
