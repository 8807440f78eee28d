//! Init-time registry of per-grain-type wiring.
//!
//! Each grain type is bound once at startup to its options, storage ports,
//! observers and optional producer. Runtimes are built from the binding via
//! [`GrainRuntime::from_registry`](crate::grain::GrainRuntime::from_registry).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::bus::EventProducer;
use crate::config::{ArchiveOptions, Config, CoreOptions};
use crate::grain::Grain;
use crate::observer::ObserverUnit;
use crate::storage::GrainStorage;

/// Everything a runtime of grain type `G` needs besides its key.
pub struct GrainBinding<G: Grain> {
    pub core: CoreOptions,
    pub archive: ArchiveOptions,
    pub storage: GrainStorage<G>,
    pub observers: ObserverUnit<G::Key>,
    pub producer: Option<Arc<dyn EventProducer>>,
}

impl<G: Grain> GrainBinding<G> {
    /// Binding with default options, no observers and no producer.
    pub fn new(storage: GrainStorage<G>) -> Self {
        Self {
            core: CoreOptions::default(),
            archive: ArchiveOptions::default(),
            storage,
            observers: ObserverUnit::new(),
            producer: None,
        }
    }

    /// Take options for `G::GRAIN_TYPE` from loaded configuration.
    pub fn with_config(mut self, config: &Config) -> Self {
        let (core, archive) = config.options_for(G::GRAIN_TYPE);
        self.core = core;
        self.archive = archive;
        self
    }

    pub fn with_options(mut self, core: CoreOptions, archive: ArchiveOptions) -> Self {
        self.core = core;
        self.archive = archive;
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
}

/// Type-erased binding map keyed by grain type.
///
/// `Box<dyn Any + Send + Sync>` holds an `Arc<GrainBinding<G>>` for any
/// concrete `G`; downcasting recovers the typed binding.
type BindingMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// Bindings for every grain type known to the process.
#[derive(Default)]
pub struct GrainRegistry {
    bindings: BindingMap,
}

impl GrainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind grain type `G`, replacing any earlier binding.
    pub fn register<G: Grain>(&mut self, binding: GrainBinding<G>) -> &mut Self {
        info!(grain_type = G::GRAIN_TYPE, observers = binding.observers.len(), "Grain type registered");
        self.bindings
            .insert(TypeId::of::<G>(), Box::new(Arc::new(binding)));
        self
    }

    /// Binding for grain type `G`.
    pub fn get<G: Grain>(&self) -> Option<Arc<GrainBinding<G>>> {
        self.bindings
            .get(&TypeId::of::<G>())
            .and_then(|boxed| boxed.downcast_ref::<Arc<GrainBinding<G>>>())
            .cloned()
    }

    pub fn contains<G: Grain>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<G>())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
