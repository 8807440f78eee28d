//! grainlog-demo: in-process walkthrough
//!
//! Wires one grain type to in-memory storage, an in-process channel bus and
//! a following observer, raises a few events through the batching task and
//! closes the entity.
//!
//! ## Configuration
//! - GRAINLOG_CONFIG: YAML configuration file (optional)
//! - GRAINLOG_LOG: tracing filter (default: info)

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use grainlog::bus::{ChannelProducer, Result as BusResult};
use grainlog::config::Config;
use grainlog::observer::{FollowHandler, Follower, ObserverUnit};
use grainlog::storage::GrainStorage;
use grainlog::utils::bootstrap::init_tracing;
use grainlog::{
    BatchingGrain, DomainEvent, FullyEvent, Grain, GrainBinding, GrainRegistry, GrainRuntime,
    OverType, Snapshot,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
enum CounterEvent {
    Added { by: i64 },
}

impl DomainEvent for CounterEvent {
    fn type_code(&self) -> &'static str {
        "Added"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CounterState {
    total: i64,
}

struct Counter;

impl Grain for Counter {
    const GRAIN_TYPE: &'static str = "counter";

    type Key = i64;
    type State = CounterState;
    type Event = CounterEvent;

    fn apply(&self, snapshot: &mut Snapshot<i64, CounterState>, event: &FullyEvent<i64, CounterEvent>) {
        match event.event {
            CounterEvent::Added { by } => snapshot.state.total += by,
        }
    }
}

/// Logs every event it follows.
struct LogFollow;

#[async_trait]
impl FollowHandler for LogFollow {
    type Key = i64;
    type Event = CounterEvent;

    async fn on_event(&self, event: &FullyEvent<i64, CounterEvent>) -> BusResult<()> {
        info!(state_id = event.state_id, version = event.version(), event = ?event.event, "Followed event");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = Config::load(None)?;

    let storage = GrainStorage::<Counter>::in_memory();
    let follower = Arc::new(Follower::new("log", LogFollow, Arc::clone(&storage.events)));
    let observers = ObserverUnit::<i64>::new().with(follower);

    let producer = Arc::new(ChannelProducer::new());
    observers.subscribe_to(&producer).await;
    producer.start_consuming().await;

    let mut registry = GrainRegistry::new();
    registry.register(
        GrainBinding::new(storage)
            .with_config(&config)
            .with_observers(observers)
            .with_producer(producer),
    );

    let mut runtime = GrainRuntime::from_registry(&registry, Counter, 1)?;
    runtime.activate().await?;
    let grain = BatchingGrain::spawn(runtime);

    let raises = (1..=5).map(|by| {
        let grain = grain.clone();
        async move { grain.raise(move |_| Some(CounterEvent::Added { by }), None).await }
    });
    for raised in futures::future::join_all(raises).await {
        raised?;
    }

    let snapshot = grain.snapshot().await?;
    info!(version = snapshot.version(), total = snapshot.state.total, "Events raised");

    let mut runtime = grain.shutdown().await?;
    runtime.activate().await?;
    runtime.over(OverType::DeleteEvents).await?;
    info!(version = runtime.version(), "Entity closed");

    Ok(())
}
