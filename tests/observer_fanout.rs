//! Observer fan-out over the in-process bus and the closure barrier.

mod common;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use grainlog::bus::{ChannelProducer, Result as BusResult};
use grainlog::config::ArchiveOptions;
use grainlog::observer::{FollowHandler, Follower, Observer, ObserverUnit};
use grainlog::{BatchingGrain, FullyEvent, GrainError, GrainRuntime, OverType};

use common::{credit, snapshot_every, LedgerEvent, Stores};

#[derive(Default)]
struct Projection {
    totals: Mutex<Vec<(i64, i64)>>,
}

#[async_trait]
impl FollowHandler for Projection {
    type Key = i64;
    type Event = LedgerEvent;

    async fn on_event(&self, event: &FullyEvent<i64, LedgerEvent>) -> BusResult<()> {
        self.totals.lock().await.push((event.version(), event.timestamp()));
        Ok(())
    }
}

/// Observer stuck at a fixed version.
struct Stuck(AtomicI64);

#[async_trait]
impl Observer<i64> for Stuck {
    fn name(&self) -> &str {
        "stuck"
    }

    async fn get_and_save_version(&self, _state_id: &i64, _src_version: i64) -> BusResult<i64> {
        Ok(self.0.load(Ordering::SeqCst))
    }

    async fn handle(&self, _frame: Bytes) -> BusResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_bus_delivers_every_event_to_follower() {
    let stores = Stores::new();
    let follower = Arc::new(Follower::new(
        "projection",
        Projection::default(),
        stores.events.clone(),
    ));
    let observers = ObserverUnit::<i64>::new().with(follower.clone());
    let producer = Arc::new(ChannelProducer::new());
    observers.subscribe_to(&producer).await;
    producer.start_consuming().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut runtime = GrainRuntime::new(common::Ledger, 7, stores.storage())
        .with_options(snapshot_every(500), ArchiveOptions::disabled())
        .with_observers(observers)
        .with_producer(producer);
    runtime.activate().await.unwrap();
    let grain = BatchingGrain::spawn(runtime);

    let raises = (1..=6).map(|amount| {
        let grain = grain.clone();
        async move { grain.raise(move |_| Some(credit(amount)), None).await }
    });
    for raised in futures::future::join_all(raises).await {
        assert!(raised.unwrap());
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(follower.processed(&7).await, 6);
    let versions: Vec<i64> = follower
        .handler()
        .totals
        .lock()
        .await
        .iter()
        .map(|(v, _)| *v)
        .collect();
    assert_eq!(versions, (1..=6).collect::<Vec<_>>());

    let mut runtime = grain.shutdown().await.unwrap();
    runtime.activate().await.unwrap();
    runtime.over(OverType::DeleteEvents).await.unwrap();
    assert_eq!(stores.events.event_count(&7).await, 0);
}

#[tokio::test]
async fn test_closure_blocked_until_observer_catches_up() {
    let stores = Stores::new();
    let stuck = Arc::new(Stuck(AtomicI64::new(0)));
    let mut runtime = GrainRuntime::new(common::Ledger, 7, stores.storage())
        .with_options(snapshot_every(500), ArchiveOptions::disabled())
        .with_observers(ObserverUnit::<i64>::new().with(stuck.clone()));
    runtime.activate().await.unwrap();
    for amount in 1..=3 {
        runtime.raise_event(credit(amount), None).await.unwrap();
    }

    match runtime.over(OverType::ArchiveEvents).await {
        Err(GrainError::FollowNotCompleted { version, lagging, .. }) => {
            assert_eq!(version, 3);
            assert_eq!(lagging, vec![0]);
        }
        other => panic!("expected FollowNotCompleted, got {other:?}"),
    }

    // Closing without touching events needs no barrier.
    runtime.over(OverType::None).await.unwrap();
    assert_eq!(stores.events.event_count(&7).await, 3);
    assert!(stores.snapshots.get_stored(&7).await.unwrap().base.is_over);
}
