//! Downstream consumers of an entity type's events.
//!
//! Every [`Observer`] receives the framed bytes of each raised event and
//! reports how far it has processed each entity. Compaction and closure are
//! gated on those reports: raw events are never removed before every
//! observer has acknowledged them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use bytes::Bytes;
use futures::future::{join_all, try_join_all, BoxFuture};
use tracing::warn;

use crate::bus::{BusError, ChannelProducer, FrameHandler, Result};
use crate::event::StateKey;
use crate::utils::retry::delivery_backoff;

mod follower;

pub use follower::{FollowHandler, Follower};

/// A consumer that must acknowledge events before they may be removed.
#[async_trait]
pub trait Observer<K: StateKey>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Highest version processed for `state_id`.
    ///
    /// Implementations should first try to catch up to `src_version`, then
    /// durably record and return what they reached.
    async fn get_and_save_version(&self, state_id: &K, src_version: i64) -> Result<i64>;

    /// Process one event frame.
    async fn handle(&self, frame: Bytes) -> Result<()>;
}

/// Adapts an observer to a bus subscription.
struct ObserverHandler<K: StateKey>(Arc<dyn Observer<K>>);

impl<K: StateKey> FrameHandler for ObserverHandler<K> {
    fn handle(&self, frame: Bytes) -> BoxFuture<'static, Result<()>> {
        let observer = Arc::clone(&self.0);
        Box::pin(async move { observer.handle(frame).await })
    }
}

/// Every observer registered for one entity type.
pub struct ObserverUnit<K: StateKey> {
    observers: Vec<Arc<dyn Observer<K>>>,
    backoff: ExponentialBuilder,
}

impl<K: StateKey> Clone for ObserverUnit<K> {
    fn clone(&self) -> Self {
        Self {
            observers: self.observers.clone(),
            backoff: self.backoff,
        }
    }
}

impl<K: StateKey> Default for ObserverUnit<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: StateKey> ObserverUnit<K> {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
            backoff: delivery_backoff(),
        }
    }

    /// Add an observer.
    pub fn with(mut self, observer: Arc<dyn Observer<K>>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Override the retry policy for direct delivery.
    pub fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Subscribe every observer to an in-process channel producer.
    pub async fn subscribe_to(&self, producer: &ChannelProducer) {
        for observer in &self.observers {
            producer
                .subscribe(Box::new(ObserverHandler(Arc::clone(observer))))
                .await;
        }
    }

    /// Ask every observer how far it has processed `state_id`.
    ///
    /// Fails if any observer cannot answer.
    pub async fn versions(&self, state_id: &K, src_version: i64) -> Result<Vec<i64>> {
        try_join_all(
            self.observers
                .iter()
                .map(|o| o.get_and_save_version(state_id, src_version)),
        )
        .await
    }

    /// Versions reported below `target`; empty when every observer caught up.
    pub async fn lagging(&self, state_id: &K, target: i64) -> Result<Vec<i64>> {
        Ok(self
            .versions(state_id, target)
            .await?
            .into_iter()
            .filter(|v| *v < target)
            .collect())
    }

    /// Deliver a frame straight to every observer, retrying each one.
    ///
    /// Returns `true` when every observer accepted the frame.
    pub async fn deliver(&self, frame: &Bytes) -> bool {
        let results = join_all(self.observers.iter().map(|observer| {
            let frame = frame.clone();
            let name = observer.name().to_string();
            async move {
                (|| observer.handle(frame.clone()))
                    .retry(self.backoff)
                    .notify(|err: &BusError, dur: Duration| {
                        warn!(observer = %name, error = %err, delay = ?dur, "Observer delivery failed, retrying");
                    })
                    .await
                    .map_err(|e| {
                        warn!(observer = %name, error = %e, "Observer delivery gave up");
                        e
                    })
            }
        }))
        .await;
        results.iter().all(|r| r.is_ok())
    }
}
