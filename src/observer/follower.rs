//! In-process observer that applies events in version order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use super::Observer;
use crate::bus::{BusError, Result};
use crate::codec::EventBytes;
use crate::event::{DomainEvent, FullyEvent, StateKey};
use crate::storage::EventStorage;

/// Side effect a [`Follower`] runs for each event.
#[async_trait]
pub trait FollowHandler: Send + Sync + 'static {
    type Key: StateKey;
    type Event: DomainEvent;

    async fn on_event(&self, event: &FullyEvent<Self::Key, Self::Event>) -> Result<()>;
}

/// Observer that feeds a [`FollowHandler`] exactly once per version.
///
/// Duplicate frames are dropped. A frame that skips ahead triggers a
/// catch-up read from the event log so the handler never sees a gap.
pub struct Follower<F: FollowHandler> {
    name: String,
    handler: F,
    events: Arc<dyn EventStorage<F::Key, F::Event>>,
    processed: Mutex<HashMap<F::Key, i64>>,
}

impl<F: FollowHandler> Follower<F> {
    pub fn new(
        name: impl Into<String>,
        handler: F,
        events: Arc<dyn EventStorage<F::Key, F::Event>>,
    ) -> Self {
        Self {
            name: name.into(),
            handler,
            events,
            processed: Mutex::new(HashMap::new()),
        }
    }

    pub fn handler(&self) -> &F {
        &self.handler
    }

    /// Last version applied for `state_id`.
    pub async fn processed(&self, state_id: &F::Key) -> i64 {
        self.processed
            .lock()
            .await
            .get(state_id)
            .copied()
            .unwrap_or(0)
    }

    /// Apply stored events after `*version` up to `target`, advancing
    /// `*version` as each one succeeds.
    async fn catch_up(&self, state_id: &F::Key, version: &mut i64, target: i64) -> Result<()> {
        if *version >= target {
            return Ok(());
        }
        let events = self
            .events
            .get_list(state_id, 0, *version + 1, target)
            .await
            .map_err(|e| BusError::ObserverFailed {
                name: self.name.clone(),
                message: e.to_string(),
            })?;
        debug!(
            follower = %self.name,
            state_id = %state_id,
            from = *version,
            count = events.len(),
            "Follower catching up"
        );
        for event in events {
            if event.version() != *version + 1 {
                break;
            }
            self.handler.on_event(&event).await?;
            *version = event.version();
        }
        Ok(())
    }
}

#[async_trait]
impl<F: FollowHandler> Observer<F::Key> for Follower<F> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_and_save_version(&self, state_id: &F::Key, src_version: i64) -> Result<i64> {
        let mut processed = self.processed.lock().await;
        let mut version = processed.get(state_id).copied().unwrap_or(0);
        let outcome = self.catch_up(state_id, &mut version, src_version).await;
        processed.insert(state_id.clone(), version);
        outcome?;
        Ok(version)
    }

    async fn handle(&self, frame: Bytes) -> Result<()> {
        let event: FullyEvent<F::Key, F::Event> = EventBytes::from_frame(&frame)?.to_event()?;
        let mut processed = self.processed.lock().await;
        let mut version = processed.get(&event.state_id).copied().unwrap_or(0);

        if event.version() <= version {
            debug!(
                follower = %self.name,
                state_id = %event.state_id,
                version = event.version(),
                "Duplicate frame ignored"
            );
            return Ok(());
        }

        let mut outcome = self
            .catch_up(&event.state_id, &mut version, event.version() - 1)
            .await;
        if outcome.is_ok() {
            outcome = if version + 1 == event.version() {
                self.handler.on_event(&event).await
            } else {
                Err(BusError::ObserverFailed {
                    name: self.name.clone(),
                    message: format!("missing events between {} and {}", version, event.version()),
                })
            };
            if outcome.is_ok() {
                version = event.version();
                debug!(follower = %self.name, state_id = %event.state_id, version, "Follower applied event");
            }
        }
        processed.insert(event.state_id.clone(), version);
        outcome
    }
}
