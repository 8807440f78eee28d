//! In-memory EventStorage implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::injected;
use crate::codec::EventBytes;
use crate::event::{DomainEvent, FullyEvent, StateKey};
use crate::storage::{EventAppend, EventStorage, Result};

/// Stored event with its idempotency key.
struct StoredEvent<K, E> {
    event: FullyEvent<K, E>,
    unique_id: String,
}

/// Events of one entity keyed by version.
type Stream<K, E> = BTreeMap<i64, StoredEvent<K, E>>;

/// Event store that keeps every stream in memory.
pub struct MemoryEventStore<K, E> {
    streams: RwLock<HashMap<K, Stream<K, E>>>,
    fail_on_append: AtomicBool,
    fail_on_get: AtomicBool,
}

impl<K, E> Default for MemoryEventStore<K, E> {
    fn default() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            fail_on_append: AtomicBool::new(false),
            fail_on_get: AtomicBool::new(false),
        }
    }
}

impl<K: StateKey, E: DomainEvent> MemoryEventStore<K, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_append(&self, fail: bool) {
        self.fail_on_append.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_get(&self, fail: bool) {
        self.fail_on_get.store(fail, Ordering::SeqCst);
    }

    /// Versions currently stored for an entity, ascending.
    pub async fn versions(&self, state_id: &K) -> Vec<i64> {
        self.streams
            .read()
            .await
            .get(state_id)
            .map(|s| s.keys().copied().collect())
            .unwrap_or_default()
    }

    pub async fn event_count(&self, state_id: &K) -> usize {
        self.streams
            .read()
            .await
            .get(state_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Remove and return events with `version <= to_version`.
    pub(crate) async fn drain_previous(&self, state_id: &K, to_version: i64) -> Vec<FullyEvent<K, E>> {
        let mut streams = self.streams.write().await;
        let Some(stream) = streams.get_mut(state_id) else {
            return Vec::new();
        };
        let kept = stream.split_off(&(to_version + 1));
        let drained = std::mem::replace(stream, kept);
        drained.into_values().map(|s| s.event).collect()
    }

    fn collides(stream: &Stream<K, E>, version: i64, unique_id: &str) -> bool {
        stream.contains_key(&version) || stream.values().any(|s| s.unique_id == unique_id)
    }
}

#[async_trait]
impl<K: StateKey, E: DomainEvent> EventStorage<K, E> for MemoryEventStore<K, E> {
    async fn get_list(
        &self,
        state_id: &K,
        min_timestamp: i64,
        start_version: i64,
        end_version: i64,
    ) -> Result<Vec<FullyEvent<K, E>>> {
        if self.fail_on_get.load(Ordering::SeqCst) {
            return Err(injected("get_list"));
        }
        if start_version > end_version {
            return Ok(Vec::new());
        }
        let streams = self.streams.read().await;
        Ok(streams
            .get(state_id)
            .map(|stream| {
                stream
                    .range(start_version..=end_version)
                    .map(|(_, s)| &s.event)
                    .filter(|e| e.base.timestamp >= min_timestamp)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append(
        &self,
        event: &FullyEvent<K, E>,
        _bytes: &EventBytes,
        unique_id: &str,
    ) -> Result<bool> {
        if self.fail_on_append.load(Ordering::SeqCst) {
            return Err(injected("append"));
        }
        let mut streams = self.streams.write().await;
        let stream = streams.entry(event.state_id.clone()).or_default();
        if Self::collides(stream, event.base.version, unique_id) {
            return Ok(false);
        }
        stream.insert(
            event.base.version,
            StoredEvent {
                event: event.clone(),
                unique_id: unique_id.to_string(),
            },
        );
        Ok(true)
    }

    async fn batch_append(&self, events: &[EventAppend<K, E>]) -> Result<bool> {
        if self.fail_on_append.load(Ordering::SeqCst) {
            return Err(injected("batch_append"));
        }
        let mut streams = self.streams.write().await;

        // Validate every row before writing any.
        for (i, row) in events.iter().enumerate() {
            let earlier = &events[..i];
            let dup_in_batch = earlier.iter().any(|r| {
                r.event.state_id == row.event.state_id
                    && (r.event.base.version == row.event.base.version
                        || r.unique_id == row.unique_id)
            });
            let dup_in_store = streams
                .get(&row.event.state_id)
                .map(|s| Self::collides(s, row.event.base.version, &row.unique_id))
                .unwrap_or(false);
            if dup_in_batch || dup_in_store {
                return Ok(false);
            }
        }

        for row in events {
            streams.entry(row.event.state_id.clone()).or_default().insert(
                row.event.base.version,
                StoredEvent {
                    event: row.event.clone(),
                    unique_id: row.unique_id.clone(),
                },
            );
        }
        Ok(true)
    }

    async fn delete_previous(
        &self,
        state_id: &K,
        to_version: i64,
        _start_timestamp: i64,
    ) -> Result<()> {
        self.drain_previous(state_id, to_version).await;
        Ok(())
    }

    async fn delete_after(&self, state_id: &K, from_version: i64, _start_timestamp: i64) -> Result<()> {
        if let Some(stream) = self.streams.write().await.get_mut(state_id) {
            stream.split_off(&(from_version + 1));
        }
        Ok(())
    }

    async fn delete_by_version(&self, state_id: &K, version: i64, _timestamp: i64) -> Result<()> {
        if let Some(stream) = self.streams.write().await.get_mut(state_id) {
            stream.remove(&version);
        }
        Ok(())
    }
}
