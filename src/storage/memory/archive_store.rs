//! In-memory ArchiveStorage implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::archive::ArchiveBrief;
use crate::event::{DomainEvent, FullyEvent, StateKey};
use crate::snapshot::Snapshot;
use crate::storage::{ArchiveStorage, MemoryEventStore, Result};

struct ArchiveRecord<K, S> {
    state_id: K,
    brief: ArchiveBrief,
    snapshot: Snapshot<K, S>,
    is_over: bool,
}

/// Archive store keeping briefs, snapshots and moved events in memory.
///
/// Shares the event store it moves events out of.
pub struct MemoryArchiveStore<K, S, E> {
    events: Arc<MemoryEventStore<K, E>>,
    records: RwLock<HashMap<String, ArchiveRecord<K, S>>>,
    cold: RwLock<HashMap<K, Vec<FullyEvent<K, E>>>>,
}

impl<K: StateKey, S: Clone + Send + Sync + 'static, E: DomainEvent> MemoryArchiveStore<K, S, E> {
    pub fn new(events: Arc<MemoryEventStore<K, E>>) -> Self {
        Self {
            events,
            records: RwLock::new(HashMap::new()),
            cold: RwLock::new(HashMap::new()),
        }
    }

    /// Events moved into cold storage for an entity, ascending by version.
    pub async fn cold_events(&self, state_id: &K) -> Vec<FullyEvent<K, E>> {
        self.cold.read().await.get(state_id).cloned().unwrap_or_default()
    }

    /// Number of archives stored for an entity.
    pub async fn archive_count(&self, state_id: &K) -> usize {
        self.records
            .read()
            .await
            .values()
            .filter(|r| &r.state_id == state_id)
            .count()
    }

    /// Whether every archive of the entity carries the terminal flag.
    pub async fn is_over(&self, state_id: &K) -> bool {
        let records = self.records.read().await;
        let mut owned = records.values().filter(|r| &r.state_id == state_id).peekable();
        owned.peek().is_some() && owned.all(|r| r.is_over)
    }
}

#[async_trait]
impl<K: StateKey, S: Clone + Send + Sync + 'static, E: DomainEvent> ArchiveStorage<K, S>
    for MemoryArchiveStore<K, S, E>
{
    async fn get_brief_list(&self, state_id: &K) -> Result<Vec<ArchiveBrief>> {
        let mut briefs: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| &r.state_id == state_id)
            .map(|r| r.brief.clone())
            .collect();
        briefs.sort_by_key(|b| b.index);
        Ok(briefs)
    }

    async fn get_latest_brief(&self, state_id: &K) -> Result<Option<ArchiveBrief>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| &r.state_id == state_id)
            .max_by_key(|r| r.brief.index)
            .map(|r| r.brief.clone()))
    }

    async fn get_by_id(&self, brief_id: &str) -> Result<Option<Snapshot<K, S>>> {
        Ok(self
            .records
            .read()
            .await
            .get(brief_id)
            .map(|r| r.snapshot.clone()))
    }

    async fn insert(&self, brief: &ArchiveBrief, snapshot: &Snapshot<K, S>) -> Result<()> {
        self.records.write().await.insert(
            brief.id.clone(),
            ArchiveRecord {
                state_id: snapshot.base.state_id.clone(),
                brief: brief.clone(),
                snapshot: snapshot.clone(),
                is_over: false,
            },
        );
        Ok(())
    }

    async fn delete(&self, _state_id: &K, brief_id: &str) -> Result<()> {
        self.records.write().await.remove(brief_id);
        Ok(())
    }

    async fn delete_all(&self, state_id: &K) -> Result<()> {
        self.records
            .write()
            .await
            .retain(|_, r| &r.state_id != state_id);
        Ok(())
    }

    async fn event_is_clear(&self, _state_id: &K, brief_id: &str) -> Result<()> {
        if let Some(record) = self.records.write().await.get_mut(brief_id) {
            record.brief.event_is_cleared = true;
        }
        Ok(())
    }

    async fn event_archive(
        &self,
        state_id: &K,
        end_version: i64,
        _start_timestamp: i64,
    ) -> Result<()> {
        let moved = self.events.drain_previous(state_id, end_version).await;
        if !moved.is_empty() {
            let mut cold = self.cold.write().await;
            let stream = cold.entry(state_id.clone()).or_default();
            stream.extend(moved);
            stream.sort_by_key(|e| e.base.version);
        }
        Ok(())
    }

    async fn over(&self, state_id: &K, is_over: bool) -> Result<()> {
        for record in self.records.write().await.values_mut() {
            if &record.state_id == state_id {
                record.is_over = is_over;
            }
        }
        Ok(())
    }
}
