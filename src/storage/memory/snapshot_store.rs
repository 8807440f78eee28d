//! In-memory SnapshotStorage implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::injected;
use crate::event::StateKey;
use crate::snapshot::Snapshot;
use crate::storage::{Result, SnapshotStorage, StorageError};

/// Snapshot store holding one row per entity in memory.
pub struct MemorySnapshotStore<K, S> {
    snapshots: RwLock<HashMap<K, Snapshot<K, S>>>,
    fail_on_write: AtomicBool,
    inserts: AtomicUsize,
    updates: AtomicUsize,
}

impl<K, S> Default for MemorySnapshotStore<K, S> {
    fn default() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            fail_on_write: AtomicBool::new(false),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }
}

impl<K: StateKey, S: Clone + Send + Sync + 'static> MemorySnapshotStore<K, S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `insert` and `update` fail until switched off.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.fail_on_write.store(fail, Ordering::SeqCst);
    }

    pub async fn get_stored(&self, state_id: &K) -> Option<Snapshot<K, S>> {
        self.snapshots.read().await.get(state_id).cloned()
    }

    /// Successful full writes (`insert` + `update`).
    pub fn write_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst) + self.updates.load(Ordering::SeqCst)
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    async fn patch(&self, state_id: &K, f: impl FnOnce(&mut Snapshot<K, S>) + Send) {
        if let Some(snapshot) = self.snapshots.write().await.get_mut(state_id) {
            f(snapshot);
        }
    }
}

#[async_trait]
impl<K: StateKey, S: Clone + Send + Sync + 'static> SnapshotStorage<K, S>
    for MemorySnapshotStore<K, S>
{
    async fn get(&self, state_id: &K) -> Result<Option<Snapshot<K, S>>> {
        Ok(self.snapshots.read().await.get(state_id).cloned())
    }

    async fn insert(&self, snapshot: &Snapshot<K, S>) -> Result<()> {
        if self.fail_on_write.load(Ordering::SeqCst) {
            return Err(injected("insert"));
        }
        let mut store = self.snapshots.write().await;
        let key = &snapshot.base.state_id;
        if store.contains_key(key) {
            return Err(StorageError::SnapshotExists(key.to_string()));
        }
        store.insert(key.clone(), snapshot.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, snapshot: &Snapshot<K, S>) -> Result<()> {
        if self.fail_on_write.load(Ordering::SeqCst) {
            return Err(injected("update"));
        }
        let mut store = self.snapshots.write().await;
        let key = &snapshot.base.state_id;
        match store.get_mut(key) {
            Some(row) => *row = snapshot.clone(),
            None => return Err(StorageError::SnapshotNotFound(key.to_string())),
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, state_id: &K) -> Result<()> {
        self.snapshots.write().await.remove(state_id);
        Ok(())
    }

    async fn update_is_latest(&self, state_id: &K, is_latest: bool) -> Result<()> {
        self.patch(state_id, |s| s.base.is_latest = is_latest).await;
        Ok(())
    }

    async fn update_latest_min_event_timestamp(&self, state_id: &K, timestamp: i64) -> Result<()> {
        self.patch(state_id, |s| s.base.latest_min_event_timestamp = timestamp)
            .await;
        Ok(())
    }

    async fn update_start_timestamp(&self, state_id: &K, timestamp: i64) -> Result<()> {
        self.patch(state_id, |s| s.base.start_timestamp = timestamp).await;
        Ok(())
    }

    async fn over(&self, state_id: &K, is_over: bool) -> Result<()> {
        self.patch(state_id, |s| s.base.is_over = is_over).await;
        Ok(())
    }
}
