//! SnapshotStorage trait definition.

use async_trait::async_trait;

use super::Result;
use crate::event::StateKey;
use crate::snapshot::Snapshot;

/// Interface for live snapshot persistence.
///
/// One row per entity. `insert` is used for the first save and `update`
/// afterwards; the partial updates touch single bookkeeping fields so the
/// runtime does not rewrite the whole state for a flag change.
#[async_trait]
pub trait SnapshotStorage<K: StateKey, S: Send + Sync + 'static>: Send + Sync {
    /// Retrieve the snapshot, `None` if the entity was never saved.
    async fn get(&self, state_id: &K) -> Result<Option<Snapshot<K, S>>>;

    async fn insert(&self, snapshot: &Snapshot<K, S>) -> Result<()>;

    async fn update(&self, snapshot: &Snapshot<K, S>) -> Result<()>;

    async fn delete(&self, state_id: &K) -> Result<()>;

    async fn update_is_latest(&self, state_id: &K, is_latest: bool) -> Result<()>;

    async fn update_latest_min_event_timestamp(&self, state_id: &K, timestamp: i64)
        -> Result<()>;

    async fn update_start_timestamp(&self, state_id: &K, timestamp: i64) -> Result<()>;

    /// Flip the terminal flag.
    async fn over(&self, state_id: &K, is_over: bool) -> Result<()>;
}
