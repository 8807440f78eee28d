//! ArchiveStorage trait definition.

use async_trait::async_trait;

use super::Result;
use crate::archive::ArchiveBrief;
use crate::event::StateKey;
use crate::snapshot::Snapshot;

/// Interface for archive window persistence.
///
/// Each archive pairs an [`ArchiveBrief`] with a full snapshot copy so an
/// entity can recover from it without replaying the archived events.
#[async_trait]
pub trait ArchiveStorage<K: StateKey, S: Send + Sync + 'static>: Send + Sync {
    /// All briefs for an entity, in any order.
    async fn get_brief_list(&self, state_id: &K) -> Result<Vec<ArchiveBrief>>;

    /// Brief with the highest index.
    async fn get_latest_brief(&self, state_id: &K) -> Result<Option<ArchiveBrief>>;

    /// Snapshot embedded in an archive.
    async fn get_by_id(&self, brief_id: &str) -> Result<Option<Snapshot<K, S>>>;

    async fn insert(&self, brief: &ArchiveBrief, snapshot: &Snapshot<K, S>) -> Result<()>;

    async fn delete(&self, state_id: &K, brief_id: &str) -> Result<()>;

    async fn delete_all(&self, state_id: &K) -> Result<()>;

    /// Record that the raw events of a window were removed.
    async fn event_is_clear(&self, state_id: &K, brief_id: &str) -> Result<()>;

    /// Move raw events with `version <= end_version` into cold storage.
    async fn event_archive(&self, state_id: &K, end_version: i64, start_timestamp: i64)
        -> Result<()>;

    /// Flip the terminal flag on every archive of the entity.
    async fn over(&self, state_id: &K, is_over: bool) -> Result<()>;
}
