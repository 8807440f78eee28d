//! Storage ports and in-memory implementations.
//!
//! The runtime depends only on the [`EventStorage`], [`SnapshotStorage`] and
//! [`ArchiveStorage`] traits. Durable backends live outside this crate; the
//! [`memory`] module provides adapters for tests and standalone use.

use std::sync::Arc;

use crate::grain::Grain;

pub mod archive_store;
pub mod event_store;
pub mod memory;
pub mod snapshot_store;

pub use archive_store::ArchiveStorage;
pub use event_store::{EventAppend, EventStorage};
pub use memory::{MemoryArchiveStore, MemoryEventStore, MemorySnapshotStore};
pub use snapshot_store::SnapshotStorage;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Snapshot not found: state_id={0}")]
    SnapshotNotFound(String),

    #[error("Snapshot already exists: state_id={0}")]
    SnapshotExists(String),
}

/// Storage ports resolved for one grain type.
pub struct GrainStorage<G: Grain> {
    pub events: Arc<dyn EventStorage<G::Key, G::Event>>,
    pub snapshots: Arc<dyn SnapshotStorage<G::Key, G::State>>,
    /// `None` disables archiving regardless of options.
    pub archives: Option<Arc<dyn ArchiveStorage<G::Key, G::State>>>,
}

impl<G: Grain> Clone for GrainStorage<G> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
            snapshots: Arc::clone(&self.snapshots),
            archives: self.archives.clone(),
        }
    }
}

impl<G: Grain> GrainStorage<G> {
    /// Fresh in-memory stores wired together (archive moves events out of
    /// the event store).
    pub fn in_memory() -> Self {
        let events = Arc::new(MemoryEventStore::new());
        let archives = Arc::new(MemoryArchiveStore::new(Arc::clone(&events)));
        Self {
            events,
            snapshots: Arc::new(MemorySnapshotStore::new()),
            archives: Some(archives),
        }
    }
}
