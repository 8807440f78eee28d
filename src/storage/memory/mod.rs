//! In-memory storage implementations.
//!
//! Honour the full port contracts (idempotent append, inclusive range
//! reads, cold-storage moves) and expose failure switches so tests can
//! exercise the runtime's recovery paths.

mod archive_store;
mod event_store;
mod snapshot_store;

pub use archive_store::MemoryArchiveStore;
pub use event_store::MemoryEventStore;
pub use snapshot_store::MemorySnapshotStore;

use super::StorageError;

/// Error returned by a store whose failure switch is on.
fn injected(operation: &str) -> StorageError {
    StorageError::Unavailable(format!("injected failure on {operation}"))
}
