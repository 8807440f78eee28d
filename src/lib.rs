//! grainlog - event-sourced entity runtime
//!
//! Each entity ("grain") keeps its state as a snapshot plus an append-only
//! event log. Raising an event appends it, applies it to the snapshot and
//! fans it out to observers. Snapshots are saved on a version cadence,
//! closed windows of events are archived and eventually compacted once
//! every observer has caught up.

pub mod archive;
pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod grain;
pub mod observer;
pub mod registry;
pub mod snapshot;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use error::{GrainError, Result};
pub use event::{DomainEvent, EventBase, EventUid, FullyEvent, StateKey};
pub use grain::{BatchingGrain, Grain, GrainRuntime, Lifecycle, OverType};
pub use registry::{GrainBinding, GrainRegistry};
pub use snapshot::{Snapshot, SnapshotBase};
