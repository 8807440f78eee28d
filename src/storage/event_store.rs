//! EventStorage trait definition.

use async_trait::async_trait;

use super::Result;
use crate::codec::EventBytes;
use crate::event::{DomainEvent, FullyEvent, StateKey};

/// One row of a batch append.
#[derive(Debug, Clone)]
pub struct EventAppend<K, E> {
    pub event: FullyEvent<K, E>,
    pub bytes: EventBytes,
    pub unique_id: String,
}

/// Interface for event persistence.
///
/// The `(state_id, version)` pair and the `(state_id, unique_id)` pair are
/// both unique. A collision on either is reported as `Ok(false)`, never as
/// an error: it is how exactly-once client retries are detected.
///
/// `start_timestamp`/`min_timestamp` arguments are lower bounds on event
/// timestamps that let time-partitioned backends skip older segments.
#[async_trait]
pub trait EventStorage<K: StateKey, E: DomainEvent>: Send + Sync {
    /// Events with `start_version <= version <= end_version` and
    /// `timestamp >= min_timestamp`, ascending by version.
    async fn get_list(
        &self,
        state_id: &K,
        min_timestamp: i64,
        start_version: i64,
        end_version: i64,
    ) -> Result<Vec<FullyEvent<K, E>>>;

    /// Append one event. `Ok(false)` on duplicate version or unique id.
    async fn append(
        &self,
        event: &FullyEvent<K, E>,
        bytes: &EventBytes,
        unique_id: &str,
    ) -> Result<bool>;

    /// Append every row or none. `Ok(false)` if any row collides.
    async fn batch_append(&self, events: &[EventAppend<K, E>]) -> Result<bool>;

    /// Delete events with `version <= to_version`.
    async fn delete_previous(&self, state_id: &K, to_version: i64, start_timestamp: i64)
        -> Result<()>;

    /// Delete events with `version > from_version`.
    async fn delete_after(&self, state_id: &K, from_version: i64, start_timestamp: i64)
        -> Result<()>;

    /// Delete the single event at `version`.
    async fn delete_by_version(&self, state_id: &K, version: i64, timestamp: i64) -> Result<()>;
}
