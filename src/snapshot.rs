//! Versioned projection of an entity's state.
//!
//! `version` is the last applied event; `doing_version` runs one ahead only
//! while an event is being applied. Any mismatch seen at an entry point means
//! a previous apply crashed and the in-memory state must be rebuilt from the
//! log.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{GrainError, Result};
use crate::event::{EventBase, StateKey};

/// Bookkeeping shared by every snapshot regardless of domain state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "K: DeserializeOwned"))]
pub struct SnapshotBase<K> {
    pub state_id: K,
    pub version: i64,
    pub doing_version: i64,
    pub is_latest: bool,
    pub is_over: bool,
    pub start_timestamp: i64,
    pub latest_min_event_timestamp: i64,
}

impl<K: StateKey> SnapshotBase<K> {
    /// Empty bookkeeping at version 0.
    pub fn new(state_id: K) -> Self {
        Self {
            state_id,
            version: 0,
            doing_version: 0,
            is_latest: false,
            is_over: false,
            start_timestamp: 0,
            latest_min_event_timestamp: 0,
        }
    }

    /// True when no apply is in flight.
    pub fn is_consistent(&self) -> bool {
        self.version == self.doing_version
    }

    /// Mark the next version as in flight.
    pub fn increment_doing_version(&mut self, grain_type: &'static str) -> Result<()> {
        if !self.is_consistent() {
            return Err(self.insecurity(grain_type, self.version + 1));
        }
        self.doing_version = self.version + 1;
        Ok(())
    }

    /// Undo [`increment_doing_version`](Self::increment_doing_version).
    pub fn decrement_doing_version(&mut self) {
        self.doing_version = self.version;
    }

    /// Commit an applied event.
    ///
    /// The event must be exactly `version + 1` and already marked as doing.
    pub fn update_version(&mut self, base: &EventBase, grain_type: &'static str) -> Result<()> {
        if self.version + 1 != base.version || self.doing_version != base.version {
            return Err(self.insecurity(grain_type, base.version));
        }
        self.version = base.version;
        if self.start_timestamp == 0 || base.timestamp < self.start_timestamp {
            self.start_timestamp = base.timestamp;
        }
        Ok(())
    }

    /// Build a `StateInsecurity` error describing the current pair.
    pub fn insecurity(&self, grain_type: &'static str, event_version: i64) -> GrainError {
        GrainError::StateInsecurity {
            grain_type,
            state_id: self.state_id.to_string(),
            version: self.version,
            doing_version: self.doing_version,
            event_version,
        }
    }
}

/// Bookkeeping plus the domain projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "K: DeserializeOwned, S: DeserializeOwned"))]
pub struct Snapshot<K, S> {
    pub base: SnapshotBase<K>,
    pub state: S,
}

impl<K: StateKey, S: Default> Snapshot<K, S> {
    /// Snapshot for an entity that has never raised an event.
    pub fn empty(state_id: K) -> Self {
        Self {
            base: SnapshotBase::new(state_id),
            state: S::default(),
        }
    }
}

impl<K, S> Snapshot<K, S> {
    pub fn version(&self) -> i64 {
        self.base.version
    }
}
