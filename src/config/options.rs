//! Per-grain-type runtime options.

use serde::{Deserialize, Serialize};

/// Core runtime options: paging, snapshot cadence and fan-out priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreOptions {
    /// Save a snapshot once this many versions are unsaved.
    pub snapshot_version_interval: i64,
    /// Minimum unsaved versions that force a save on deactivation.
    pub min_snapshot_version_interval: i64,
    /// Page size for event replay.
    pub number_of_events_per_read: i64,
    /// Publish to the bus first, falling back to direct observer delivery.
    /// When false, direct delivery goes first and the bus is the fallback.
    pub priority_async_event_bus: bool,
    /// A transaction open longer than this is rolled back by the next begin.
    pub transaction_timeout_millis: i64,
    /// How long the batching task gathers inputs before committing.
    pub batch_window_millis: u64,
    /// Upper bound on inputs per batch.
    pub max_batch_size: usize,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            snapshot_version_interval: 500,
            min_snapshot_version_interval: 1,
            number_of_events_per_read: 2000,
            priority_async_event_bus: true,
            transaction_timeout_millis: 30_000,
            batch_window_millis: 100,
            max_batch_size: 500,
        }
    }
}

/// What happens to raw events once their archive window is compacted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventArchiveType {
    /// Physically delete the events.
    #[default]
    Delete,
    /// Move the events into cold archive storage.
    Move,
}

/// Archive window and compaction options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveOptions {
    /// Archiving and event compaction switch.
    pub enabled: bool,
    /// Window completes once its elapsed time exceeds this many seconds.
    pub seconds_interval: i64,
    /// Window completes once it spans more than this many versions.
    pub version_interval: i64,
    /// Uncleared windows retained before the oldest is compacted.
    pub max_snapshot_archive_records: usize,
    /// Minimum pending versions that force an archive on deactivation.
    pub min_version_interval_at_deactivate: i64,
    pub event_archive_type: EventArchiveType,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            seconds_interval: 24 * 60 * 60,
            version_interval: 1000,
            max_snapshot_archive_records: 30,
            min_version_interval_at_deactivate: 100,
            event_archive_type: EventArchiveType::Delete,
        }
    }
}

impl ArchiveOptions {
    /// Archiving switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
