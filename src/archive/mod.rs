//! Archive windows over an entity's event log.
//!
//! An [`ArchiveBrief`] describes one closed version/time range whose state
//! has been checkpointed into archive storage. [`ArchiveState`] tracks the
//! ordered briefs of one entity plus the window still accumulating. All I/O
//! lives in the grain runtime; this module only holds the bookkeeping.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ArchiveOptions;
use crate::event::EventBase;

/// Metadata for one archive window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveBrief {
    pub id: String,
    pub start_version: i64,
    pub end_version: i64,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub index: i32,
    pub event_is_cleared: bool,
}

impl ArchiveBrief {
    /// Open a window at a single event.
    pub fn open(index: i32, base: &EventBase) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            start_version: base.version,
            end_version: base.version,
            start_timestamp: base.timestamp,
            end_timestamp: base.timestamp,
            index,
            event_is_cleared: false,
        }
    }

    /// Extend the window to cover `base`.
    pub fn extend(&mut self, base: &EventBase) {
        if base.timestamp < self.start_timestamp {
            self.start_timestamp = base.timestamp;
        }
        if base.timestamp > self.end_timestamp {
            self.end_timestamp = base.timestamp;
        }
        self.end_version = base.version;
    }

    /// Number of versions covered.
    pub fn version_span(&self) -> i64 {
        self.end_version - self.start_version + 1
    }

    /// Whether this window is large or old enough to be persisted.
    ///
    /// Spans are measured from the previous window's end, or from this
    /// window's own start when it is the first.
    pub fn is_completed(&self, options: &ArchiveOptions, previous: Option<&ArchiveBrief>) -> bool {
        let (versions, millis) = match previous {
            Some(prev) => (
                self.end_version - prev.end_version,
                self.end_timestamp - prev.end_timestamp,
            ),
            None => (
                self.version_span(),
                self.end_timestamp - self.start_timestamp,
            ),
        };
        versions > options.version_interval
            || millis > options.seconds_interval.saturating_mul(1000)
    }

    /// Combine two windows into one covering both ranges.
    ///
    /// The result keeps the id and index of the older (lower index) window.
    pub fn merge(self, other: ArchiveBrief) -> ArchiveBrief {
        let (older, newer) = if self.index <= other.index {
            (self, other)
        } else {
            (other, self)
        };
        ArchiveBrief {
            id: older.id,
            start_version: older.start_version.min(newer.start_version),
            end_version: older.end_version.max(newer.end_version),
            start_timestamp: older.start_timestamp.min(newer.start_timestamp),
            end_timestamp: older.end_timestamp.max(newer.end_timestamp),
            index: older.index,
            event_is_cleared: false,
        }
    }
}

/// Archive bookkeeping for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveState {
    /// Completed windows ordered by index.
    briefs: Vec<ArchiveBrief>,
    /// Window still accumulating events, not yet persisted.
    pending: Option<ArchiveBrief>,
}

impl ArchiveState {
    /// Build state from stored briefs.
    ///
    /// When the newest brief is incomplete and its events still exist it is
    /// reopened as the pending window; the returned brief must be deleted
    /// from storage so it is not counted twice.
    pub fn from_briefs(
        mut briefs: Vec<ArchiveBrief>,
        options: &ArchiveOptions,
    ) -> (Self, Option<ArchiveBrief>) {
        briefs.sort_by_key(|b| b.index);
        let mut state = Self {
            briefs,
            pending: None,
        };

        let reopen = match state.briefs.split_last() {
            Some((last, rest)) => !last.event_is_cleared && !last.is_completed(options, rest.last()),
            None => false,
        };
        if reopen {
            let resumed = state.briefs.pop();
            state.pending = resumed.clone();
            return (state, resumed);
        }
        (state, None)
    }

    pub fn briefs(&self) -> &[ArchiveBrief] {
        &self.briefs
    }

    /// Most recent completed window.
    pub fn last(&self) -> Option<&ArchiveBrief> {
        self.briefs.last()
    }

    /// Window still accumulating.
    pub fn pending(&self) -> Option<&ArchiveBrief> {
        self.pending.as_ref()
    }

    /// Most recent window whose raw events were removed.
    pub fn cleared(&self) -> Option<&ArchiveBrief> {
        self.briefs.iter().rev().find(|b| b.event_is_cleared)
    }

    /// Windows whose raw events still exist, oldest first.
    pub fn uncleared(&self) -> impl Iterator<Item = &ArchiveBrief> {
        self.briefs.iter().filter(|b| !b.event_is_cleared)
    }

    /// Feed one applied event into the pending window.
    pub fn accumulate(&mut self, base: &EventBase) {
        match self.pending.as_mut() {
            Some(pending) => pending.extend(base),
            None => {
                let index = self.briefs.last().map(|b| b.index + 1).unwrap_or(0);
                self.pending = Some(ArchiveBrief::open(index, base));
            }
        }
    }

    /// Whether the pending window meets the completion policy.
    pub fn pending_is_completed(&self, options: &ArchiveOptions) -> bool {
        self.pending
            .as_ref()
            .map(|p| p.is_completed(options, self.last()))
            .unwrap_or(false)
    }

    /// Move the pending window into the completed list.
    ///
    /// Call only after the window was persisted.
    pub fn promote_pending(&mut self) -> Option<&ArchiveBrief> {
        let brief = self.pending.take()?;
        self.briefs.push(brief);
        self.briefs.last()
    }

    /// Completed windows an event at `timestamp` would land inside.
    ///
    /// Returns the lowest-index uncleared window whose end is after
    /// `timestamp` and every window after it.
    pub fn overlapping(&self, timestamp: i64) -> &[ArchiveBrief] {
        match self
            .briefs
            .iter()
            .position(|b| !b.event_is_cleared && timestamp < b.end_timestamp)
        {
            Some(pos) => &self.briefs[pos..],
            None => &[],
        }
    }

    /// Fold every overlapping window into the pending one.
    ///
    /// Returns the folded briefs; their stored copies must be deleted.
    pub fn fold_overlapping(&mut self, timestamp: i64) -> Vec<ArchiveBrief> {
        let count = self.overlapping(timestamp).len();
        if count == 0 {
            return Vec::new();
        }
        let split = self.briefs.len() - count;
        let folded = self.briefs.split_off(split);

        let mut merged = folded.iter().cloned().reduce(ArchiveBrief::merge);
        if let Some(pending) = self.pending.take() {
            merged = Some(match merged {
                Some(m) => m.merge(pending),
                None => pending,
            });
        }
        self.pending = merged;
        folded
    }

    /// Flag a completed window as having its raw events removed.
    pub fn mark_cleared(&mut self, id: &str) {
        if let Some(brief) = self.briefs.iter_mut().find(|b| b.id == id) {
            brief.event_is_cleared = true;
        }
    }

    /// Drop every window older than the most recent cleared one.
    ///
    /// Returns the removed briefs; their stored copies must be deleted.
    pub fn collapse_cleared(&mut self) -> Vec<ArchiveBrief> {
        let Some(cleared_index) = self.cleared().map(|b| b.index) else {
            return Vec::new();
        };
        let (older, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.briefs)
            .into_iter()
            .partition(|b| b.index < cleared_index);
        self.briefs = kept;
        older
    }

    /// Forget every window.
    pub fn clear(&mut self) {
        self.briefs.clear();
        self.pending = None;
    }

    /// Whether event replay is needed to bring the windows up to `version`.
    pub fn needs_catch_up(&self, version: i64) -> bool {
        version != 0
            && self.last().map(|b| b.end_version < version).unwrap_or(true)
            && self.pending.as_ref().map(|b| b.end_version < version).unwrap_or(true)
    }

    /// Version after which catch-up replay starts.
    pub fn catch_up_from(&self) -> i64 {
        self.pending
            .as_ref()
            .or_else(|| self.last())
            .map(|b| b.end_version)
            .unwrap_or(0)
    }

    /// Completed windows cover one gap-free, non-overlapping version range.
    pub fn is_contiguous(&self) -> bool {
        self.briefs.windows(2).all(|pair| {
            pair[0].index < pair[1].index && pair[0].end_version + 1 == pair[1].start_version
        })
    }
}

#[cfg(test)]
mod tests;
