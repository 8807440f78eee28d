//! Archive completion, event compaction, closure and reset.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Grain, GrainRuntime};
use crate::archive::ArchiveState;
use crate::config::EventArchiveType;
use crate::error::{GrainError, Result};
use crate::snapshot::Snapshot;

/// What happens to an entity's raw events when it is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverType {
    /// Leave events and archives in place.
    #[default]
    None,
    /// Drop archives and move raw events to cold storage.
    ArchiveEvents,
    /// Drop archives and delete raw events.
    DeleteEvents,
}

impl<G: Grain> GrainRuntime<G> {
    /// Persist the pending window with a copy of the current snapshot.
    pub(crate) async fn complete_archive(&mut self) -> Result<()> {
        let Some(archives) = self.archives().cloned() else {
            return Ok(());
        };
        let Some(pending) = self.archive.pending().cloned() else {
            return Ok(());
        };
        archives.insert(&pending, &self.snapshot).await?;
        self.archive.promote_pending();
        info!(
            state_id = %self.state_id,
            index = pending.index,
            start_version = pending.start_version,
            end_version = pending.end_version,
            "Archive window completed"
        );
        self.on_archive_completed().await
    }

    /// Compact the oldest uncleared window once enough have accumulated.
    ///
    /// Runs only when every observer has processed the window; otherwise
    /// the events stay and compaction is retried after the next archive.
    async fn on_archive_completed(&mut self) -> Result<()> {
        let Some(archives) = self.archives().cloned() else {
            return Ok(());
        };
        if self.archive.uncleared().count() < self.archive_options.max_snapshot_archive_records {
            return Ok(());
        }
        let Some(oldest) = self.archive.uncleared().next().cloned() else {
            return Ok(());
        };

        let lagging = match self.observers.lagging(&self.state_id, oldest.end_version).await {
            Ok(lagging) => lagging,
            Err(e) => {
                warn!(state_id = %self.state_id, error = %e, "Observer version sync failed, compaction deferred");
                return Ok(());
            }
        };
        if !lagging.is_empty() {
            info!(
                state_id = %self.state_id,
                end_version = oldest.end_version,
                lagging = ?lagging,
                "Observers behind, compaction deferred"
            );
            return Ok(());
        }

        if self.saved_version < oldest.end_version {
            self.save_snapshot(true, false).await?;
        }
        let start_timestamp = self.snapshot.base.start_timestamp;
        match self.archive_options.event_archive_type {
            EventArchiveType::Delete => {
                self.storage
                    .events
                    .delete_previous(&self.state_id, oldest.end_version, start_timestamp)
                    .await?
            }
            EventArchiveType::Move => {
                archives
                    .event_archive(&self.state_id, oldest.end_version, start_timestamp)
                    .await?
            }
        }
        archives.event_is_clear(&self.state_id, &oldest.id).await?;
        self.archive.mark_cleared(&oldest.id);

        for brief in self.archive.collapse_cleared() {
            archives.delete(&self.state_id, &brief.id).await?;
        }
        info!(
            state_id = %self.state_id,
            index = oldest.index,
            end_version = oldest.end_version,
            "Events compacted"
        );
        Ok(())
    }

    /// Close the entity for good.
    ///
    /// Every mode except [`OverType::None`] first requires every observer
    /// to have processed the current version.
    #[tracing::instrument(skip_all, fields(grain_type = G::GRAIN_TYPE, state_id = %self.state_id))]
    pub async fn over(&mut self, over_type: OverType) -> Result<()> {
        self.ensure_ready()?;
        self.ensure_open()?;
        self.ensure_no_transaction()?;
        if !self.snapshot.base.is_consistent() {
            return Err(self
                .snapshot
                .base
                .insecurity(G::GRAIN_TYPE, self.snapshot.version()));
        }

        let version = self.snapshot.version();
        if over_type != OverType::None {
            let lagging = self.observers.lagging(&self.state_id, version).await?;
            if !lagging.is_empty() {
                return Err(GrainError::FollowNotCompleted {
                    state_id: self.state_id.to_string(),
                    version,
                    lagging,
                });
            }
        }

        self.snapshot.base.is_over = true;
        let closed = if self.saved_version != version || !self.snapshot_stored {
            self.save_snapshot(true, true).await
        } else {
            self.snapshot.base.is_latest = true;
            self.close_stored_snapshot().await
        };
        if let Err(e) = closed {
            self.snapshot.base.is_over = false;
            return Err(e);
        }

        let start_timestamp = self.snapshot.base.start_timestamp;
        match (over_type, self.archives().cloned()) {
            (OverType::None, Some(archives)) => {
                if !self.archive.briefs().is_empty() {
                    archives.over(&self.state_id, true).await?;
                }
            }
            (OverType::None, None) => {}
            (OverType::ArchiveEvents, Some(archives)) => {
                archives.delete_all(&self.state_id).await?;
                archives
                    .event_archive(&self.state_id, version, start_timestamp)
                    .await?;
                self.archive.clear();
            }
            (OverType::ArchiveEvents, None) => {
                warn!("No archive storage, events left in place");
            }
            (OverType::DeleteEvents, archives) => {
                if let Some(archives) = archives {
                    archives.delete_all(&self.state_id).await?;
                    self.archive.clear();
                }
                self.storage
                    .events
                    .delete_previous(&self.state_id, version, start_timestamp)
                    .await?;
            }
        }

        info!(version, over_type = ?over_type, "Grain closed");
        Ok(())
    }

    async fn close_stored_snapshot(&self) -> Result<()> {
        let snapshots = &self.storage.snapshots;
        snapshots.over(&self.state_id, true).await?;
        snapshots.update_is_latest(&self.state_id, true).await?;
        Ok(())
    }

    /// Delete every trace of the entity and restart from version 0.
    #[tracing::instrument(skip_all, fields(grain_type = G::GRAIN_TYPE, state_id = %self.state_id))]
    pub async fn reset(&mut self) -> Result<()> {
        self.ensure_ready()?;
        if let Some(archives) = self.storage.archives.as_ref() {
            archives.delete_all(&self.state_id).await?;
        }
        self.storage
            .events
            .delete_after(&self.state_id, 0, 0)
            .await?;
        self.storage.snapshots.delete(&self.state_id).await?;

        self.snapshot = Snapshot::empty(self.state_id.clone());
        self.saved_version = 0;
        self.snapshot_stored = false;
        self.archive = ArchiveState::default();
        self.transaction = None;
        info!("Grain reset");
        Ok(())
    }
}
