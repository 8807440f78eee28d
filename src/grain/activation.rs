//! Activation, recovery and deactivation.

use tracing::{debug, error, info};

use super::{Grain, GrainRuntime, Lifecycle};
use crate::archive::ArchiveState;
use crate::error::{GrainError, Result};
use crate::event::FullyEvent;
use crate::snapshot::Snapshot;

impl<G: Grain> GrainRuntime<G> {
    /// Recover state from storage and mark the runtime ready.
    ///
    /// Allowed from `Uninitialized` or `Deactivated`. On failure the runtime
    /// falls back to `Uninitialized` and the error is returned; the host is
    /// expected to retry on a fresh instance.
    #[tracing::instrument(skip_all, fields(grain_type = G::GRAIN_TYPE, state_id = %self.state_id))]
    pub async fn activate(&mut self) -> Result<()> {
        if !matches!(
            self.lifecycle,
            Lifecycle::Uninitialized | Lifecycle::Deactivated
        ) {
            return Err(GrainError::NotActive {
                state_id: self.state_id.to_string(),
                lifecycle: self.lifecycle,
            });
        }
        self.lifecycle = Lifecycle::Activating;

        if let Err(e) = self.load().await {
            error!(critical = true, error = %e, "Grain activation failed");
            self.lifecycle = Lifecycle::Uninitialized;
            return Err(e);
        }

        self.lifecycle = Lifecycle::Ready;
        if let Err(e) = self.grain.on_activated(&self.snapshot).await {
            error!(critical = true, error = %e, "on_activated hook failed");
            self.lifecycle = Lifecycle::Uninitialized;
            return Err(e);
        }

        info!(version = self.snapshot.version(), "Grain activated");
        Ok(())
    }

    /// Flush unsaved state and unload.
    ///
    /// Saves the snapshot (marked latest) when enough versions are unsaved,
    /// then completes a pending archive window that is large enough. An
    /// open transaction is rolled back first.
    #[tracing::instrument(skip_all, fields(grain_type = G::GRAIN_TYPE, state_id = %self.state_id))]
    pub async fn deactivate(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.lifecycle = Lifecycle::Deactivating;

        let mut result = self.rollback_transaction().await;
        if result.is_ok() {
            result = self.flush().await;
        }
        if let Err(e) = &result {
            error!(error = %e, "Deactivation flush failed");
        }
        if let Err(e) = self.grain.on_deactivated(&self.snapshot).await {
            error!(error = %e, "on_deactivated hook failed");
            result = result.and(Err(e));
        }

        self.lifecycle = Lifecycle::Deactivated;
        info!(version = self.snapshot.version(), "Grain deactivated");
        result
    }

    async fn flush(&mut self) -> Result<()> {
        if self.snapshot.version() - self.saved_version >= self.core.min_snapshot_version_interval {
            self.save_snapshot(true, true).await?;
        }
        let archive_due = self
            .archive
            .pending()
            .map(|p| p.version_span() >= self.archive_options.min_version_interval_at_deactivate)
            .unwrap_or(false);
        if self.archive_enabled() && archive_due {
            self.complete_archive().await?;
        }
        Ok(())
    }

    /// Full reload: archives, snapshot, archive catch-up.
    pub(crate) async fn load(&mut self) -> Result<()> {
        self.transaction = None;
        if self.archive_enabled() {
            self.load_archives().await?;
        } else {
            self.archive = ArchiveState::default();
        }
        self.recover_snapshot().await?;
        if self.archive_enabled() && self.archive.needs_catch_up(self.snapshot.version()) {
            self.catch_up_archive().await?;
        }
        Ok(())
    }

    /// Reload after a failed operation.
    ///
    /// A failed reload leaves the runtime `Uninitialized` so no further
    /// operation runs on untrusted state.
    pub(crate) async fn recover_after_failure(&mut self) {
        debug!("Forcing recovery from the event log");
        if let Err(e) = self.load().await {
            error!(critical = true, error = %e, "Recovery after failure failed");
            self.lifecycle = Lifecycle::Uninitialized;
        }
    }

    async fn load_archives(&mut self) -> Result<()> {
        let Some(archives) = self.archives().cloned() else {
            return Ok(());
        };
        let briefs = archives.get_brief_list(&self.state_id).await?;
        let (state, resumed) = ArchiveState::from_briefs(briefs, &self.archive_options);
        if let Some(brief) = resumed {
            debug!(brief_id = %brief.id, index = brief.index, "Resuming incomplete archive window");
            archives.delete(&self.state_id, &brief.id).await?;
        }
        self.archive = state;
        Ok(())
    }

    /// Load the stored snapshot (or an archived copy, or an empty one) and
    /// replay every event after it.
    pub(crate) async fn recover_snapshot(&mut self) -> Result<()> {
        let (mut snapshot, stored) = match self.storage.snapshots.get(&self.state_id).await? {
            Some(snapshot) => (snapshot, true),
            None => match self.archived_snapshot().await? {
                Some(mut snapshot) => {
                    snapshot.base.latest_min_event_timestamp = 0;
                    snapshot.base.is_latest = false;
                    self.storage.snapshots.insert(&snapshot).await?;
                    info!(version = snapshot.version(), "Restored snapshot from archive");
                    (snapshot, true)
                }
                None => (Snapshot::empty(self.state_id.clone()), false),
            },
        };
        snapshot.base.doing_version = snapshot.base.version;

        self.saved_version = if stored { snapshot.version() } else { 0 };
        self.snapshot_stored = stored;
        let fast_path = snapshot.base.is_latest;
        self.snapshot = snapshot;

        if fast_path {
            debug!(version = self.snapshot.version(), "Snapshot is latest, skipping replay");
            return Ok(());
        }
        self.replay().await
    }

    async fn archived_snapshot(&self) -> Result<Option<Snapshot<G::Key, G::State>>> {
        let (Some(archives), Some(last)) = (self.archives(), self.archive.last()) else {
            return Ok(None);
        };
        Ok(archives.get_by_id(&last.id).await?)
    }

    async fn replay(&mut self) -> Result<()> {
        let page = self.core.number_of_events_per_read;
        let mut pages = 0;
        loop {
            let start = self.snapshot.version() + 1;
            let events = self
                .storage
                .events
                .get_list(
                    &self.state_id,
                    self.snapshot.base.latest_min_event_timestamp,
                    start,
                    start + page - 1,
                )
                .await?;
            pages += 1;
            for event in &events {
                self.apply_event(event)?;
            }
            if (events.len() as i64) < page {
                break;
            }
        }
        debug!(pages, version = self.snapshot.version(), "Replayed event log");
        Ok(())
    }

    /// Feed the events the archive windows have not seen yet into the
    /// pending window. The snapshot is not touched.
    async fn catch_up_archive(&mut self) -> Result<()> {
        let page = self.core.number_of_events_per_read;
        let target = self.snapshot.version();
        let mut from = self.archive.catch_up_from();
        while from < target {
            let events = self
                .storage
                .events
                .get_list(
                    &self.state_id,
                    self.snapshot.base.start_timestamp,
                    from + 1,
                    (from + page).min(target),
                )
                .await?;
            let Some(last) = events.last().map(|e| e.version()) else {
                break;
            };
            for event in &events {
                self.archive.accumulate(&event.base);
            }
            from = last;
        }
        debug!(from = self.archive.catch_up_from(), "Archive windows caught up");
        Ok(())
    }

    /// Two-phase apply of one event to the snapshot.
    pub(crate) fn apply_event(&mut self, event: &FullyEvent<G::Key, G::Event>) -> Result<()> {
        self.snapshot.base.increment_doing_version(G::GRAIN_TYPE)?;
        self.grain.apply(&mut self.snapshot, event);
        self.snapshot.base.update_version(&event.base, G::GRAIN_TYPE)
    }
}
