//! The event-raising pipeline and observer fan-out.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{Grain, GrainRuntime};
use crate::codec::EventBytes;
use crate::error::{GrainError, Result};
use crate::event::{EventBase, EventUid, FullyEvent};
use crate::snapshot::SnapshotBase;
use crate::utils::now_millis;

impl<G: Grain> GrainRuntime<G> {
    /// Append, apply and fan out one event.
    ///
    /// Returns `Ok(false)` when storage already holds the idempotency key or
    /// the version; nothing changes in that case. Any failure after the
    /// pre-apply marker reloads the entity from storage before the error
    /// is returned, so the next call starts from consistent state.
    #[tracing::instrument(skip_all, fields(grain_type = G::GRAIN_TYPE, state_id = %self.state_id))]
    pub async fn raise_event(&mut self, event: G::Event, uid: Option<EventUid>) -> Result<bool> {
        self.ensure_ready()?;
        self.ensure_open()?;
        self.ensure_no_transaction()?;

        let (full, unique_id) = self.next_event(event, uid);
        self.check_not_cleared(full.timestamp())?;
        let bytes = EventBytes::from_event(&full)?;

        let mut base = self.snapshot.base.clone();
        let prepared = self.on_raise_start(&mut base, full.timestamp()).await;
        self.snapshot.base = base;
        if let Err(e) = prepared {
            return Err(self.fail(e).await);
        }

        if let Err(e) = self.snapshot.base.increment_doing_version(G::GRAIN_TYPE) {
            return Err(self.fail(e).await);
        }

        match self.storage.events.append(&full, &bytes, &unique_id).await {
            Ok(true) => match self.on_appended(&full).await {
                Ok(()) => {
                    self.fan_out(&bytes).await;
                    Ok(true)
                }
                Err(e) => Err(self.fail(e).await),
            },
            Ok(false) => {
                debug!(version = full.version(), unique_id = %unique_id, "Duplicate event rejected");
                self.snapshot.base.decrement_doing_version();
                self.on_raise_failed().await;
                Ok(false)
            }
            Err(e) => Err(self.fail(e.into()).await),
        }
    }

    /// Stamp the next version onto a payload.
    pub(crate) fn next_event(
        &self,
        event: G::Event,
        uid: Option<EventUid>,
    ) -> (FullyEvent<G::Key, G::Event>, String) {
        let (timestamp, unique_id) = match uid {
            Some(uid) => (uid.timestamp, uid.uid),
            None => (now_millis(), Uuid::new_v4().to_string()),
        };
        let base = EventBase::new(self.snapshot.version() + 1, timestamp);
        (FullyEvent::new(self.state_id.clone(), event, base), unique_id)
    }

    /// Reject events that land in a window whose raw events are gone.
    pub(crate) fn check_not_cleared(&self, timestamp: i64) -> Result<()> {
        if !self.archive_enabled() {
            return Ok(());
        }
        match self.archive.cleared() {
            Some(cleared) if timestamp < cleared.end_timestamp => Err(GrainError::EventIsCleared {
                state_id: self.state_id.to_string(),
                event_timestamp: timestamp,
                cleared_index: cleared.index,
            }),
            _ => Ok(()),
        }
    }

    /// Storage bookkeeping before an append at `timestamp`.
    ///
    /// Demotes the latest flag, lowers the replay and start timestamps so
    /// recovery still finds the event, and folds archive windows the event
    /// lands inside into the pending one.
    pub(crate) async fn on_raise_start(
        &mut self,
        base: &mut SnapshotBase<G::Key>,
        timestamp: i64,
    ) -> Result<()> {
        let snapshots = &self.storage.snapshots;
        if base.is_latest {
            if self.snapshot_stored {
                snapshots.update_is_latest(&self.state_id, false).await?;
            }
            base.is_latest = false;
        }
        if self.snapshot_stored {
            if timestamp < base.latest_min_event_timestamp {
                snapshots
                    .update_latest_min_event_timestamp(&self.state_id, timestamp)
                    .await?;
                base.latest_min_event_timestamp = timestamp;
            }
            if timestamp < base.start_timestamp {
                snapshots
                    .update_start_timestamp(&self.state_id, timestamp)
                    .await?;
                base.start_timestamp = timestamp;
            }
        }

        if let Some(archives) = self.archives().cloned() {
            let folded = self.archive.fold_overlapping(timestamp);
            for brief in &folded {
                archives.delete(&self.state_id, &brief.id).await?;
            }
            if !folded.is_empty() {
                info!(
                    state_id = %self.state_id,
                    timestamp,
                    folded = folded.len(),
                    "Folded archive windows into the pending one"
                );
            }
        }
        Ok(())
    }

    /// Apply an appended event and run the post-append steps.
    async fn on_appended(&mut self, event: &FullyEvent<G::Key, G::Event>) -> Result<()> {
        self.grain.apply(&mut self.snapshot, event);
        self.snapshot.base.update_version(&event.base, G::GRAIN_TYPE)?;
        self.on_raise_success(std::slice::from_ref(event)).await?;
        self.save_snapshot(false, false).await
    }

    /// Feed applied events into the archive window, completing it if due.
    pub(crate) async fn on_raise_success(
        &mut self,
        events: &[FullyEvent<G::Key, G::Event>],
    ) -> Result<()> {
        if !self.archive_enabled() {
            return Ok(());
        }
        for event in events {
            self.archive.accumulate(&event.base);
        }
        if self.archive.pending_is_completed(&self.archive_options) {
            self.complete_archive().await?;
        }
        Ok(())
    }

    /// Complete a due archive window after a rejected append.
    pub(crate) async fn on_raise_failed(&mut self) {
        if self.archive_enabled() && self.archive.pending_is_completed(&self.archive_options) {
            if let Err(e) = self.complete_archive().await {
                warn!(state_id = %self.state_id, error = %e, "Archive flush after rejected append failed");
            }
        }
    }

    /// Log, reload from storage and hand back the error.
    pub(crate) async fn fail(&mut self, err: GrainError) -> GrainError {
        error!(state_id = %self.state_id, error = %err, "Raise failed, recovering");
        self.recover_after_failure().await;
        err
    }

    /// Deliver an appended event to the bus and observers.
    ///
    /// Never fails: every delivery problem is logged.
    pub(crate) async fn fan_out(&self, bytes: &EventBytes) {
        let frame = match bytes.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(state_id = %self.state_id, error = %e, "Failed to frame event");
                return;
            }
        };
        let key = self.state_id.to_string();

        match (&self.producer, self.core.priority_async_event_bus) {
            (Some(producer), true) => {
                if let Err(e) = producer.publish(frame.clone(), &key).await {
                    warn!(state_id = %key, error = %e, "Bus publish failed, delivering to observers directly");
                    if !self.observers.deliver(&frame).await {
                        error!(state_id = %key, "Direct observer delivery failed");
                    }
                }
            }
            (Some(producer), false) => {
                if self.observers.is_empty() || !self.observers.deliver(&frame).await {
                    if let Err(e) = producer.publish(frame, &key).await {
                        error!(state_id = %key, error = %e, "Bus publish fallback failed");
                    }
                }
            }
            (None, _) => {
                if !self.observers.deliver(&frame).await {
                    error!(state_id = %key, "Direct observer delivery failed");
                }
            }
        }
    }
}
