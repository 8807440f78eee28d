//! Snapshot save policy.

use tracing::{debug, error};

use super::{Grain, GrainRuntime};
use crate::error::Result;
use crate::utils::now_millis;

impl<G: Grain> GrainRuntime<G> {
    /// Persist the snapshot when forced or enough versions are unsaved.
    ///
    /// Fails with `StateInsecurity` while an apply is in flight and with
    /// `TransactionPending` while a transaction is open. The first save
    /// inserts the row, later ones update it. A failed write leaves the
    /// in-memory bookkeeping as it was.
    pub async fn save_snapshot(&mut self, force: bool, mark_latest: bool) -> Result<()> {
        self.ensure_no_transaction()?;
        if !self.snapshot.base.is_consistent() {
            return Err(self
                .snapshot
                .base
                .insecurity(G::GRAIN_TYPE, self.snapshot.version()));
        }
        let unsaved = self.snapshot.version() - self.saved_version;
        if !force && unsaved < self.core.snapshot_version_interval {
            return Ok(());
        }

        let previous_min = self.snapshot.base.latest_min_event_timestamp;
        let previous_latest = self.snapshot.base.is_latest;
        self.snapshot.base.latest_min_event_timestamp = now_millis();
        self.snapshot.base.is_latest = mark_latest;

        let written = if self.snapshot_stored {
            self.storage.snapshots.update(&self.snapshot).await
        } else {
            self.storage.snapshots.insert(&self.snapshot).await
        };

        match written {
            Ok(()) => {
                debug!(
                    state_id = %self.state_id,
                    version = self.snapshot.version(),
                    inserted = !self.snapshot_stored,
                    is_latest = mark_latest,
                    "Snapshot saved"
                );
                self.snapshot_stored = true;
                self.saved_version = self.snapshot.version();
                Ok(())
            }
            Err(e) => {
                self.snapshot.base.latest_min_event_timestamp = previous_min;
                self.snapshot.base.is_latest = previous_latest;
                error!(state_id = %self.state_id, error = %e, "Snapshot save failed");
                Err(e.into())
            }
        }
    }
}
