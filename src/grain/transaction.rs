//! Transactional batching: apply speculatively, append atomically.

use tracing::{debug, warn};

use super::{Grain, GrainRuntime};
use crate::codec::EventBytes;
use crate::error::{GrainError, Result};
use crate::event::{EventUid, FullyEvent};
use crate::snapshot::Snapshot;
use crate::storage::EventAppend;
use crate::utils::now_millis;

/// An open transaction.
pub(super) struct Transaction<G: Grain> {
    pub(super) backup: Snapshot<G::Key, G::State>,
    pub(super) start_version: i64,
    started_at: i64,
    events: Vec<EventAppend<G::Key, G::Event>>,
}

/// How a commit ended.
pub(super) enum Commit {
    /// The batch is durable and applied.
    Appended,
    /// Storage rejected the batch, or it was empty; nothing was written.
    Rejected,
    /// Failed before anything was written.
    NotAppended(GrainError),
    /// The batch is durable but a later step failed.
    AppendedThenFailed(GrainError),
}

impl<G: Grain> GrainRuntime<G> {
    /// Open a transaction, backing up the snapshot.
    ///
    /// A transaction older than `transaction_timeout_millis` is rolled back
    /// first; a younger one is an error.
    pub async fn begin_transaction(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.ensure_open()?;
        if let Some(tx) = &self.transaction {
            if now_millis() - tx.started_at < self.core.transaction_timeout_millis {
                return Err(GrainError::TransactionPending {
                    state_id: self.state_id.to_string(),
                    start_version: tx.start_version,
                });
            }
            warn!(state_id = %self.state_id, start_version = tx.start_version, "Stale transaction rolled back");
            self.rollback_transaction().await?;
        }
        if !self.snapshot.base.is_consistent() {
            return Err(self
                .snapshot
                .base
                .insecurity(G::GRAIN_TYPE, self.snapshot.version()));
        }
        self.transaction = Some(Transaction {
            backup: self.snapshot.clone(),
            start_version: self.snapshot.version(),
            started_at: now_millis(),
            events: Vec::new(),
        });
        Ok(())
    }

    /// Apply an event inside the open transaction without persisting it.
    pub fn tx_raise_event(&mut self, event: G::Event, uid: Option<EventUid>) -> Result<()> {
        self.ensure_ready()?;
        self.ensure_open()?;
        if self.transaction.is_none() {
            return Err(GrainError::TransactionNotStarted {
                state_id: self.state_id.to_string(),
            });
        }

        let (full, unique_id) = self.next_event(event, uid);
        self.check_not_cleared(full.timestamp())?;
        let bytes = EventBytes::from_event(&full)?;
        self.apply_event(&full)?;

        if let Some(tx) = self.transaction.as_mut() {
            tx.events.push(EventAppend {
                event: full,
                bytes,
                unique_id,
            });
        }
        Ok(())
    }

    /// Number of events queued in the open transaction.
    pub fn pending_events(&self) -> usize {
        self.transaction.as_ref().map(|tx| tx.events.len()).unwrap_or(0)
    }

    /// Append every queued event in one batch.
    ///
    /// Returns `Ok(false)` and restores the backup when storage rejects the
    /// batch, or when nothing was queued. Failures reload the entity from
    /// storage before the error is returned; a failure after the batch was
    /// written is reported as [`GrainError::BatchIncomplete`].
    #[tracing::instrument(skip_all, fields(grain_type = G::GRAIN_TYPE, state_id = %self.state_id))]
    pub async fn commit_transaction(&mut self) -> Result<bool> {
        match self.commit().await {
            Commit::Appended => Ok(true),
            Commit::Rejected => Ok(false),
            Commit::NotAppended(e) => Err(e),
            Commit::AppendedThenFailed(e) => Err(GrainError::BatchIncomplete {
                state_id: self.state_id.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Commit, telling apart failures before and after the batch append.
    pub(super) async fn commit(&mut self) -> Commit {
        if let Err(e) = self.ensure_ready() {
            return Commit::NotAppended(e);
        }
        let Some(mut tx) = self.transaction.take() else {
            return Commit::NotAppended(GrainError::TransactionNotStarted {
                state_id: self.state_id.to_string(),
            });
        };
        let Some(min_timestamp) = tx.events.iter().map(|e| e.event.timestamp()).min() else {
            return match self.restore(tx).await {
                Ok(()) => Commit::Rejected,
                Err(e) => Commit::NotAppended(e),
            };
        };

        let prepared = self.on_raise_start(&mut tx.backup.base, min_timestamp).await;
        let base = &mut self.snapshot.base;
        base.is_latest = tx.backup.base.is_latest;
        base.latest_min_event_timestamp = tx.backup.base.latest_min_event_timestamp;
        base.start_timestamp = base.start_timestamp.min(tx.backup.base.start_timestamp);
        if let Err(e) = prepared {
            return Commit::NotAppended(self.fail(e).await);
        }

        match self.storage.events.batch_append(&tx.events).await {
            Ok(true) => {
                let events: Vec<FullyEvent<G::Key, G::Event>> =
                    tx.events.iter().map(|row| row.event.clone()).collect();
                let finished = async {
                    self.on_raise_success(&events).await?;
                    self.save_snapshot(false, false).await
                }
                .await;
                if let Err(e) = finished {
                    return Commit::AppendedThenFailed(self.fail(e).await);
                }
                debug!(count = tx.events.len(), version = self.snapshot.version(), "Transaction committed");
                for row in &tx.events {
                    self.fan_out(&row.bytes).await;
                }
                Commit::Appended
            }
            Ok(false) => {
                debug!(count = tx.events.len(), "Transaction batch rejected");
                if let Err(e) = self.restore(tx).await {
                    return Commit::NotAppended(e);
                }
                self.on_raise_failed().await;
                Commit::Rejected
            }
            Err(e) => Commit::NotAppended(self.fail(e.into()).await),
        }
    }

    /// Discard the open transaction, if any.
    pub async fn rollback_transaction(&mut self) -> Result<()> {
        match self.transaction.take() {
            Some(tx) => self.restore(tx).await,
            None => Ok(()),
        }
    }

    /// Put the backup back, or reload from storage if it does not match
    /// the transaction start.
    async fn restore(&mut self, tx: Transaction<G>) -> Result<()> {
        if tx.backup.version() == tx.start_version && tx.backup.base.is_consistent() {
            self.snapshot = tx.backup;
            Ok(())
        } else {
            warn!(state_id = %self.state_id, "Transaction backup unusable, recovering from storage");
            self.recover_snapshot().await
        }
    }
}
