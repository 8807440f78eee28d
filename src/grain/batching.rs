//! Single-writer task that batches concurrent raises into transactions.
//!
//! [`BatchingGrain::spawn`] moves an activated [`GrainRuntime`] into a task
//! that owns it exclusively. Callers send decision closures over an mpsc
//! channel; the task gathers them for up to `batch_window_millis`, applies
//! them inside one transaction and commits with a single batch append. If
//! the batch was not written, every input is retried on its own through
//! [`GrainRuntime::raise_event`]. A batch that was written but failed
//! afterwards is never retried; its callers get the error.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::transaction::Commit;
use super::{Grain, GrainRuntime, Lifecycle};
use crate::error::{GrainError, Result};
use crate::event::EventUid;
use crate::snapshot::Snapshot;

/// Channel capacity between handles and the batching task.
const CHANNEL_CAPACITY: usize = 1024;

/// Picks the event an input raises, given the current state.
///
/// Returning `None` raises nothing. The closure may run more than once when
/// a batch falls back to per-input raising.
pub type Decision<G> =
    Box<dyn Fn(&<G as Grain>::State) -> Option<<G as Grain>::Event> + Send + Sync>;

struct RaiseInput<G: Grain> {
    decide: Decision<G>,
    uid: Option<EventUid>,
    reply: oneshot::Sender<Result<bool>>,
}

enum Message<G: Grain> {
    Raise(RaiseInput<G>),
    Snapshot {
        reply: oneshot::Sender<Snapshot<G::Key, G::State>>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<GrainRuntime<G>>>,
    },
}

/// Cloneable handle to a runtime owned by a batching task.
pub struct BatchingGrain<G: Grain> {
    sender: mpsc::Sender<Message<G>>,
}

impl<G: Grain> Clone for BatchingGrain<G> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<G: Grain> BatchingGrain<G> {
    /// Move `runtime` into a new batching task.
    ///
    /// The runtime should already be activated; inputs sent to an inactive
    /// runtime fail with `NotActive`.
    pub fn spawn(runtime: GrainRuntime<G>) -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(run(runtime, receiver));
        Self { sender }
    }

    /// Raise whatever `decide` returns for the state it sees.
    ///
    /// Resolves to `Ok(false)` when `decide` returns `None` or the event
    /// was a duplicate.
    pub async fn raise<F>(&self, decide: F, uid: Option<EventUid>) -> Result<bool>
    where
        F: Fn(&G::State) -> Option<G::Event> + Send + Sync + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(Message::Raise(RaiseInput {
                decide: Box::new(decide),
                uid,
                reply,
            }))
            .await
            .map_err(|_| GrainError::GrainGone)?;
        rx.await.map_err(|_| GrainError::GrainGone)?
    }

    /// Copy of the current snapshot.
    pub async fn snapshot(&self) -> Result<Snapshot<G::Key, G::State>> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(Message::Snapshot { reply })
            .await
            .map_err(|_| GrainError::GrainGone)?;
        rx.await.map_err(|_| GrainError::GrainGone)
    }

    /// Deactivate the runtime and take it back.
    ///
    /// Inputs already queued ahead of the shutdown are processed first.
    pub async fn shutdown(self) -> Result<GrainRuntime<G>> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(Message::Shutdown { reply })
            .await
            .map_err(|_| GrainError::GrainGone)?;
        rx.await.map_err(|_| GrainError::GrainGone)?
    }

    /// Whether the batching task is still running.
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

async fn run<G: Grain>(mut runtime: GrainRuntime<G>, mut receiver: mpsc::Receiver<Message<G>>) {
    let window = Duration::from_millis(runtime.core_options().batch_window_millis);
    let max_batch = runtime.core_options().max_batch_size.max(1);

    while let Some(first) = receiver.recv().await {
        let mut batch = Vec::new();
        let mut control = None;
        match first {
            Message::Raise(input) => batch.push(input),
            other => control = Some(other),
        }

        if control.is_none() {
            let deadline = Instant::now() + window;
            while batch.len() < max_batch {
                match tokio::time::timeout_at(deadline, receiver.recv()).await {
                    Ok(Some(Message::Raise(input))) => batch.push(input),
                    Ok(Some(other)) => {
                        control = Some(other);
                        break;
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        }

        if !batch.is_empty() {
            process_batch(&mut runtime, batch).await;
        }

        match control {
            Some(Message::Snapshot { reply }) => {
                let _ = reply.send(runtime.snapshot().clone());
            }
            Some(Message::Shutdown { reply }) => {
                let result = runtime.deactivate().await;
                let _ = reply.send(result.map(|()| runtime));
                return;
            }
            Some(Message::Raise(_)) | None => {}
        }
    }

    // Every handle dropped.
    if runtime.lifecycle() == Lifecycle::Ready {
        if let Err(e) = runtime.deactivate().await {
            error!(grain_type = G::GRAIN_TYPE, state_id = %runtime.state_id(), error = %e, "Deactivation after last handle dropped failed");
        }
    }
}

enum Staged {
    Raised,
    Skipped,
    Failed(GrainError),
}

async fn process_batch<G: Grain>(runtime: &mut GrainRuntime<G>, batch: Vec<RaiseInput<G>>) {
    if batch.len() == 1 {
        for input in batch {
            raise_one(runtime, input).await;
        }
        return;
    }

    if let Err(e) = runtime.begin_transaction().await {
        debug!(error = %e, "Could not open batch transaction, raising inputs one by one");
        for input in batch {
            raise_one(runtime, input).await;
        }
        return;
    }

    let mut staged = Vec::with_capacity(batch.len());
    for input in &batch {
        let outcome = match (input.decide)(runtime.state()) {
            None => Staged::Skipped,
            Some(event) => match runtime.tx_raise_event(event, input.uid.clone()) {
                Ok(()) => Staged::Raised,
                Err(e) => Staged::Failed(e),
            },
        };
        staged.push(outcome);
    }

    if !staged.iter().any(|s| matches!(s, Staged::Raised)) {
        if let Err(e) = runtime.rollback_transaction().await {
            warn!(error = %e, "Rollback of empty batch failed");
        }
        for (input, outcome) in batch.into_iter().zip(staged) {
            let _ = input.reply.send(match outcome {
                Staged::Failed(e) => Err(e),
                _ => Ok(false),
            });
        }
        return;
    }

    let count = runtime.pending_events();
    match runtime.commit().await {
        Commit::Appended => {
            debug!(count, "Batch committed");
            for (input, outcome) in batch.into_iter().zip(staged) {
                let _ = input.reply.send(match outcome {
                    Staged::Raised => Ok(true),
                    Staged::Skipped => Ok(false),
                    Staged::Failed(e) => Err(e),
                });
            }
        }
        Commit::AppendedThenFailed(e) => {
            // The events are durable; raising them again would duplicate them.
            error!(count, error = %e, "Batch appended but not completed");
            let state_id = runtime.state_id().to_string();
            let reason = e.to_string();
            for (input, outcome) in batch.into_iter().zip(staged) {
                let _ = input.reply.send(match outcome {
                    Staged::Raised => Err(GrainError::BatchIncomplete {
                        state_id: state_id.clone(),
                        reason: reason.clone(),
                    }),
                    Staged::Skipped => Ok(false),
                    Staged::Failed(e) => Err(e),
                });
            }
        }
        not_written => {
            match not_written {
                Commit::NotAppended(e) => warn!(count, error = %e, "Batch commit failed, raising inputs one by one"),
                _ => debug!(count, "Batch rejected, raising inputs one by one"),
            }
            for (input, outcome) in batch.into_iter().zip(staged) {
                match outcome {
                    Staged::Failed(e) => {
                        let _ = input.reply.send(Err(e));
                    }
                    _ => raise_one(runtime, input).await,
                }
            }
        }
    }
}

async fn raise_one<G: Grain>(runtime: &mut GrainRuntime<G>, input: RaiseInput<G>) {
    let result = match (input.decide)(runtime.state()) {
        Some(event) => runtime.raise_event(event, input.uid).await,
        None => Ok(false),
    };
    let _ = input.reply.send(result);
}
