//! Crate-level error type for grain operations.
//!
//! Layer-specific errors (`StorageError`, `BusError`, `CodecError`) live next
//! to the ports that produce them and convert into [`GrainError`] via `?`.

use crate::bus::BusError;
use crate::codec::CodecError;
use crate::grain::Lifecycle;
use crate::storage::StorageError;

/// Result type for grain operations.
pub type Result<T> = std::result::Result<T, GrainError>;

/// Errors surfaced by the grain runtime.
#[derive(Debug, thiserror::Error)]
pub enum GrainError {
    /// A command was issued against a closed entity.
    #[error("State is over: grain_type={grain_type}, state_id={state_id}")]
    StateIsOver {
        grain_type: &'static str,
        state_id: String,
    },

    /// The doing/committed version pair disagrees.
    ///
    /// A prior operation crashed mid-apply, or an event arrived out of order.
    #[error(
        "State insecurity: grain_type={grain_type}, state_id={state_id}, \
         version={version}, doing_version={doing_version}, event_version={event_version}"
    )]
    StateInsecurity {
        grain_type: &'static str,
        state_id: String,
        version: i64,
        doing_version: i64,
        event_version: i64,
    },

    /// The event belongs to a window whose raw events were already removed.
    #[error(
        "Event is cleared: state_id={state_id}, event_timestamp={event_timestamp}, \
         cleared_index={cleared_index}"
    )]
    EventIsCleared {
        state_id: String,
        event_timestamp: i64,
        cleared_index: i32,
    },

    /// Closure was requested before every observer caught up.
    #[error("Observers not caught up: state_id={state_id}, version={version}, lagging={lagging:?}")]
    FollowNotCompleted {
        state_id: String,
        version: i64,
        lagging: Vec<i64>,
    },

    /// Operation attempted outside the `Ready` lifecycle state.
    #[error("Grain is not active: state_id={state_id}, lifecycle={lifecycle:?}")]
    NotActive {
        state_id: String,
        lifecycle: Lifecycle,
    },

    /// A transaction is already open.
    #[error("Transaction already pending: state_id={state_id}, start_version={start_version}")]
    TransactionPending { state_id: String, start_version: i64 },

    /// A transactional raise or commit without `begin_transaction`.
    #[error("No transaction open: state_id={state_id}")]
    TransactionNotStarted { state_id: String },

    /// A batch was appended but a later step failed.
    ///
    /// The events are durable and the runtime has reloaded from storage;
    /// raising them again would duplicate them.
    #[error("Batch appended but not completed: state_id={state_id}, reason={reason}")]
    BatchIncomplete { state_id: String, reason: String },

    /// No binding was registered for the grain type.
    #[error("Grain type not registered: {grain_type}")]
    NotRegistered { grain_type: &'static str },

    /// The batching task that owns the runtime is no longer running.
    #[error("grain task is no longer running")]
    GrainGone,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl GrainError {
    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FollowNotCompleted { .. }
                | Self::StateInsecurity { .. }
                | Self::TransactionPending { .. }
                | Self::Storage(_)
                | Self::Bus(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_over_display() {
        let err = GrainError::StateIsOver {
            grain_type: "account",
            state_id: "42".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "State is over: grain_type=account, state_id=42"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_follow_not_completed_is_retryable() {
        let err = GrainError::FollowNotCompleted {
            state_id: "1".to_string(),
            version: 10,
            lagging: vec![7],
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("lagging=[7]"));
    }

    #[test]
    fn test_event_is_cleared_not_retryable() {
        let err = GrainError::EventIsCleared {
            state_id: "1".to_string(),
            event_timestamp: 5,
            cleared_index: 2,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_batch_incomplete_not_retryable() {
        let err = GrainError::BatchIncomplete {
            state_id: "1".to_string(),
            reason: "snapshot write failed".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("reason=snapshot write failed"));
    }

    #[test]
    fn test_storage_error_converts() {
        let err: GrainError = StorageError::Unavailable("down".to_string()).into();
        assert!(matches!(err, GrainError::Storage(_)));
        assert!(err.is_retryable());
    }

    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<GrainError>();
        }
    };
}
