//! Handler dispatch utilities.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::error;

use super::FrameHandler;

/// Dispatch a frame to all registered handlers.
///
/// Calls each handler in sequence, logging errors but continuing to subsequent
/// handlers. Returns `true` if all handlers succeeded, `false` if any failed.
pub async fn dispatch_to_handlers(
    handlers: &Arc<RwLock<Vec<Box<dyn FrameHandler>>>>,
    frame: &Bytes,
    partition_key: &str,
) -> bool {
    let handlers_guard = handlers.read().await;
    let mut all_succeeded = true;

    for handler in handlers_guard.iter() {
        if let Err(e) = handler.handle(frame.clone()).await {
            error!(partition_key = %partition_key, error = %e, "Handler failed");
            all_succeeded = false;
        }
    }

    all_succeeded
}
