//! Message bus for async event delivery.
//!
//! This module contains:
//! - `EventProducer` trait: best-effort publish of an event frame
//! - `FrameHandler` trait: consumer side of a subscription
//! - Implementations: in-process broadcast channel, mock

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

pub mod channel;
pub mod dispatch;
pub mod mock;

pub use channel::ChannelProducer;
pub use dispatch::dispatch_to_handlers;
pub use mock::MockProducer;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus or observer delivery.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Observer '{name}' failed: {message}")]
    ObserverFailed { name: String, message: String },

    #[error("Codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),
}

/// Producer side of the message bus.
///
/// Frames are opaque to the producer; `partition_key` is the entity id so
/// partitioned transports keep one entity's events in order.
#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn publish(&self, frame: Bytes, partition_key: &str) -> Result<()>;
}

/// Handler for frames received from the bus.
pub trait FrameHandler: Send + Sync {
    fn handle(&self, frame: Bytes) -> BoxFuture<'static, Result<()>>;
}
