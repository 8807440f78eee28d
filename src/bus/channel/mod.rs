//! In-memory channel-based producer for standalone mode.
//!
//! Uses a tokio broadcast channel for pub/sub within a single process.
//! Subscribed handlers run on a consumer task started by
//! [`ChannelProducer::start_consuming`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info};

use super::{EventProducer, FrameHandler, Result};

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 1024;

/// One published message.
#[derive(Debug, Clone)]
struct Message {
    partition_key: String,
    frame: Bytes,
}

/// In-process producer using a tokio broadcast channel.
pub struct ChannelProducer {
    /// Broadcast sender for publishing frames.
    sender: broadcast::Sender<Arc<Message>>,
    /// Registered frame handlers.
    handlers: Arc<RwLock<Vec<Box<dyn FrameHandler>>>>,
    /// Flag indicating if consumer task is running.
    consuming: Arc<RwLock<bool>>,
}

impl Default for ChannelProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelProducer {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        info!("Channel producer initialized");
        Self {
            sender,
            handlers: Arc::new(RwLock::new(Vec::new())),
            consuming: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a handler; it receives every frame published after
    /// [`start_consuming`](Self::start_consuming).
    pub async fn subscribe(&self, handler: Box<dyn FrameHandler>) {
        let count = {
            let mut handlers = self.handlers.write().await;
            handlers.push(handler);
            handlers.len()
        };
        info!(handler_count = count, "Handler subscribed to channel producer");
    }

    /// Start the consumer task (call after subscribe).
    pub async fn start_consuming(&self) {
        {
            let mut consuming = self.consuming.write().await;
            if *consuming {
                return;
            }
            *consuming = true;
        }

        let mut receiver = self.sender.subscribe();
        let handlers = self.handlers.clone();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        debug!(
                            partition_key = %message.partition_key,
                            "Received frame via channel"
                        );
                        super::dispatch_to_handlers(
                            &handlers,
                            &message.frame,
                            &message.partition_key,
                        )
                        .await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        error!(skipped = n, "Channel consumer lagged, skipped frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Channel closed, stopping consumer");
                        break;
                    }
                }
            }
        });

        info!("Channel consumer started");
    }
}

#[async_trait]
impl EventProducer for ChannelProducer {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(partition_key = %partition_key))]
    async fn publish(&self, frame: Bytes, partition_key: &str) -> Result<()> {
        let message = Arc::new(Message {
            partition_key: partition_key.to_string(),
            frame,
        });

        // No receivers is fine for publish-only setups.
        match self.sender.send(message) {
            Ok(receivers) => debug!(receivers, "Published frame to channel"),
            Err(_) => debug!("Published frame (no receivers)"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
