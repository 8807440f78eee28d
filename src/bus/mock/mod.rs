//! Mock producer implementation for testing.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{BusError, EventProducer, Result};

/// Mock producer recording every publish.
#[derive(Default)]
pub struct MockProducer {
    published: RwLock<Vec<(String, Bytes)>>,
    fail_on_publish: RwLock<bool>,
}

impl MockProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Drain the recorded `(partition_key, frame)` pairs.
    pub async fn take_published(&self) -> Vec<(String, Bytes)> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl EventProducer for MockProducer {
    async fn publish(&self, frame: Bytes, partition_key: &str) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Connection("Mock publish failure".to_string()));
        }
        self.published
            .write()
            .await
            .push((partition_key.to_string(), frame));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_producer_publish() {
        let producer = MockProducer::new();
        producer.publish(Bytes::from_static(b"x"), "42").await.unwrap();

        assert_eq!(producer.published_count().await, 1);
        let published = producer.take_published().await;
        assert_eq!(published[0].0, "42");
        assert_eq!(producer.published_count().await, 0);
    }

    #[tokio::test]
    async fn test_mock_producer_fail_on_publish() {
        let producer = MockProducer::new();
        producer.set_fail_on_publish(true).await;

        let result = producer.publish(Bytes::from_static(b"x"), "42").await;
        assert!(matches!(result, Err(BusError::Connection(_))));
        assert_eq!(producer.published_count().await, 0);
    }
}
