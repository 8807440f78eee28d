use super::*;
use crate::test_utils::CountingHandler;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_channel_publish_no_receivers() {
    let producer = ChannelProducer::new();

    // Should not error even with no receivers
    let result = producer.publish(Bytes::from_static(b"frame"), "1").await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_channel_subscribe_and_receive() {
    let producer = ChannelProducer::new();

    let handler = CountingHandler::new();
    let count = handler.count();
    producer.subscribe(Box::new(handler)).await;
    producer.start_consuming().await;

    // Give consumer time to start
    tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

    producer.publish(Bytes::from_static(b"a"), "1").await.unwrap();
    producer.publish(Bytes::from_static(b"b"), "2").await.unwrap();

    // Give handler time to process
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_channel_start_consuming_is_idempotent() {
    let producer = ChannelProducer::new();

    let handler = CountingHandler::new();
    let count = handler.count();
    producer.subscribe(Box::new(handler)).await;
    producer.start_consuming().await;
    producer.start_consuming().await;

    tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    producer.publish(Bytes::from_static(b"a"), "1").await.unwrap();
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    // A second consumer task would double-deliver.
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
