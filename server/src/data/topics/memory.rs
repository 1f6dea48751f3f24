//! In-memory topic backend
//!
//! Broadcast via tokio::broadcast channels. Local-only: suitable for
//! single-process deployments; use the Redis backend to fan realtime events
//! out across processes.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::backend::{BroadcastSubscription, TopicBackend};
use super::error::TopicError;

/// Default broadcast channel capacity
const DEFAULT_BROADCAST_CAPACITY: usize = 10_000;

/// In-memory topic backend
pub struct MemoryTopicBackend {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>>,
    capacity: usize,
}

impl Default for MemoryTopicBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTopicBackend {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }

    /// Get or create a broadcast channel
    fn get_or_create(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        {
            let channels = self.channels.read();
            if let Some(sender) = channels.get(topic) {
                return sender.clone();
            }
        }

        let mut channels = self.channels.write();
        // Double-check after acquiring write lock
        if let Some(sender) = channels.get(topic) {
            return sender.clone();
        }

        let (sender, _) = broadcast::channel(self.capacity);
        channels.insert(topic.to_string(), sender.clone());
        sender
    }
}

#[async_trait]
impl TopicBackend for MemoryTopicBackend {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TopicError> {
        let sender = self.get_or_create(topic);
        // Ignore send errors - means no active subscribers
        let _ = sender.send(payload.to_vec());
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BroadcastSubscription, TopicError> {
        let sender = self.get_or_create(topic);
        let mut receiver = sender.subscribe();

        let stream = stream! {
            loop {
                match receiver.recv().await {
                    Ok(payload) => yield Ok(payload),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        yield Err(TopicError::Lagged(n));
                    }
                }
            }
        };

        Ok(BroadcastSubscription {
            receiver: Box::pin(stream),
        })
    }

    async fn health_check(&self) -> Result<(), TopicError> {
        // In-memory backend is always healthy
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let backend = MemoryTopicBackend::new();

        let sub = backend.subscribe("test").await.unwrap();
        let mut receiver = sub.receiver;

        backend.publish("test", b"hello").await.unwrap();

        let msg = tokio::time::timeout(tokio::time::Duration::from_millis(100), receiver.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(msg, b"hello");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let backend = MemoryTopicBackend::new();
        // No subscribers: publish succeeds, message is gone
        backend.publish("test", b"lost").await.unwrap();
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_message() {
        let backend = MemoryTopicBackend::new();

        let mut sub1 = backend.subscribe("test").await.unwrap().receiver;
        let mut sub2 = backend.subscribe("test").await.unwrap().receiver;

        backend.publish("test", b"broadcast").await.unwrap();

        let timeout = tokio::time::Duration::from_millis(100);
        let msg1 = tokio::time::timeout(timeout, sub1.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let msg2 = tokio::time::timeout(timeout, sub2.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(msg1, b"broadcast");
        assert_eq!(msg2, b"broadcast");
    }

    #[test]
    fn test_backend_name() {
        let backend = MemoryTopicBackend::new();
        assert_eq!(backend.backend_name(), "memory");
    }
}
