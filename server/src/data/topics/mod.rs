//! Realtime topic system
//!
//! Fire-and-forget pub/sub with pluggable backends:
//! - In-memory (default) - local-only, for single-process deployments
//! - Redis (optional) - Redis Pub/Sub, for multi-machine deployments
//!
//! Carries the best-effort "issue changed" notifications to live dashboard
//! subscribers. Losing a push is acceptable; anything that must not be lost
//! goes through the durable job queue instead.
//!
//! Topics follow cache backend configuration:
//! - cache backend `memory` -> in-memory topics
//! - cache backend `redis` -> Redis Pub/Sub

mod backend;
mod error;
mod memory;
mod redis;

use std::marker::PhantomData;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use backend::{BroadcastSubscription, TopicBackend};
pub use error::TopicError;
use memory::MemoryTopicBackend;

use crate::core::config::{CacheBackendType, CacheConfig};

/// Central topic service - hands out typed broadcast topics
pub struct TopicService {
    backend: Arc<dyn TopicBackend>,
}

impl TopicService {
    /// Create a new topic service with in-memory backend
    pub fn new() -> Self {
        Self {
            backend: Arc::new(MemoryTopicBackend::new()),
        }
    }

    /// Create from cache configuration
    pub async fn from_cache_config(cache_config: &CacheConfig) -> Result<Self, TopicError> {
        let backend: Arc<dyn TopicBackend> = match cache_config.backend {
            CacheBackendType::Memory => Arc::new(MemoryTopicBackend::new()),
            CacheBackendType::Redis => {
                let url = cache_config.redis_url.as_ref().ok_or_else(|| {
                    TopicError::Config("redis_url required for Redis backend".into())
                })?;
                Arc::new(redis::RedisTopicBackend::new(url).await?)
            }
        };

        Ok(Self { backend })
    }

    /// Get the backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Create a broadcast topic handle for fire-and-forget delivery
    pub fn broadcast_topic<T>(&self, name: &str) -> BroadcastTopic<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        BroadcastTopic {
            name: name.to_string(),
            backend: Arc::clone(&self.backend),
            _phantom: PhantomData,
        }
    }

    /// Health check
    pub async fn health_check(&self) -> Result<(), TopicError> {
        self.backend.health_check().await
    }
}

impl Default for TopicService {
    fn default() -> Self {
        Self::new()
    }
}

/// Broadcast topic for fire-and-forget delivery
///
/// Messages are lost if no subscribers exist or a subscriber lags.
pub struct BroadcastTopic<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    name: String,
    backend: Arc<dyn TopicBackend>,
    _phantom: PhantomData<T>,
}

impl<T> BroadcastTopic<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Publish a message (fire-and-forget)
    pub async fn publish(&self, msg: &T) -> Result<(), TopicError> {
        let payload =
            rmp_serde::to_vec(msg).map_err(|e| TopicError::Serialization(e.to_string()))?;
        self.backend.publish(&self.name, &payload).await
    }

    /// Subscribe to broadcast messages
    pub async fn subscribe(&self) -> Result<BroadcastTopicSubscriber<T>, TopicError> {
        let subscription = self.backend.subscribe(&self.name).await?;
        Ok(BroadcastTopicSubscriber {
            subscription,
            _phantom: PhantomData,
        })
    }

    /// Get the topic name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Subscriber to a broadcast topic
pub struct BroadcastTopicSubscriber<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    subscription: BroadcastSubscription,
    _phantom: PhantomData<T>,
}

impl<T> BroadcastTopicSubscriber<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Receive the next message
    pub async fn recv(&mut self) -> Result<T, TopicError> {
        if let Some(result) = self.subscription.receiver.next().await {
            let payload = result?;
            let decoded: T = rmp_serde::from_slice(&payload)
                .map_err(|e| TopicError::Serialization(e.to_string()))?;
            Ok(decoded)
        } else {
            Err(TopicError::ChannelClosed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, serde::Deserialize)]
    struct TestMessage {
        data: String,
    }

    #[tokio::test]
    async fn test_typed_publish_subscribe() {
        let service = TopicService::new();
        let topic = service.broadcast_topic::<TestMessage>("test");
        let mut subscriber = topic.subscribe().await.unwrap();

        topic
            .publish(&TestMessage {
                data: "hello".to_string(),
            })
            .await
            .unwrap();

        let msg = tokio::time::timeout(
            tokio::time::Duration::from_millis(100),
            subscriber.recv(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(msg.data, "hello");
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let service = TopicService::new();
        let topic_a = service.broadcast_topic::<TestMessage>("a");
        let topic_b = service.broadcast_topic::<TestMessage>("b");
        let mut sub_b = topic_b.subscribe().await.unwrap();

        topic_a
            .publish(&TestMessage {
                data: "only-a".to_string(),
            })
            .await
            .unwrap();

        let result = tokio::time::timeout(
            tokio::time::Duration::from_millis(50),
            sub_b.recv(),
        )
        .await;
        assert!(result.is_err(), "topic b must not see topic a's message");
    }

    #[tokio::test]
    async fn test_backend_name() {
        let service = TopicService::new();
        assert_eq!(service.backend_name(), "memory");
    }
}
