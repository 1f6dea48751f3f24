//! Redis Pub/Sub topic backend
//!
//! Fans realtime events out across ingest processes: workers publish on any
//! node, dashboard SSE connections on any node receive. Publishing uses the
//! shared pool; each subscription holds its own dedicated pubsub connection
//! (the Redis protocol dedicates a connection to SUBSCRIBE mode).

use async_stream::stream;
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use futures::StreamExt;

use super::backend::{BroadcastSubscription, TopicBackend};
use super::error::TopicError;

/// Key prefix for pubsub channels (hash-tagged for cluster compatibility)
const PUBSUB_PREFIX: &str = "{errorwatch}:pubsub:";

/// Redis Pub/Sub topic backend
pub struct RedisTopicBackend {
    pool: Pool,
    redis_url: String,
}

impl RedisTopicBackend {
    pub async fn new(redis_url: &str) -> Result<Self, TopicError> {
        let config = Config::from_url(redis_url);
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| TopicError::Connection(format!("Failed to create Redis pool: {e}")))?;

        // Validate connection on startup
        let mut conn = pool.get().await?;
        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await?;

        Ok(Self {
            pool,
            redis_url: redis_url.to_string(),
        })
    }

    fn channel_name(topic: &str) -> String {
        format!("{}{}", PUBSUB_PREFIX, topic)
    }
}

#[async_trait]
impl TopicBackend for RedisTopicBackend {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TopicError> {
        let channel = Self::channel_name(topic);
        let mut conn = self.pool.get().await?;
        let _: i64 = deadpool_redis::redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BroadcastSubscription, TopicError> {
        let channel = Self::channel_name(topic);

        let client = deadpool_redis::redis::Client::open(self.redis_url.as_str())
            .map_err(|e| TopicError::Connection(e.to_string()))?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| TopicError::Connection(e.to_string()))?;
        pubsub
            .subscribe(&channel)
            .await
            .map_err(|e| TopicError::Connection(e.to_string()))?;

        let stream = stream! {
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                match msg.get_payload::<Vec<u8>>() {
                    Ok(payload) => yield Ok(payload),
                    Err(e) => yield Err(TopicError::Serialization(e.to_string())),
                }
            }
        };

        Ok(BroadcastSubscription {
            receiver: Box::pin(stream),
        })
    }

    async fn health_check(&self) -> Result<(), TopicError> {
        let mut conn = self.pool.get().await?;
        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name_is_prefixed() {
        assert_eq!(
            RedisTopicBackend::channel_name("events:org:o1"),
            "{errorwatch}:pubsub:events:org:o1"
        );
    }
}
