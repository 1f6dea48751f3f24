//! Topic backend trait definition
//!
//! Broadcast (Pub/Sub) semantics only: fire-and-forget, all subscribers
//! receive. Durable work goes through the job queue, not topics.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::error::TopicError;

/// Subscription to a broadcast topic (Pub/Sub semantics)
pub struct BroadcastSubscription {
    /// Stream of received messages
    pub receiver: Pin<Box<dyn Stream<Item = Result<Vec<u8>, TopicError>> + Send>>,
}

/// Topic backend trait
///
/// Both in-memory and Redis backends implement this trait. Delivery is
/// best-effort: if no subscribers exist, messages are dropped, and lagging
/// subscribers may miss messages (bounded buffer overflow).
#[async_trait]
pub trait TopicBackend: Send + Sync {
    /// Publish message to broadcast topic (fire-and-forget)
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TopicError>;

    /// Subscribe to broadcast topic
    async fn subscribe(&self, topic: &str) -> Result<BroadcastSubscription, TopicError>;

    /// Health check (validates connection)
    async fn health_check(&self) -> Result<(), TopicError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}
