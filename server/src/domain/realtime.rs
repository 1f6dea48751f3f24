//! Realtime issue notifications
//!
//! Best-effort fan-out of issue changes to live dashboard subscribers over
//! org-scoped broadcast topics. Publish failures are logged and never
//! propagated: losing a live-update push is acceptable, losing an issue
//! record is not.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::constants::TOPIC_ISSUE_EVENTS_PREFIX;
use crate::data::topics::{BroadcastTopic, BroadcastTopicSubscriber, TopicService};

/// Kind of issue change carried on the realtime channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueEventKind {
    #[serde(rename = "issue:new")]
    New,
    #[serde(rename = "issue:updated")]
    Updated,
    #[serde(rename = "issue:regressed")]
    Regressed,
    #[serde(rename = "alert:triggered")]
    AlertTriggered,
}

/// One realtime issue event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueEvent {
    #[serde(rename = "type")]
    pub kind: IssueEventKind,
    pub project_id: String,
    pub fingerprint: String,
    pub message: String,
    pub level: String,
    pub timestamp: i64,
}

/// Publisher handle over the org-scoped topics
#[derive(Clone)]
pub struct RealtimePublisher {
    topics: Arc<TopicService>,
}

impl RealtimePublisher {
    pub fn new(topics: Arc<TopicService>) -> Self {
        Self { topics }
    }

    fn topic(&self, organization_id: &str) -> BroadcastTopic<IssueEvent> {
        self.topics
            .broadcast_topic(&format!("{}{}", TOPIC_ISSUE_EVENTS_PREFIX, organization_id))
    }

    /// Publish an issue event (fire-and-forget, never blocks the caller's
    /// error path)
    pub async fn publish(&self, organization_id: &str, event: IssueEvent) {
        if let Err(e) = self.topic(organization_id).publish(&event).await {
            tracing::warn!(
                organization_id,
                kind = ?event.kind,
                error = %e,
                "Realtime publish failed"
            );
        }
    }

    /// Subscribe to an organization's issue events (SSE endpoint)
    pub async fn subscribe(
        &self,
        organization_id: &str,
    ) -> Result<BroadcastTopicSubscriber<IssueEvent>, crate::data::topics::TopicError> {
        self.topic(organization_id).subscribe().await
    }
}
