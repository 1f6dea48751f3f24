//! Durable job queue
//!
//! Each job class is its own queue with independent concurrency, retry count,
//! and exponential backoff. Queue state lives in the shared database (see
//! `data::sqlite::repositories::jobs`), so acceptance at admission means "the
//! queue accepted it", and workers on any process drain the same queues.
//!
//! Delivery is at-least-once: handlers must be idempotent. The occurrence
//! idempotency index and the rollup bucket upserts exist for exactly this
//! reason.

pub mod scheduler;
pub mod worker;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;
use crate::data::sqlite::repositories::jobs::{self, QueueCounts};

pub use worker::{JobHandler, JobOutcome, Worker};

/// Job class: one durable queue per class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueClass {
    /// Event persistence (fingerprint + group upsert + occurrence insert)
    Events,
    /// Alert rule evaluation and notification dispatch
    Alerts,
    /// Nightly rollups and retention cleanup
    Aggregation,
}

impl QueueClass {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Alerts => "alerts",
            Self::Aggregation => "aggregation",
        }
    }

    /// Retry attempts before a job is parked
    pub fn max_attempts(&self) -> i64 {
        match self {
            Self::Events => 3,
            Self::Alerts => 5,
            Self::Aggregation => 3,
        }
    }

    /// Base delay for exponential backoff (milliseconds)
    pub fn backoff_base_ms(&self) -> i64 {
        match self {
            Self::Events => 1_000,
            Self::Alerts => 5_000,
            Self::Aggregation => 10_000,
        }
    }

    pub fn all() -> &'static [QueueClass] {
        &[Self::Events, Self::Alerts, Self::Aggregation]
    }
}

// ============================================================================
// JOB PAYLOADS
// ============================================================================

/// Event persistence job payload (the admitted raw occurrence)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventJob {
    pub project_id: String,
    pub message: String,
    pub file: String,
    pub line: i64,
    pub column: Option<i64>,
    pub stack: String,
    pub env: String,
    pub url: Option<String>,
    pub level: String,
    pub status_code: Option<i64>,
    /// Breadcrumbs serialized as a JSON array string
    pub breadcrumbs: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub release: Option<String>,
    /// Occurrence time (epoch milliseconds, already normalized)
    pub created_at: i64,
}

/// Alert evaluation job payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertJob {
    pub project_id: String,
    pub fingerprint: String,
    pub is_new_group: bool,
    pub is_regression: bool,
    pub level: String,
    pub message: String,
}

/// Aggregation/maintenance job kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationKind {
    HourlyRollup,
    DailyRollup,
    CleanupExpired,
}

impl AggregationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HourlyRollup => "hourly-rollup",
            Self::DailyRollup => "daily-rollup",
            Self::CleanupExpired => "cleanup-expired",
        }
    }
}

/// Aggregation job payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationJob {
    pub kind: AggregationKind,
    /// Target day as epoch milliseconds of any instant within the day.
    /// Defaults to yesterday when absent.
    pub target_day_ms: Option<i64>,
}

// ============================================================================
// QUEUE SERVICE (enqueue side)
// ============================================================================

/// Enqueue API shared by the admission gate, workers, and the scheduler
#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
}

impl JobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Enqueue an event persistence job.
    ///
    /// `dedup_key` carries the admission-side duplicate suppression into the
    /// queue: the same occurrence admitted twice within a dedup window becomes
    /// one job. Returns false when deduplicated.
    pub async fn enqueue_event(
        &self,
        job: &EventJob,
        dedup_key: Option<&str>,
    ) -> Result<bool, SqliteError> {
        let payload = encode_payload(job)?;
        let id = jobs::enqueue(
            &self.pool,
            QueueClass::Events.name(),
            "process-event",
            &payload,
            QueueClass::Events.max_attempts(),
            chrono::Utc::now().timestamp_millis(),
            dedup_key,
        )
        .await?;
        Ok(id.is_some())
    }

    /// Enqueue an alert evaluation job (fired after event persistence)
    pub async fn enqueue_alert(&self, job: &AlertJob) -> Result<(), SqliteError> {
        let payload = encode_payload(job)?;
        jobs::enqueue(
            &self.pool,
            QueueClass::Alerts.name(),
            "check-alerts",
            &payload,
            QueueClass::Alerts.max_attempts(),
            chrono::Utc::now().timestamp_millis(),
            None,
        )
        .await?;
        Ok(())
    }

    /// Enqueue an aggregation job.
    ///
    /// Scheduled enqueues pass a dedup key (kind + day) so a restarted
    /// scheduler cannot double-enqueue the same day's run.
    pub async fn enqueue_aggregation(
        &self,
        job: &AggregationJob,
        dedup_key: Option<&str>,
    ) -> Result<bool, SqliteError> {
        let payload = encode_payload(job)?;
        let id = jobs::enqueue(
            &self.pool,
            QueueClass::Aggregation.name(),
            job.kind.as_str(),
            &payload,
            QueueClass::Aggregation.max_attempts(),
            chrono::Utc::now().timestamp_millis(),
            dedup_key,
        )
        .await?;
        Ok(id.is_some())
    }

    /// Per-status counts for every queue class (admin surface)
    pub async fn counts(&self) -> Result<Vec<(&'static str, QueueCounts)>, SqliteError> {
        let mut result = Vec::new();
        for class in QueueClass::all() {
            result.push((class.name(), jobs::counts(&self.pool, class.name()).await?));
        }
        Ok(result)
    }
}

fn encode_payload<T: Serialize>(payload: &T) -> Result<String, SqliteError> {
    serde_json::to_string(payload)
        .map_err(|e| SqliteError::Conflict(format!("unserializable job payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::test_pool;

    fn sample_event_job() -> EventJob {
        EventJob {
            project_id: "default".to_string(),
            message: "TypeError: x is undefined".to_string(),
            file: "app.js".to_string(),
            line: 42,
            column: Some(7),
            stack: "at main (app.js:42:7)".to_string(),
            env: "production".to_string(),
            url: None,
            level: "error".to_string(),
            status_code: None,
            breadcrumbs: None,
            session_id: None,
            user_id: None,
            release: None,
            created_at: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_enqueue_event_with_dedup() {
        let pool = test_pool().await;
        let queue = JobQueue::new(pool);
        let job = sample_event_job();

        assert!(queue.enqueue_event(&job, Some("evt-1")).await.unwrap());
        assert!(!queue.enqueue_event(&job, Some("evt-1")).await.unwrap());
        assert!(queue.enqueue_event(&job, Some("evt-2")).await.unwrap());

        let counts = queue.counts().await.unwrap();
        let events = counts.iter().find(|(name, _)| *name == "events").unwrap();
        assert_eq!(events.1.pending, 2);
    }

    #[tokio::test]
    async fn test_queue_classes_are_independent() {
        let pool = test_pool().await;
        let queue = JobQueue::new(pool);

        queue.enqueue_event(&sample_event_job(), None).await.unwrap();
        queue
            .enqueue_alert(&AlertJob {
                project_id: "default".to_string(),
                fingerprint: "fp1".to_string(),
                is_new_group: true,
                is_regression: false,
                level: "error".to_string(),
                message: "boom".to_string(),
            })
            .await
            .unwrap();

        let counts = queue.counts().await.unwrap();
        for (name, count) in counts {
            match name {
                "events" | "alerts" => assert_eq!(count.pending, 1, "queue {}", name),
                "aggregation" => assert_eq!(count.pending, 0),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn test_aggregation_kind_names() {
        assert_eq!(AggregationKind::HourlyRollup.as_str(), "hourly-rollup");
        assert_eq!(AggregationKind::DailyRollup.as_str(), "daily-rollup");
        assert_eq!(AggregationKind::CleanupExpired.as_str(), "cleanup-expired");
    }
}
