//! Event persistence pipeline
//!
//! Consumes the events queue: scrubs PII, resolves the effective fingerprint
//! (tenant rules first), atomically upserts the issue, inserts the immutable
//! occurrence, then fans out: alert evaluation job, stats cache
//! invalidation, and the best-effort realtime publish.
//!
//! Re-delivered jobs are harmless: the group upsert is atomic and the
//! occurrence insert treats its idempotency-index violation as "already
//! processed", which also skips the downstream fan-out.

use std::sync::Arc;

use async_trait::async_trait;

use super::fingerprint::{self, FingerprintInput};
use super::realtime::{IssueEvent, IssueEventKind, RealtimePublisher};
use super::scrub::scrub_pii;
use crate::data::cache::{CacheKey, CacheService};
use crate::data::sqlite::repositories::jobs::JobRow;
use crate::data::sqlite::repositories::{groups, projects, rules};
use crate::data::sqlite::{SqliteError, SqliteService};
use crate::data::types::{OccurrenceRecord, UpsertOutcome};
use crate::queue::{AlertJob, EventJob, JobHandler, JobOutcome, JobQueue, QueueClass};

/// Result of processing one event job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub outcome: UpsertOutcome,
    /// False when the occurrence was a re-delivered duplicate
    pub persisted: bool,
}

/// Handler for the events queue
pub struct EventProcessor {
    database: Arc<SqliteService>,
    cache: Arc<CacheService>,
    queue: JobQueue,
    realtime: RealtimePublisher,
}

impl EventProcessor {
    pub fn new(
        database: Arc<SqliteService>,
        cache: Arc<CacheService>,
        queue: JobQueue,
        realtime: RealtimePublisher,
    ) -> Self {
        Self {
            database,
            cache,
            queue,
            realtime,
        }
    }

    /// Process one admitted occurrence end to end
    pub async fn process(&self, job: &EventJob) -> Result<ProcessedEvent, SqliteError> {
        let pool = self.database.pool();

        let scrubbed_message = scrub_pii(&job.message);
        let scrubbed_stack = scrub_pii(&job.stack);

        // Tenant rules first (cached per project), default algorithm otherwise
        let project_rules =
            rules::fingerprint_rules_for_project(pool, Some(&self.cache), &job.project_id).await?;
        let fingerprint = fingerprint::fingerprint(
            &FingerprintInput {
                project_id: &job.project_id,
                message: &job.message,
                file: &job.file,
                line: job.line,
                column: job.column,
                stack: &job.stack,
            },
            &project_rules,
        );

        let now = chrono::Utc::now().timestamp_millis();
        let result = groups::record_occurrence(
            pool,
            &groups::GroupUpsert {
                fingerprint: &fingerprint,
                project_id: &job.project_id,
                message: &scrubbed_message,
                file: &job.file,
                line: job.line,
                url: job.url.as_deref(),
                status_code: job.status_code,
                level: &job.level,
                occurred_at: job.created_at,
                now,
            },
            &OccurrenceRecord {
                fingerprint: fingerprint.clone(),
                project_id: job.project_id.clone(),
                stack: scrubbed_stack,
                url: job.url.clone(),
                env: job.env.clone(),
                status_code: job.status_code,
                level: job.level.clone(),
                breadcrumbs: job.breadcrumbs.clone(),
                session_id: job.session_id.clone(),
                user_id: job.user_id.clone(),
                release: job.release.clone(),
                created_at: job.created_at,
            },
        )
        .await?;

        let outcome = match result {
            groups::RecordResult::Recorded(outcome) => outcome,
            groups::RecordResult::Duplicate => {
                // Duplicate delivery: the first delivery already ran the fan-out
                return Ok(ProcessedEvent {
                    outcome: UpsertOutcome {
                        new_group: false,
                        regression: false,
                    },
                    persisted: false,
                });
            }
        };

        if job.user_id.is_some() {
            groups::update_users_affected(pool, &fingerprint).await?;
        }

        self.queue
            .enqueue_alert(&AlertJob {
                project_id: job.project_id.clone(),
                fingerprint: fingerprint.clone(),
                is_new_group: outcome.new_group,
                is_regression: outcome.regression,
                level: job.level.clone(),
                message: scrubbed_message.clone(),
            })
            .await?;

        self.invalidate_project_views(&job.project_id).await;
        self.publish_realtime(job, &fingerprint, &scrubbed_message, outcome)
            .await;

        tracing::debug!(
            fingerprint = %fingerprint,
            project_id = %job.project_id,
            new_group = outcome.new_group,
            regression = outcome.regression,
            "Processed event"
        );

        Ok(ProcessedEvent {
            outcome,
            persisted: true,
        })
    }

    /// Drop cached stats and list views scoped to the project
    async fn invalidate_project_views(&self, project_id: &str) {
        self.cache.invalidate_key(&CacheKey::stats(project_id)).await;
        if let Err(e) = self
            .cache
            .invalidate(&CacheKey::stats_pattern(project_id))
            .await
        {
            tracing::warn!(project_id, error = %e, "Stats cache invalidation failed");
        }
        if let Err(e) = self
            .cache
            .invalidate(&CacheKey::issue_list_pattern(project_id))
            .await
        {
            tracing::warn!(project_id, error = %e, "Issue list cache invalidation failed");
        }
    }

    /// Best-effort realtime publish; never fails the job
    async fn publish_realtime(
        &self,
        job: &EventJob,
        fingerprint: &str,
        message: &str,
        outcome: UpsertOutcome,
    ) {
        let org_id = match projects::get_project(
            self.database.pool(),
            Some(&self.cache),
            &job.project_id,
        )
        .await
        {
            Ok(Some(project)) => project.organization_id,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(project_id = %job.project_id, error = %e, "Project lookup for realtime publish failed");
                return;
            }
        };

        let kind = if outcome.regression {
            IssueEventKind::Regressed
        } else if outcome.new_group {
            IssueEventKind::New
        } else {
            IssueEventKind::Updated
        };

        self.realtime
            .publish(
                &org_id,
                IssueEvent {
                    kind,
                    project_id: job.project_id.clone(),
                    fingerprint: fingerprint.to_string(),
                    message: message.to_string(),
                    level: job.level.clone(),
                    timestamp: chrono::Utc::now().timestamp_millis(),
                },
            )
            .await;
    }
}

#[async_trait]
impl JobHandler for EventProcessor {
    fn queue(&self) -> QueueClass {
        QueueClass::Events
    }

    async fn execute(&self, job: &JobRow) -> JobOutcome {
        let payload: EventJob = match serde_json::from_str(&job.payload) {
            Ok(p) => p,
            Err(e) => {
                // Malformed payloads cannot succeed on retry
                tracing::error!(job_id = %job.id, error = %e, "Undecodable event job payload");
                return JobOutcome::Retry(format!("undecodable payload: {}", e));
            }
        };

        match self.process(&payload).await {
            Ok(_) => JobOutcome::Done,
            Err(e) => JobOutcome::Retry(e.to_string()),
        }
    }
}
