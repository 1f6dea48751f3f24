//! Alert engine
//!
//! Evaluates every enabled rule of the occurrence's project in isolation:
//! one rule's failure (bad config, channel outage) never prevents the others
//! from running, and every dispatch attempt lands in the notifications table.
//!
//! Rule conditions are pure functions over gathered inputs, so each variant
//! is testable without a database:
//! - new_error: the occurrence created its group
//! - threshold: project event volume in the trailing window reached the
//!   configured count, and the rule has not notified within that window
//! - regression: the group flipped resolved -> open

pub mod channels;

use std::sync::Arc;

use async_trait::async_trait;

pub use channels::{AlertContext, AlertDispatcher, DispatchError, HttpDispatcher};

use crate::core::config::AlertConfig;
use crate::data::sqlite::repositories::jobs::JobRow;
use crate::data::sqlite::repositories::{events, groups, notifications, projects, rules};
use crate::data::sqlite::{SqliteError, SqliteService};
use crate::data::types::{
    AlertRuleRow, AlertRuleType, IssueRow, NotificationRecord, NotificationStatus,
};
use crate::queue::{AlertJob, JobHandler, JobOutcome, QueueClass};

// ============================================================================
// PURE RULE CONDITIONS
// ============================================================================

/// new_error fires iff this occurrence created a new group
pub fn fires_new_error(is_new_group: bool) -> bool {
    is_new_group
}

/// regression fires iff the upsert reported a resolved->open transition
pub fn fires_regression(is_regression: bool) -> bool {
    is_regression
}

/// threshold fires iff the window volume reached the configured count and the
/// rule has not already notified inside the window (cool-down)
pub fn fires_threshold(events_in_window: i64, threshold: i64, notified_in_window: bool) -> bool {
    events_in_window >= threshold && !notified_in_window
}

// ============================================================================
// ENGINE
// ============================================================================

/// Handler for the alerts queue
pub struct AlertEngine {
    database: Arc<SqliteService>,
    dispatcher: Arc<dyn AlertDispatcher>,
    config: AlertConfig,
}

impl AlertEngine {
    pub fn new(
        database: Arc<SqliteService>,
        dispatcher: Arc<dyn AlertDispatcher>,
        config: AlertConfig,
    ) -> Self {
        Self {
            database,
            dispatcher,
            config,
        }
    }

    /// Evaluate all enabled rules for one processed occurrence
    pub async fn evaluate(&self, job: &AlertJob) -> Result<(), SqliteError> {
        let pool = self.database.pool();

        let project_rules = rules::alert_rules_for_project(pool, &job.project_id).await?;
        if project_rules.is_empty() {
            return Ok(());
        }

        let Some(issue) = groups::get_by_fingerprint(pool, &job.fingerprint).await? else {
            tracing::debug!(fingerprint = %job.fingerprint, "Issue vanished before alert evaluation");
            return Ok(());
        };

        let project_name = projects::get_project(pool, None, &job.project_id)
            .await?
            .map(|p| p.name)
            .unwrap_or_else(|| "Unknown Project".to_string());

        for rule in project_rules {
            // Isolated per rule: log and continue on failure
            if let Err(e) = self.evaluate_rule(&rule, job, &issue, &project_name).await {
                tracing::error!(rule_id = %rule.id, error = %e, "Failed to process alert rule");
                let record = NotificationRecord {
                    rule_id: rule.id.clone(),
                    project_id: job.project_id.clone(),
                    fingerprint: job.fingerprint.clone(),
                    channel: rule.channel,
                    status: NotificationStatus::Failed,
                    error: Some(e.to_string()),
                };
                if let Err(e) = notifications::insert_notification(pool, &record).await {
                    tracing::error!(rule_id = %rule.id, error = %e, "Failed to record notification failure");
                }
            }
        }

        Ok(())
    }

    async fn evaluate_rule(
        &self,
        rule: &AlertRuleRow,
        job: &AlertJob,
        issue: &IssueRow,
        project_name: &str,
    ) -> Result<(), SqliteError> {
        let pool = self.database.pool();

        // Threshold rules claim their cool-down slot atomically so concurrent
        // workers can never double-notify; the other variants notify on their
        // (already exactly-once) trigger signal.
        let claimed_slot = match rule.rule_type {
            AlertRuleType::NewError => {
                if !fires_new_error(job.is_new_group) {
                    return Ok(());
                }
                None
            }
            AlertRuleType::Regression => {
                if !fires_regression(job.is_regression) {
                    return Ok(());
                }
                None
            }
            AlertRuleType::Threshold => {
                let (Some(threshold), Some(window_minutes)) = (rule.threshold, rule.window_minutes)
                else {
                    tracing::warn!(rule_id = %rule.id, "Threshold rule missing threshold/window");
                    return Ok(());
                };

                let window_start =
                    chrono::Utc::now().timestamp_millis() - window_minutes * 60 * 1000;
                let events_in_window =
                    events::count_project_events_since(pool, &job.project_id, window_start).await?;
                let notified = notifications::notified_since(pool, &rule.id, window_start).await?;

                if !fires_threshold(events_in_window, threshold, notified) {
                    return Ok(());
                }

                match notifications::claim_notification_slot(
                    pool,
                    &rule.id,
                    &job.project_id,
                    &job.fingerprint,
                    rule.channel.as_str(),
                    window_start,
                )
                .await?
                {
                    Some(id) => Some(id),
                    // A concurrent worker claimed the window first
                    None => return Ok(()),
                }
            }
        };

        let environment = events::latest_env_for_fingerprint(pool, &job.fingerprint).await?;
        let ctx = AlertContext {
            rule_type: rule.rule_type,
            project_name: project_name.to_string(),
            message: issue.message.clone(),
            file: issue.file.clone(),
            line: issue.line,
            count: issue.count,
            fingerprint: job.fingerprint.clone(),
            environment,
            threshold: rule.threshold,
            window_minutes: rule.window_minutes,
            resolved_at: issue.resolved_at,
            dashboard_url: self.config.dashboard_url.clone(),
        };

        let dispatch_result = self.dispatcher.dispatch(rule.channel, &rule.config, &ctx).await;

        let (status, error) = match &dispatch_result {
            Ok(()) => (NotificationStatus::Sent, None),
            Err(e) => {
                tracing::warn!(rule_id = %rule.id, channel = rule.channel.as_str(), error = %e, "Notification dispatch failed");
                (NotificationStatus::Failed, Some(e.to_string()))
            }
        };

        match claimed_slot {
            Some(notification_id) => {
                notifications::finalize_notification(
                    pool,
                    &notification_id,
                    status,
                    error.as_deref(),
                )
                .await?;
            }
            None => {
                notifications::insert_notification(
                    pool,
                    &NotificationRecord {
                        rule_id: rule.id.clone(),
                        project_id: job.project_id.clone(),
                        fingerprint: job.fingerprint.clone(),
                        channel: rule.channel,
                        status,
                        error,
                    },
                )
                .await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl JobHandler for AlertEngine {
    fn queue(&self) -> QueueClass {
        QueueClass::Alerts
    }

    async fn execute(&self, job: &JobRow) -> JobOutcome {
        let payload: AlertJob = match serde_json::from_str(&job.payload) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Undecodable alert job payload");
                return JobOutcome::Retry(format!("undecodable payload: {}", e));
            }
        };

        match self.evaluate(&payload).await {
            Ok(()) => JobOutcome::Done,
            Err(e) => JobOutcome::Retry(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::repositories::groups::{GroupUpsert, upsert_group};
    use crate::data::sqlite::test_service;
    use crate::data::types::{AlertChannel, AlertRuleConfig, OccurrenceRecord};
    use parking_lot::Mutex;

    // ------------------------------------------------------------------
    // Pure condition tests
    // ------------------------------------------------------------------

    #[test]
    fn test_fires_new_error() {
        assert!(fires_new_error(true));
        assert!(!fires_new_error(false));
    }

    #[test]
    fn test_fires_regression() {
        assert!(fires_regression(true));
        assert!(!fires_regression(false));
    }

    #[test]
    fn test_fires_threshold() {
        assert!(fires_threshold(10, 10, false));
        assert!(fires_threshold(11, 10, false));
        assert!(!fires_threshold(9, 10, false));
        // Cool-down suppresses even above the threshold
        assert!(!fires_threshold(100, 10, true));
    }

    // ------------------------------------------------------------------
    // Engine tests with a recording dispatcher
    // ------------------------------------------------------------------

    struct RecordingDispatcher {
        sent: Mutex<Vec<(AlertChannel, AlertRuleType)>>,
        fail: bool,
    }

    impl RecordingDispatcher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl AlertDispatcher for RecordingDispatcher {
        async fn dispatch(
            &self,
            channel: AlertChannel,
            _config: &AlertRuleConfig,
            ctx: &AlertContext,
        ) -> Result<(), DispatchError> {
            self.sent.lock().push((channel, ctx.rule_type));
            if self.fail {
                Err(DispatchError::Status(500))
            } else {
                Ok(())
            }
        }
    }

    fn alert_config() -> AlertConfig {
        AlertConfig {
            email_api_url: None,
            email_api_key: None,
            dashboard_url: "http://localhost:3001".to_string(),
        }
    }

    async fn seed_issue(database: &SqliteService, fingerprint: &str) {
        upsert_group(
            database.pool(),
            &GroupUpsert {
                fingerprint,
                project_id: "default",
                message: "TypeError: x is undefined",
                file: "app.js",
                line: 42,
                url: None,
                status_code: None,
                level: "error",
                occurred_at: 1000,
                now: 1000,
            },
        )
        .await
        .unwrap();
    }

    async fn seed_occurrences(database: &SqliteService, fingerprint: &str, n: usize) {
        let now = chrono::Utc::now().timestamp_millis();
        for i in 0..n {
            events::insert_occurrence(
                database.pool(),
                &OccurrenceRecord {
                    fingerprint: fingerprint.to_string(),
                    project_id: "default".to_string(),
                    stack: "at a (app.js:42:1)".to_string(),
                    url: None,
                    env: "production".to_string(),
                    status_code: None,
                    level: "error".to_string(),
                    breadcrumbs: None,
                    session_id: None,
                    user_id: None,
                    release: None,
                    created_at: now + i as i64,
                },
            )
            .await
            .unwrap();
        }
    }

    fn alert_job(is_new_group: bool, is_regression: bool) -> AlertJob {
        AlertJob {
            project_id: "default".to_string(),
            fingerprint: "fp1".to_string(),
            is_new_group,
            is_regression,
            level: "error".to_string(),
            message: "TypeError: x is undefined".to_string(),
        }
    }

    #[tokio::test]
    async fn test_new_error_rule_fires_once() {
        let database = Arc::new(test_service().await);
        seed_issue(&database, "fp1").await;
        rules::insert_alert_rule(
            database.pool(),
            "default",
            "New errors",
            AlertRuleType::NewError,
            None,
            None,
            AlertChannel::Webhook,
            &AlertRuleConfig {
                webhook_url: Some("https://hooks.example.com/x".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let dispatcher = RecordingDispatcher::new(false);
        let engine = AlertEngine::new(
            Arc::clone(&database),
            dispatcher.clone(),
            alert_config(),
        );

        // New group fires, repeat occurrence does not
        engine.evaluate(&alert_job(true, false)).await.unwrap();
        engine.evaluate(&alert_job(false, false)).await.unwrap();

        assert_eq!(dispatcher.sent.lock().len(), 1);

        // Every attempt is recorded
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
            .fetch_one(database.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_regression_rule_fires_on_flag() {
        let database = Arc::new(test_service().await);
        seed_issue(&database, "fp1").await;
        rules::insert_alert_rule(
            database.pool(),
            "default",
            "Regressions",
            AlertRuleType::Regression,
            None,
            None,
            AlertChannel::Chat,
            &AlertRuleConfig {
                chat_webhook: Some("https://chat.example.com/hook".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let dispatcher = RecordingDispatcher::new(false);
        let engine = AlertEngine::new(
            Arc::clone(&database),
            dispatcher.clone(),
            alert_config(),
        );

        engine.evaluate(&alert_job(false, false)).await.unwrap();
        assert!(dispatcher.sent.lock().is_empty());

        engine.evaluate(&alert_job(false, true)).await.unwrap();
        assert_eq!(
            dispatcher.sent.lock().as_slice(),
            &[(AlertChannel::Chat, AlertRuleType::Regression)]
        );
    }

    #[tokio::test]
    async fn test_threshold_rule_with_cooldown() {
        let database = Arc::new(test_service().await);
        seed_issue(&database, "fp1").await;
        seed_occurrences(&database, "fp1", 5).await;
        rules::insert_alert_rule(
            database.pool(),
            "default",
            "Volume",
            AlertRuleType::Threshold,
            Some(5),
            Some(10),
            AlertChannel::Webhook,
            &AlertRuleConfig {
                webhook_url: Some("https://hooks.example.com/x".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let dispatcher = RecordingDispatcher::new(false);
        let engine = AlertEngine::new(
            Arc::clone(&database),
            dispatcher.clone(),
            alert_config(),
        );

        // Threshold reached: fires exactly once, cool-down suppresses repeats
        engine.evaluate(&alert_job(false, false)).await.unwrap();
        engine.evaluate(&alert_job(false, false)).await.unwrap();
        engine.evaluate(&alert_job(false, false)).await.unwrap();

        assert_eq!(dispatcher.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_threshold_below_count_does_not_fire() {
        let database = Arc::new(test_service().await);
        seed_issue(&database, "fp1").await;
        seed_occurrences(&database, "fp1", 2).await;
        rules::insert_alert_rule(
            database.pool(),
            "default",
            "Volume",
            AlertRuleType::Threshold,
            Some(5),
            Some(10),
            AlertChannel::Webhook,
            &AlertRuleConfig {
                webhook_url: Some("https://hooks.example.com/x".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let dispatcher = RecordingDispatcher::new(false);
        let engine = AlertEngine::new(
            Arc::clone(&database),
            dispatcher.clone(),
            alert_config(),
        );

        engine.evaluate(&alert_job(false, false)).await.unwrap();
        assert!(dispatcher.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_dispatch_recorded_and_isolated() {
        let database = Arc::new(test_service().await);
        seed_issue(&database, "fp1").await;
        // Two rules: both evaluated even though dispatch fails
        for name in ["A", "B"] {
            rules::insert_alert_rule(
                database.pool(),
                "default",
                name,
                AlertRuleType::NewError,
                None,
                None,
                AlertChannel::Webhook,
                &AlertRuleConfig {
                    webhook_url: Some("https://hooks.example.com/x".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let dispatcher = RecordingDispatcher::new(true);
        let engine = AlertEngine::new(
            Arc::clone(&database),
            dispatcher.clone(),
            alert_config(),
        );

        engine.evaluate(&alert_job(true, false)).await.unwrap();

        assert_eq!(dispatcher.sent.lock().len(), 2);

        let failed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE status = 'failed'")
                .fetch_one(database.pool())
                .await
                .unwrap();
        assert_eq!(failed, 2);
    }

    #[tokio::test]
    async fn test_no_rules_is_a_noop() {
        let database = Arc::new(test_service().await);
        seed_issue(&database, "fp1").await;

        let dispatcher = RecordingDispatcher::new(false);
        let engine = AlertEngine::new(
            Arc::clone(&database),
            dispatcher.clone(),
            alert_config(),
        );
        engine.evaluate(&alert_job(true, false)).await.unwrap();
        assert!(dispatcher.sent.lock().is_empty());
    }
}
