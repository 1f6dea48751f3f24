//! Retention and maintenance
//!
//! Deletes expired raw data (occurrences, performance samples), then derived
//! data past its longer window (hourly rollups, notifications), always
//! dependents before parents. The maintenance passes repair derived state:
//! issue counts recomputed from occurrences, expired snoozes reopened,
//! orphaned groups removed.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::core::config::RetentionConfig;
use crate::core::constants::DEFAULT_AGGREGATE_RETENTION_DAYS;
use crate::data::sqlite::repositories::{events, groups, notifications, performance};
use crate::data::sqlite::{SqliteError, SqliteService};
use crate::utils::time::days_ago_ms;

/// Outcome of one full retention sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionStats {
    pub events_deleted: u64,
    pub groups_deleted: u64,
    pub notifications_deleted: u64,
    pub raw_metrics_deleted: u64,
    pub raw_transactions_deleted: u64,
    pub hourly_metric_rollups_deleted: u64,
    pub hourly_transaction_rollups_deleted: u64,
}

/// Run the full retention sweep
pub async fn run_cleanup(
    database: &SqliteService,
    config: &RetentionConfig,
) -> Result<RetentionStats, SqliteError> {
    let pool = database.pool();

    tracing::info!(
        event_retention_days = config.event_retention_days,
        perf_retention_days = config.perf_retention_days,
        notification_retention_days = config.notification_retention_days,
        "Starting retention cleanup"
    );

    // Occurrences first, then the groups they orphaned
    let events_deleted =
        events::delete_older_than(pool, days_ago_ms(config.event_retention_days)).await?;
    let groups_deleted = groups::delete_orphaned(pool).await?;

    let notifications_deleted =
        notifications::delete_older_than(pool, days_ago_ms(config.notification_retention_days))
            .await?;

    let (raw_metrics_deleted, raw_transactions_deleted) =
        performance::delete_raw_older_than(pool, days_ago_ms(config.perf_retention_days)).await?;

    // Hourly rollups live much longer than the raw data they summarize
    let (hourly_metric_rollups_deleted, hourly_transaction_rollups_deleted) =
        performance::delete_hourly_rollups_older_than(
            pool,
            days_ago_ms(DEFAULT_AGGREGATE_RETENTION_DAYS),
        )
        .await?;

    let stats = RetentionStats {
        events_deleted,
        groups_deleted,
        notifications_deleted,
        raw_metrics_deleted,
        raw_transactions_deleted,
        hourly_metric_rollups_deleted,
        hourly_transaction_rollups_deleted,
    };

    tracing::info!(
        events = stats.events_deleted,
        groups = stats.groups_deleted,
        notifications = stats.notifications_deleted,
        raw_metrics = stats.raw_metrics_deleted,
        raw_transactions = stats.raw_transactions_deleted,
        "Retention cleanup completed"
    );

    Ok(stats)
}

/// Maintenance pass: recompute issue counts and reopen expired snoozes
pub async fn run_maintenance(pool: &SqlitePool) -> Result<(u64, u64), SqliteError> {
    let recounted = groups::recount_from_events(pool).await?;
    let reopened =
        groups::reopen_expired_snoozes(pool, chrono::Utc::now().timestamp_millis()).await?;

    tracing::info!(recounted, reopened, "Group maintenance completed");
    Ok((recounted, reopened))
}

/// Read-only retention preview (admin surface)
#[derive(Debug, Clone, Serialize)]
pub struct RetentionPreview {
    pub events_to_delete: i64,
    pub oldest_event: Option<i64>,
    pub newest_event: Option<i64>,
}

pub async fn retention_preview(
    pool: &SqlitePool,
    config: &RetentionConfig,
) -> Result<RetentionPreview, SqliteError> {
    let cutoff = days_ago_ms(config.event_retention_days);
    let events_to_delete = events::count_older_than(pool, cutoff).await?;
    let (oldest_event, newest_event) = events::event_time_bounds(pool).await?;

    Ok(RetentionPreview {
        events_to_delete,
        oldest_event,
        newest_event,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::repositories::groups::{GroupUpsert, upsert_group};
    use crate::data::sqlite::test_service;
    use crate::data::types::OccurrenceRecord;

    fn config() -> RetentionConfig {
        RetentionConfig {
            event_retention_days: 30,
            perf_retention_days: 30,
            notification_retention_days: 90,
        }
    }

    async fn seed(database: &SqliteService, fingerprint: &str, created_at: i64) {
        upsert_group(
            database.pool(),
            &GroupUpsert {
                fingerprint,
                project_id: "default",
                message: "Error: boom",
                file: "a.js",
                line: 1,
                url: None,
                status_code: None,
                level: "error",
                occurred_at: created_at,
                now: created_at,
            },
        )
        .await
        .unwrap();

        events::insert_occurrence(
            database.pool(),
            &OccurrenceRecord {
                fingerprint: fingerprint.to_string(),
                project_id: "default".to_string(),
                stack: "at a (a.js:1:1)".to_string(),
                url: None,
                env: "production".to_string(),
                status_code: None,
                level: "error".to_string(),
                breadcrumbs: None,
                session_id: None,
                user_id: None,
                release: None,
                created_at,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_deletes_expired_events_and_orphans() {
        let database = test_service().await;
        // One expired occurrence, one recent
        seed(&database, "fp_old", days_ago_ms(60)).await;
        seed(&database, "fp_new", days_ago_ms(1)).await;

        let stats = run_cleanup(&database, &config()).await.unwrap();
        assert_eq!(stats.events_deleted, 1);
        assert_eq!(stats.groups_deleted, 1);

        // The recent issue survived
        assert!(
            groups::get_by_fingerprint(database.pool(), "fp_new")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            groups::get_by_fingerprint(database.pool(), "fp_old")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_maintenance_repairs_counts() {
        let database = test_service().await;
        seed(&database, "fp1", days_ago_ms(1)).await;

        // Simulate drift: counter says 10, occurrences say 1
        sqlx::query("UPDATE error_groups SET count = 10 WHERE fingerprint = 'fp1'")
            .execute(database.pool())
            .await
            .unwrap();

        run_maintenance(database.pool()).await.unwrap();

        let issue = groups::get_by_fingerprint(database.pool(), "fp1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(issue.count, 1);
    }

    #[tokio::test]
    async fn test_retention_preview_counts_without_deleting() {
        let database = test_service().await;
        seed(&database, "fp_old", days_ago_ms(60)).await;

        let preview = retention_preview(database.pool(), &config()).await.unwrap();
        assert_eq!(preview.events_to_delete, 1);
        assert!(preview.oldest_event.is_some());

        // Nothing deleted
        assert!(
            groups::get_by_fingerprint(database.pool(), "fp_old")
                .await
                .unwrap()
                .is_some()
        );
    }
}
