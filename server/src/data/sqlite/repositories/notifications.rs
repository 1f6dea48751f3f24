//! Notification repository
//!
//! Append-only audit of every dispatch attempt. Doubles as the cool-down
//! signal for threshold alerts: a rule that notified inside its window is
//! suppressed until the window passes.

use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;
use crate::data::types::{NotificationRecord, NotificationStatus};

/// Record a dispatch attempt (success or failure)
pub async fn insert_notification(
    pool: &SqlitePool,
    record: &NotificationRecord,
) -> Result<(), SqliteError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();
    let sent_at = match record.status {
        NotificationStatus::Sent => Some(now),
        NotificationStatus::Failed => None,
    };

    sqlx::query(
        r#"INSERT INTO notifications (id, rule_id, project_id, fingerprint, channel, status, error, sent_at, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&record.rule_id)
    .bind(&record.project_id)
    .bind(&record.fingerprint)
    .bind(record.channel.as_str())
    .bind(record.status.as_str())
    .bind(&record.error)
    .bind(sent_at)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Atomically claim the right to notify for a rule within a window.
///
/// Inserts the notification row only when no notification for the rule exists
/// after `window_start`. With concurrent alert workers, exactly one claim
/// succeeds per cool-down window (the insert and the history check are one
/// statement). Returns the notification id when claimed.
pub async fn claim_notification_slot(
    pool: &SqlitePool,
    rule_id: &str,
    project_id: &str,
    fingerprint: &str,
    channel: &str,
    window_start: i64,
) -> Result<Option<String>, SqliteError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();

    let result = sqlx::query(
        r#"INSERT INTO notifications (id, rule_id, project_id, fingerprint, channel, status, error, sent_at, created_at)
           SELECT ?, ?, ?, ?, ?, 'failed', 'pending dispatch', NULL, ?
           WHERE NOT EXISTS (
               SELECT 1 FROM notifications WHERE rule_id = ? AND created_at > ?
           )"#,
    )
    .bind(&id)
    .bind(rule_id)
    .bind(project_id)
    .bind(fingerprint)
    .bind(channel)
    .bind(now)
    .bind(rule_id)
    .bind(window_start)
    .execute(pool)
    .await?;

    Ok((result.rows_affected() > 0).then_some(id))
}

/// Finalize a claimed notification slot with the dispatch result
pub async fn finalize_notification(
    pool: &SqlitePool,
    notification_id: &str,
    status: NotificationStatus,
    error: Option<&str>,
) -> Result<(), SqliteError> {
    let now = chrono::Utc::now().timestamp_millis();
    let sent_at = matches!(status, NotificationStatus::Sent).then_some(now);

    sqlx::query("UPDATE notifications SET status = ?, error = ?, sent_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(error)
        .bind(sent_at)
        .bind(notification_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Whether any notification for a rule was recorded after `since`
pub async fn notified_since(
    pool: &SqlitePool,
    rule_id: &str,
    since: i64,
) -> Result<bool, SqliteError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE rule_id = ? AND created_at > ?",
    )
    .bind(rule_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Delete notifications older than the cutoff (retention sweep)
pub async fn delete_older_than(pool: &SqlitePool, cutoff: i64) -> Result<u64, SqliteError> {
    let result = sqlx::query("DELETE FROM notifications WHERE created_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::AlertChannel;
    use crate::data::sqlite::test_pool;

    fn record(status: NotificationStatus) -> NotificationRecord {
        NotificationRecord {
            rule_id: "r1".to_string(),
            project_id: "default".to_string(),
            fingerprint: "fp1".to_string(),
            channel: AlertChannel::Email,
            status,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_notified_since() {
        let pool = test_pool().await;
        insert_notification(&pool, &record(NotificationStatus::Sent))
            .await
            .unwrap();

        assert!(notified_since(&pool, "r1", 0).await.unwrap());
        assert!(!notified_since(&pool, "r2", 0).await.unwrap());

        let future = chrono::Utc::now().timestamp_millis() + 1000;
        assert!(!notified_since(&pool, "r1", future).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_slot_is_exclusive_within_window() {
        let pool = test_pool().await;

        let first = claim_notification_slot(&pool, "r1", "default", "fp1", "email", 0)
            .await
            .unwrap();
        assert!(first.is_some());

        // Second claim inside the same window is suppressed
        let second = claim_notification_slot(&pool, "r1", "default", "fp1", "email", 0)
            .await
            .unwrap();
        assert!(second.is_none());

        // A different rule is unaffected
        let other = claim_notification_slot(&pool, "r2", "default", "fp1", "email", 0)
            .await
            .unwrap();
        assert!(other.is_some());
    }

    #[tokio::test]
    async fn test_claim_slot_reopens_after_window() {
        let pool = test_pool().await;

        claim_notification_slot(&pool, "r1", "default", "fp1", "email", 0)
            .await
            .unwrap()
            .unwrap();

        // Window start after the first claim: slot is free again
        let future_window = chrono::Utc::now().timestamp_millis() + 1000;
        let second = claim_notification_slot(&pool, "r1", "default", "fp1", "email", future_window)
            .await
            .unwrap();
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn test_finalize_notification() {
        let pool = test_pool().await;
        let id = claim_notification_slot(&pool, "r1", "default", "fp1", "email", 0)
            .await
            .unwrap()
            .unwrap();

        finalize_notification(&pool, &id, NotificationStatus::Sent, None)
            .await
            .unwrap();

        let (status, sent_at): (String, Option<i64>) =
            sqlx::query_as("SELECT status, sent_at FROM notifications WHERE id = ?")
                .bind(&id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "sent");
        assert!(sent_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let pool = test_pool().await;
        insert_notification(&pool, &record(NotificationStatus::Sent))
            .await
            .unwrap();

        let future = chrono::Utc::now().timestamp_millis() + 1000;
        assert_eq!(delete_older_than(&pool, future).await.unwrap(), 1);
    }
}
