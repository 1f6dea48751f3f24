//! Issue (error group) repository
//!
//! Maintains exactly one row per fingerprint. The write path is an atomic
//! upsert so concurrent workers processing the same fingerprint cannot corrupt
//! the count: on conflict the row is updated in place with
//! `count = count + 1`, `last_seen = max(...)`, `first_seen = min(...)`.
//!
//! A resolved issue reopens on recurrence. The resolved->open flip runs as its
//! own guarded UPDATE inside the same transaction, so exactly one concurrent
//! worker observes the transition and reports it as a regression downstream.

use sqlx::{Row, SqlitePool};

use crate::data::sqlite::SqliteError;
use crate::data::types::{IssueRow, IssueStatus, UpsertOutcome};

/// Fields describing the group representation of an incoming occurrence
#[derive(Debug, Clone)]
pub struct GroupUpsert<'a> {
    pub fingerprint: &'a str,
    pub project_id: &'a str,
    pub message: &'a str,
    pub file: &'a str,
    pub line: i64,
    pub url: Option<&'a str>,
    pub status_code: Option<i64>,
    pub level: &'a str,
    /// Occurrence time (may be earlier than the group's current first_seen)
    pub occurred_at: i64,
    /// Processing time, becomes last_seen when newer
    pub now: i64,
}

/// Atomically record an occurrence against its group.
///
/// Returns whether the group was created by this call and whether a
/// resolved->open transition happened (a regression).
pub async fn upsert_group(
    pool: &SqlitePool,
    upsert: &GroupUpsert<'_>,
) -> Result<UpsertOutcome, SqliteError> {
    let mut tx = pool.begin().await?;

    // Guarded reopen: only one concurrent worker wins this UPDATE, so the
    // regression signal fires exactly once per resolved->open transition.
    let reopened = sqlx::query(
        r#"UPDATE error_groups
           SET status = 'open', resolved_at = NULL, resolved_by = NULL
           WHERE fingerprint = ? AND status = 'resolved'"#,
    )
    .bind(upsert.fingerprint)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        > 0;

    let count: i64 = sqlx::query_scalar(
        r#"INSERT INTO error_groups
               (fingerprint, project_id, message, file, line, url, status_code, level,
                count, users_affected, first_seen, last_seen, status)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?, 'open')
           ON CONFLICT(fingerprint) DO UPDATE SET
               count = count + 1,
               last_seen = MAX(last_seen, excluded.last_seen),
               first_seen = MIN(first_seen, excluded.first_seen)
           RETURNING count"#,
    )
    .bind(upsert.fingerprint)
    .bind(upsert.project_id)
    .bind(upsert.message)
    .bind(upsert.file)
    .bind(upsert.line)
    .bind(upsert.url)
    .bind(upsert.status_code)
    .bind(upsert.level)
    .bind(upsert.occurred_at)
    .bind(upsert.now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(UpsertOutcome {
        new_group: count == 1,
        regression: reopened,
    })
}

/// Result of recording an occurrence against its group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordResult {
    /// Group updated and occurrence persisted
    Recorded(UpsertOutcome),
    /// The occurrence was already persisted; nothing changed
    Duplicate,
}

/// Record an occurrence and its group update in one transaction.
///
/// When the occurrence insert hits the idempotency index, the whole
/// transaction rolls back, so a re-delivered job can never inflate the group
/// count: `count` always equals the number of persisted occurrences.
pub async fn record_occurrence(
    pool: &SqlitePool,
    upsert: &GroupUpsert<'_>,
    occurrence: &crate::data::types::OccurrenceRecord,
) -> Result<RecordResult, SqliteError> {
    let mut tx = pool.begin().await?;

    let reopened = sqlx::query(
        r#"UPDATE error_groups
           SET status = 'open', resolved_at = NULL, resolved_by = NULL
           WHERE fingerprint = ? AND status = 'resolved'"#,
    )
    .bind(upsert.fingerprint)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        > 0;

    let count: i64 = sqlx::query_scalar(
        r#"INSERT INTO error_groups
               (fingerprint, project_id, message, file, line, url, status_code, level,
                count, users_affected, first_seen, last_seen, status)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?, 'open')
           ON CONFLICT(fingerprint) DO UPDATE SET
               count = count + 1,
               last_seen = MAX(last_seen, excluded.last_seen),
               first_seen = MIN(first_seen, excluded.first_seen)
           RETURNING count"#,
    )
    .bind(upsert.fingerprint)
    .bind(upsert.project_id)
    .bind(upsert.message)
    .bind(upsert.file)
    .bind(upsert.line)
    .bind(upsert.url)
    .bind(upsert.status_code)
    .bind(upsert.level)
    .bind(upsert.occurred_at)
    .bind(upsert.now)
    .fetch_one(&mut *tx)
    .await?;

    let event_id = uuid::Uuid::new_v4().to_string();
    let insert_result = sqlx::query(
        r#"INSERT INTO error_events
               (id, fingerprint, project_id, stack, url, env, status_code, level,
                breadcrumbs, session_id, user_id, release, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&event_id)
    .bind(&occurrence.fingerprint)
    .bind(&occurrence.project_id)
    .bind(&occurrence.stack)
    .bind(&occurrence.url)
    .bind(&occurrence.env)
    .bind(occurrence.status_code)
    .bind(&occurrence.level)
    .bind(&occurrence.breadcrumbs)
    .bind(&occurrence.session_id)
    .bind(&occurrence.user_id)
    .bind(&occurrence.release)
    .bind(occurrence.created_at)
    .execute(&mut *tx)
    .await;

    if let Err(e) = insert_result {
        let err = SqliteError::from(e);
        if err.is_unique_violation() {
            // Roll back the group update too: this delivery changed nothing
            tx.rollback().await?;
            tracing::debug!(
                fingerprint = %occurrence.fingerprint,
                project_id = %occurrence.project_id,
                "Duplicate occurrence ignored"
            );
            return Ok(RecordResult::Duplicate);
        }
        return Err(err);
    }

    tx.commit().await?;

    Ok(RecordResult::Recorded(UpsertOutcome {
        new_group: count == 1,
        regression: reopened,
    }))
}

/// Fetch an issue by fingerprint
pub async fn get_by_fingerprint(
    pool: &SqlitePool,
    fingerprint: &str,
) -> Result<Option<IssueRow>, SqliteError> {
    let row = sqlx::query(
        r#"SELECT fingerprint, project_id, message, file, line, url, status_code, level,
                  count, users_affected, first_seen, last_seen, status,
                  resolved_at, resolved_by, assigned_to, snoozed_until
           FROM error_groups WHERE fingerprint = ?"#,
    )
    .bind(fingerprint)
    .fetch_optional(pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let status: String = row.try_get("status")?;
    Ok(Some(IssueRow {
        fingerprint: row.try_get("fingerprint")?,
        project_id: row.try_get("project_id")?,
        message: row.try_get("message")?,
        file: row.try_get("file")?,
        line: row.try_get("line")?,
        url: row.try_get("url")?,
        status_code: row.try_get("status_code")?,
        level: row.try_get("level")?,
        count: row.try_get("count")?,
        users_affected: row.try_get("users_affected")?,
        first_seen: row.try_get("first_seen")?,
        last_seen: row.try_get("last_seen")?,
        status: IssueStatus::parse(&status).unwrap_or(IssueStatus::Open),
        resolved_at: row.try_get("resolved_at")?,
        resolved_by: row.try_get("resolved_by")?,
        assigned_to: row.try_get("assigned_to")?,
        snoozed_until: row.try_get("snoozed_until")?,
    }))
}

/// Mark an issue resolved (used by tests and the admin surface)
pub async fn resolve(
    pool: &SqlitePool,
    fingerprint: &str,
    resolved_by: &str,
) -> Result<bool, SqliteError> {
    let now = chrono::Utc::now().timestamp_millis();
    let result = sqlx::query(
        "UPDATE error_groups SET status = 'resolved', resolved_at = ?, resolved_by = ? WHERE fingerprint = ?",
    )
    .bind(now)
    .bind(resolved_by)
    .bind(fingerprint)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Recompute users_affected for a fingerprint from its occurrences.
///
/// Full distinct-count rescan per write; the recount pass below repairs any
/// drift this leaves behind.
pub async fn update_users_affected(
    pool: &SqlitePool,
    fingerprint: &str,
) -> Result<(), SqliteError> {
    sqlx::query(
        r#"UPDATE error_groups SET users_affected = (
               SELECT COUNT(DISTINCT user_id) FROM error_events
               WHERE fingerprint = ? AND user_id IS NOT NULL
           ) WHERE fingerprint = ?"#,
    )
    .bind(fingerprint)
    .bind(fingerprint)
    .execute(pool)
    .await?;
    Ok(())
}

/// Maintenance pass: recompute every issue's count from its occurrences
pub async fn recount_from_events(pool: &SqlitePool) -> Result<u64, SqliteError> {
    let result = sqlx::query(
        r#"UPDATE error_groups SET count = (
               SELECT COUNT(*) FROM error_events
               WHERE error_events.fingerprint = error_groups.fingerprint
           )"#,
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Maintenance pass: reopen snoozed issues whose deadline has passed
pub async fn reopen_expired_snoozes(pool: &SqlitePool, now: i64) -> Result<u64, SqliteError> {
    let result = sqlx::query(
        r#"UPDATE error_groups SET status = 'open', snoozed_until = NULL
           WHERE status = 'snoozed' AND snoozed_until IS NOT NULL AND snoozed_until < ?"#,
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Delete groups that no longer have any occurrences (post-retention sweep)
pub async fn delete_orphaned(pool: &SqlitePool) -> Result<u64, SqliteError> {
    let result = sqlx::query(
        r#"DELETE FROM error_groups WHERE fingerprint IN (
               SELECT eg.fingerprint
               FROM error_groups eg
               LEFT JOIN error_events ee ON eg.fingerprint = ee.fingerprint
               WHERE ee.id IS NULL
           )"#,
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::test_pool;

    fn sample<'a>(fingerprint: &'a str, occurred_at: i64, now: i64) -> GroupUpsert<'a> {
        GroupUpsert {
            fingerprint,
            project_id: "default",
            message: "TypeError: x is undefined",
            file: "app.js",
            line: 42,
            url: None,
            status_code: None,
            level: "error",
            occurred_at,
            now,
        }
    }

    #[tokio::test]
    async fn test_first_occurrence_creates_group() {
        let pool = test_pool().await;
        let outcome = upsert_group(&pool, &sample("fp1", 1000, 1000)).await.unwrap();
        assert!(outcome.new_group);
        assert!(!outcome.regression);

        let issue = get_by_fingerprint(&pool, "fp1").await.unwrap().unwrap();
        assert_eq!(issue.count, 1);
        assert_eq!(issue.first_seen, 1000);
        assert_eq!(issue.last_seen, 1000);
        assert_eq!(issue.status, IssueStatus::Open);
    }

    #[tokio::test]
    async fn test_repeat_occurrence_increments() {
        let pool = test_pool().await;
        upsert_group(&pool, &sample("fp1", 1000, 1000)).await.unwrap();
        let outcome = upsert_group(&pool, &sample("fp1", 2000, 2000)).await.unwrap();
        assert!(!outcome.new_group);
        assert!(!outcome.regression);

        let issue = get_by_fingerprint(&pool, "fp1").await.unwrap().unwrap();
        assert_eq!(issue.count, 2);
        assert_eq!(issue.last_seen, 2000);
    }

    #[tokio::test]
    async fn test_out_of_order_occurrence_moves_first_seen_back() {
        let pool = test_pool().await;
        upsert_group(&pool, &sample("fp1", 5000, 5000)).await.unwrap();
        // An older occurrence arrives late
        upsert_group(&pool, &sample("fp1", 1000, 6000)).await.unwrap();

        let issue = get_by_fingerprint(&pool, "fp1").await.unwrap().unwrap();
        assert_eq!(issue.first_seen, 1000);
        assert_eq!(issue.last_seen, 6000);
    }

    #[tokio::test]
    async fn test_resolved_issue_reopens_as_regression() {
        let pool = test_pool().await;
        upsert_group(&pool, &sample("fp1", 1000, 1000)).await.unwrap();
        assert!(resolve(&pool, "fp1", "alice").await.unwrap());

        let outcome = upsert_group(&pool, &sample("fp1", 2000, 2000)).await.unwrap();
        assert!(!outcome.new_group);
        assert!(outcome.regression);

        let issue = get_by_fingerprint(&pool, "fp1").await.unwrap().unwrap();
        assert_eq!(issue.status, IssueStatus::Open);
        assert!(issue.resolved_at.is_none());
        assert!(issue.resolved_by.is_none());
    }

    #[tokio::test]
    async fn test_regression_reported_once() {
        let pool = test_pool().await;
        upsert_group(&pool, &sample("fp1", 1000, 1000)).await.unwrap();
        resolve(&pool, "fp1", "alice").await.unwrap();

        let first = upsert_group(&pool, &sample("fp1", 2000, 2000)).await.unwrap();
        let second = upsert_group(&pool, &sample("fp1", 3000, 3000)).await.unwrap();
        assert!(first.regression);
        assert!(!second.regression);
    }

    #[tokio::test]
    async fn test_ignored_issue_stays_ignored() {
        let pool = test_pool().await;
        upsert_group(&pool, &sample("fp1", 1000, 1000)).await.unwrap();
        sqlx::query("UPDATE error_groups SET status = 'ignored' WHERE fingerprint = 'fp1'")
            .execute(&pool)
            .await
            .unwrap();

        let outcome = upsert_group(&pool, &sample("fp1", 2000, 2000)).await.unwrap();
        assert!(!outcome.regression);

        let issue = get_by_fingerprint(&pool, "fp1").await.unwrap().unwrap();
        assert_eq!(issue.status, IssueStatus::Ignored);
        assert_eq!(issue.count, 2);
    }

    #[tokio::test]
    async fn test_reopen_expired_snoozes() {
        let pool = test_pool().await;
        upsert_group(&pool, &sample("fp1", 1000, 1000)).await.unwrap();
        sqlx::query(
            "UPDATE error_groups SET status = 'snoozed', snoozed_until = 5000 WHERE fingerprint = 'fp1'",
        )
        .execute(&pool)
        .await
        .unwrap();

        // Before the deadline nothing happens
        assert_eq!(reopen_expired_snoozes(&pool, 4000).await.unwrap(), 0);
        // After the deadline the issue reopens
        assert_eq!(reopen_expired_snoozes(&pool, 6000).await.unwrap(), 1);

        let issue = get_by_fingerprint(&pool, "fp1").await.unwrap().unwrap();
        assert_eq!(issue.status, IssueStatus::Open);
        assert!(issue.snoozed_until.is_none());
    }

    fn occurrence(fingerprint: &str, created_at: i64) -> crate::data::types::OccurrenceRecord {
        crate::data::types::OccurrenceRecord {
            fingerprint: fingerprint.to_string(),
            project_id: "default".to_string(),
            stack: "at main (app.js:42:1)".to_string(),
            url: None,
            env: "production".to_string(),
            status_code: None,
            level: "error".to_string(),
            breadcrumbs: None,
            session_id: None,
            user_id: None,
            release: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_record_occurrence_duplicate_rolls_back_count() {
        let pool = test_pool().await;

        let result = record_occurrence(&pool, &sample("fp1", 1000, 1000), &occurrence("fp1", 1000))
            .await
            .unwrap();
        assert!(matches!(
            result,
            RecordResult::Recorded(UpsertOutcome {
                new_group: true,
                ..
            })
        ));

        // Same delivery again: the group increment must roll back with it
        let result = record_occurrence(&pool, &sample("fp1", 1000, 2000), &occurrence("fp1", 1000))
            .await
            .unwrap();
        assert_eq!(result, RecordResult::Duplicate);

        let issue = get_by_fingerprint(&pool, "fp1").await.unwrap().unwrap();
        assert_eq!(issue.count, 1);
        let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM error_events")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(events, 1);
    }

    #[tokio::test]
    async fn test_record_occurrence_duplicate_does_not_reopen() {
        let pool = test_pool().await;
        record_occurrence(&pool, &sample("fp1", 1000, 1000), &occurrence("fp1", 1000))
            .await
            .unwrap();
        resolve(&pool, "fp1", "alice").await.unwrap();

        // Re-delivery of the original occurrence must not flip the status
        let result = record_occurrence(&pool, &sample("fp1", 1000, 2000), &occurrence("fp1", 1000))
            .await
            .unwrap();
        assert_eq!(result, RecordResult::Duplicate);

        let issue = get_by_fingerprint(&pool, "fp1").await.unwrap().unwrap();
        assert_eq!(issue.status, IssueStatus::Resolved);
    }

    #[tokio::test]
    async fn test_delete_orphaned_groups() {
        let pool = test_pool().await;
        upsert_group(&pool, &sample("fp1", 1000, 1000)).await.unwrap();

        // No events reference fp1, so it is orphaned
        let deleted = delete_orphaned(&pool).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(get_by_fingerprint(&pool, "fp1").await.unwrap().is_none());
    }
}
