//! Occurrence (error event) repository
//!
//! Occurrences are immutable once written. A UNIQUE index on
//! (fingerprint, project_id, created_at) is the idempotency backstop for
//! at-least-once job delivery: a violated insert is a duplicate, not an error.

use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;
use crate::data::types::OccurrenceRecord;

/// Insert an occurrence.
///
/// Returns `Ok(false)` when the idempotency index rejects a duplicate, which
/// callers must treat as "already processed".
pub async fn insert_occurrence(
    pool: &SqlitePool,
    record: &OccurrenceRecord,
) -> Result<bool, SqliteError> {
    let id = uuid::Uuid::new_v4().to_string();

    let result = sqlx::query(
        r#"INSERT INTO error_events
               (id, fingerprint, project_id, stack, url, env, status_code, level,
                breadcrumbs, session_id, user_id, release, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&record.fingerprint)
    .bind(&record.project_id)
    .bind(&record.stack)
    .bind(&record.url)
    .bind(&record.env)
    .bind(record.status_code)
    .bind(&record.level)
    .bind(&record.breadcrumbs)
    .bind(&record.session_id)
    .bind(&record.user_id)
    .bind(&record.release)
    .bind(record.created_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(e) => {
            let err = SqliteError::from(e);
            if err.is_unique_violation() {
                tracing::debug!(
                    fingerprint = %record.fingerprint,
                    project_id = %record.project_id,
                    "Duplicate occurrence ignored"
                );
                Ok(false)
            } else {
                Err(err)
            }
        }
    }
}

/// Count a project's occurrences since a timestamp (quota and threshold checks)
pub async fn count_project_events_since(
    pool: &SqlitePool,
    project_id: &str,
    since: i64,
) -> Result<i64, SqliteError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM error_events WHERE project_id = ? AND created_at > ?",
    )
    .bind(project_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Most recent environment tag reported for a fingerprint (notification detail)
pub async fn latest_env_for_fingerprint(
    pool: &SqlitePool,
    fingerprint: &str,
) -> Result<Option<String>, SqliteError> {
    let env: Option<String> = sqlx::query_scalar(
        "SELECT env FROM error_events WHERE fingerprint = ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(fingerprint)
    .fetch_optional(pool)
    .await?;
    Ok(env)
}

/// Delete occurrences older than the cutoff (retention sweep)
pub async fn delete_older_than(pool: &SqlitePool, cutoff: i64) -> Result<u64, SqliteError> {
    let result = sqlx::query("DELETE FROM error_events WHERE created_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Count occurrences older than the cutoff without deleting (retention stats)
pub async fn count_older_than(pool: &SqlitePool, cutoff: i64) -> Result<i64, SqliteError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM error_events WHERE created_at < ?")
            .bind(cutoff)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Oldest and newest occurrence timestamps (retention stats)
pub async fn event_time_bounds(
    pool: &SqlitePool,
) -> Result<(Option<i64>, Option<i64>), SqliteError> {
    let bounds: (Option<i64>, Option<i64>) =
        sqlx::query_as("SELECT MIN(created_at), MAX(created_at) FROM error_events")
            .fetch_one(pool)
            .await?;
    Ok(bounds)
}
