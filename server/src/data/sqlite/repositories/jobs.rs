//! Durable job queue state
//!
//! Jobs live in the shared database so every ingest process sees one logical
//! queue. Claiming is a single atomic UPDATE...RETURNING, so two workers can
//! never run the same job concurrently. Failed jobs are rescheduled with
//! exponential backoff via `run_at` until `max_attempts`, then parked.
//! Parked jobs are retained longer than completed ones for inspection.

use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;

/// One claimed job
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub queue: String,
    pub kind: String,
    pub payload: String,
    pub attempts: i64,
    pub max_attempts: i64,
}

/// Per-status job counts for one queue
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub parked: i64,
}

/// Enqueue a job.
///
/// A `dedup_key` makes the enqueue idempotent while a job with the same key is
/// still live (pending/running): the duplicate enqueue is a no-op. Returns the
/// job id, or None when deduplicated.
#[allow(clippy::too_many_arguments)]
pub async fn enqueue(
    pool: &SqlitePool,
    queue: &str,
    kind: &str,
    payload: &str,
    max_attempts: i64,
    run_at: i64,
    dedup_key: Option<&str>,
) -> Result<Option<String>, SqliteError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();

    let result = sqlx::query(
        r#"INSERT INTO jobs (id, queue, kind, payload, status, attempts, max_attempts, run_at, dedup_key, created_at, updated_at)
           VALUES (?, ?, ?, ?, 'pending', 0, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(queue)
    .bind(kind)
    .bind(payload)
    .bind(max_attempts)
    .bind(run_at)
    .bind(dedup_key)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(Some(id)),
        Err(e) => {
            let err = SqliteError::from(e);
            if err.is_unique_violation() {
                tracing::debug!(queue, kind, dedup_key = ?dedup_key, "Duplicate job enqueue ignored");
                Ok(None)
            } else {
                Err(err)
            }
        }
    }
}

/// Atomically claim the next runnable job from a queue
pub async fn claim_next(
    pool: &SqlitePool,
    queue: &str,
    now: i64,
) -> Result<Option<JobRow>, SqliteError> {
    let row = sqlx::query_as::<_, (String, String, String, String, i64, i64)>(
        r#"UPDATE jobs
           SET status = 'running', attempts = attempts + 1, updated_at = ?
           WHERE id = (
               SELECT id FROM jobs
               WHERE queue = ? AND status = 'pending' AND run_at <= ?
               ORDER BY run_at, created_at
               LIMIT 1
           )
           RETURNING id, queue, kind, payload, attempts, max_attempts"#,
    )
    .bind(now)
    .bind(queue)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(id, queue, kind, payload, attempts, max_attempts)| JobRow {
        id,
        queue,
        kind,
        payload,
        attempts,
        max_attempts,
    }))
}

/// Mark a job completed
pub async fn complete(pool: &SqlitePool, job_id: &str) -> Result<(), SqliteError> {
    let now = chrono::Utc::now().timestamp_millis();
    sqlx::query("UPDATE jobs SET status = 'completed', updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record a failed attempt.
///
/// Reschedules with exponential backoff while attempts remain, otherwise
/// parks the job for operator inspection. Returns true when parked.
pub async fn fail(
    pool: &SqlitePool,
    job: &JobRow,
    error: &str,
    base_backoff_ms: i64,
) -> Result<bool, SqliteError> {
    let now = chrono::Utc::now().timestamp_millis();

    if job.attempts < job.max_attempts {
        let delay = crate::utils::retry::backoff_delay(
            base_backoff_ms.max(0) as u64,
            job.attempts.clamp(0, u32::MAX as i64) as u32,
        )
        .as_millis()
        .min(i64::MAX as u128) as i64;
        sqlx::query(
            "UPDATE jobs SET status = 'pending', run_at = ?, last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(now + delay)
        .bind(error)
        .bind(now)
        .bind(&job.id)
        .execute(pool)
        .await?;
        Ok(false)
    } else {
        sqlx::query(
            "UPDATE jobs SET status = 'parked', last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(now)
        .bind(&job.id)
        .execute(pool)
        .await?;
        Ok(true)
    }
}

/// Per-status counts for one queue
pub async fn counts(pool: &SqlitePool, queue: &str) -> Result<QueueCounts, SqliteError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM jobs WHERE queue = ? GROUP BY status",
    )
    .bind(queue)
    .fetch_all(pool)
    .await?;

    let mut result = QueueCounts::default();
    for (status, count) in rows {
        match status.as_str() {
            "pending" => result.pending = count,
            "running" => result.running = count,
            "completed" => result.completed = count,
            "parked" => result.parked = count,
            _ => {}
        }
    }
    Ok(result)
}

/// Parked jobs, most recent first (operator inspection)
pub async fn list_parked(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<(String, String, String, Option<String>, i64)>, SqliteError> {
    let rows = sqlx::query_as::<_, (String, String, String, Option<String>, i64)>(
        r#"SELECT id, queue, kind, last_error, updated_at FROM jobs
           WHERE status = 'parked' ORDER BY updated_at DESC LIMIT ?"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Delete parked jobs (operator cleanup); returns count removed
pub async fn clear_parked(pool: &SqlitePool) -> Result<u64, SqliteError> {
    let result = sqlx::query("DELETE FROM jobs WHERE status = 'parked'")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Prune finished jobs past their retention windows.
///
/// Completed jobs age out quickly; parked jobs are kept longer so operators
/// can inspect what went wrong.
pub async fn prune(
    pool: &SqlitePool,
    completed_cutoff: i64,
    parked_cutoff: i64,
) -> Result<u64, SqliteError> {
    let completed = sqlx::query("DELETE FROM jobs WHERE status = 'completed' AND updated_at < ?")
        .bind(completed_cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    let parked = sqlx::query("DELETE FROM jobs WHERE status = 'parked' AND updated_at < ?")
        .bind(parked_cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(completed + parked)
}
