//! Admin/maintenance surface
//!
//! Operator-authenticated endpoints: retention stats and cleanup, issue count
//! repair, quota inspection, and queue operations (status, manual trigger,
//! parked job inspection/cleanup).

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::ApiState;
use crate::api::types::ApiError;
use crate::data::sqlite::repositories::{jobs, projects};
use crate::domain::{quota, retention};
use crate::queue::{AggregationJob, AggregationKind};
use crate::utils::time::day_start_ms;

/// GET /admin/retention/stats
pub async fn retention_stats(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let preview =
        retention::retention_preview(state.database.pool(), &state.config.retention).await?;
    Ok(Json(json!({
        "eventsToDelete": preview.events_to_delete,
        "oldestEvent": preview.oldest_event,
        "newestEvent": preview.newest_event,
        "retentionDays": state.config.retention.event_retention_days,
    })))
}

/// POST /admin/retention/cleanup
pub async fn run_retention_cleanup(
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    let stats = retention::run_cleanup(&state.database, &state.config.retention).await?;
    Ok(Json(serde_json::to_value(stats).unwrap_or_default()))
}

/// POST /admin/groups/update-counts
pub async fn update_group_counts(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let (recounted, reopened) = retention::run_maintenance(state.database.pool()).await?;
    Ok(Json(json!({ "recounted": recounted, "reopened": reopened })))
}

/// GET /admin/quota/{project_id}
pub async fn project_quota(
    State(state): State<ApiState>,
    Path(project_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let project = projects::get_project(state.database.pool(), None, &project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("project not found"))?;

    let status = quota::quota_status(state.database.pool(), &project_id, project.plan).await?;
    Ok(Json(json!({
        "projectId": project_id,
        "plan": project.plan.as_str(),
        "quota": status,
    })))
}

/// GET /admin/queue/status
pub async fn queue_status(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let counts = state.queue.counts().await?;
    let queues: serde_json::Map<String, Value> = counts
        .into_iter()
        .map(|(name, count)| {
            (
                name.to_string(),
                serde_json::to_value(count).unwrap_or_default(),
            )
        })
        .collect();
    Ok(Json(Value::Object(queues)))
}

/// Manual trigger payload
#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub kind: AggregationKind,
    /// Day to process (epoch ms of any instant in the day); defaults to yesterday
    pub target_day_ms: Option<i64>,
}

/// POST /admin/queue/trigger
pub async fn trigger_job(
    State(state): State<ApiState>,
    Json(input): Json<TriggerRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let target_day_ms = input.target_day_ms.unwrap_or_else(|| {
        day_start_ms(chrono::Utc::now() - chrono::Duration::days(1))
    });

    // Manual triggers bypass the scheduler's dedup so operators can re-run
    let enqueued = state
        .queue
        .enqueue_aggregation(
            &AggregationJob {
                kind: input.kind,
                target_day_ms: Some(target_day_ms),
            },
            None,
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "enqueued": enqueued, "kind": input.kind.as_str(), "targetDayMs": target_day_ms })),
    ))
}

/// GET /admin/queue/parked
pub async fn list_parked(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let parked = jobs::list_parked(state.database.pool(), 100).await?;
    let items: Vec<Value> = parked
        .into_iter()
        .map(|(id, queue, kind, last_error, updated_at)| {
            json!({
                "id": id,
                "queue": queue,
                "kind": kind,
                "lastError": last_error,
                "updatedAt": updated_at,
            })
        })
        .collect();
    Ok(Json(json!({ "parked": items })))
}

/// DELETE /admin/queue/parked
pub async fn clear_parked(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let removed = jobs::clear_parked(state.database.pool()).await?;
    Ok(Json(json!({ "removed": removed })))
}
