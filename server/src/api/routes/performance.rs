//! Performance ingestion endpoints
//!
//! Raw metric and transaction samples feed the nightly rollups. Writes are
//! single-row and cheap, so they skip the queue and insert directly after the
//! same admission checks as events (kill switch, quota).

use axum::Extension;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use validator::Validate;

use crate::api::ApiState;
use crate::api::auth::AuthedKey;
use crate::api::extractors::ValidatedJson;
use crate::api::types::ApiError;
use crate::data::sqlite::repositories::{performance, projects};
use crate::data::types::{MetricRecord, ProjectRow, TransactionRecord};
use crate::domain::quota;
use crate::utils::time::normalize_timestamp_ms;

/// One metric sample
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct MetricInput {
    #[validate(length(min = 1, max = 50))]
    pub r#type: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 50))]
    #[serde(default = "default_env")]
    pub env: String,
    pub value: f64,
    pub timestamp: Option<i64>,
}

/// Metric submission payload (batched)
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitMetricsRequest {
    #[validate(length(min = 1, max = 500), nested)]
    pub metrics: Vec<MetricInput>,
}

/// One transaction sample
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitTransactionRequest {
    #[validate(length(min = 1, max = 500))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    #[serde(default = "default_op")]
    pub op: String,
    #[validate(length(max = 50))]
    #[serde(default = "default_env")]
    pub env: String,
    #[validate(range(min = 0.0))]
    pub duration_ms: f64,
    #[serde(default = "default_status")]
    pub status: String,
    pub timestamp: Option<i64>,
}

fn default_env() -> String {
    "unknown".to_string()
}

fn default_op() -> String {
    "http.server".to_string()
}

fn default_status() -> String {
    "ok".to_string()
}

/// Shared admission checks for the performance surface
async fn admitted_project(state: &ApiState, project_id: &str) -> Result<ProjectRow, ApiError> {
    let pool = state.database.pool();

    let project = projects::get_project(pool, Some(&state.cache), project_id)
        .await?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_API_KEY",
                "API key project no longer exists",
            )
        })?;

    if !project.events_enabled {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "INGESTION_DISABLED",
            "Ingestion has been disabled for this project",
        ));
    }

    let (allowed, status) = quota::can_accept_event(pool, project_id, project.plan).await?;
    if !allowed {
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "QUOTA_EXCEEDED",
            format!(
                "Monthly quota exceeded ({}/{} events)",
                status.used, status.limit
            ),
        ));
    }

    Ok(project)
}

/// Submit a batch of performance metrics
pub async fn submit_metrics(
    State(state): State<ApiState>,
    Extension(AuthedKey(key)): Extension<AuthedKey>,
    ValidatedJson(input): ValidatedJson<SubmitMetricsRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    admitted_project(&state, &key.project_id).await?;

    let now = chrono::Utc::now().timestamp_millis();
    for metric in &input.metrics {
        performance::insert_metric(
            state.database.pool(),
            &MetricRecord {
                project_id: key.project_id.clone(),
                metric_type: metric.r#type.clone(),
                name: metric.name.clone(),
                env: metric.env.clone(),
                value: metric.value,
                timestamp: metric.timestamp.map(normalize_timestamp_ms).unwrap_or(now),
            },
        )
        .await?;
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": true, "count": input.metrics.len() })),
    ))
}

/// Submit one transaction sample
pub async fn submit_transaction(
    State(state): State<ApiState>,
    Extension(AuthedKey(key)): Extension<AuthedKey>,
    ValidatedJson(input): ValidatedJson<SubmitTransactionRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    admitted_project(&state, &key.project_id).await?;

    performance::insert_transaction(
        state.database.pool(),
        &TransactionRecord {
            project_id: key.project_id.clone(),
            name: input.name.clone(),
            op: input.op.clone(),
            env: input.env.clone(),
            duration_ms: input.duration_ms,
            status: input.status.clone(),
            timestamp: input
                .timestamp
                .map(normalize_timestamp_ms)
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
        },
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_batch_validation() {
        let input: SubmitMetricsRequest = serde_json::from_value(json!({
            "metrics": [
                { "type": "web_vital", "name": "lcp", "value": 1200.0 }
            ]
        }))
        .unwrap();
        assert!(input.validate().is_ok());
        assert_eq!(input.metrics[0].env, "unknown");
    }

    #[test]
    fn test_empty_metric_batch_rejected() {
        let input: SubmitMetricsRequest =
            serde_json::from_value(json!({ "metrics": [] })).unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_transaction_defaults() {
        let input: SubmitTransactionRequest = serde_json::from_value(json!({
            "name": "GET /checkout",
            "duration_ms": 128.5,
        }))
        .unwrap();
        assert!(input.validate().is_ok());
        assert_eq!(input.op, "http.server");
        assert_eq!(input.status, "ok");
    }

    #[test]
    fn test_transaction_rejects_negative_duration() {
        let input: SubmitTransactionRequest = serde_json::from_value(json!({
            "name": "GET /checkout",
            "duration_ms": -1.0,
        }))
        .unwrap();
        assert!(input.validate().is_err());
    }
}
