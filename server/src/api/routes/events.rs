//! Event ingestion endpoint (the admission gate)
//!
//! Runs inline with the request and fast-fails, in order: payload validation,
//! ingestion kill switch, server-side sample rate, monthly quota, graduated
//! per-second admission sampling, short-window duplicate suppression. On
//! acceptance the occurrence is enqueued and the SDK gets a 202 immediately;
//! acceptance means "the job queue accepted it", not that processing finished.
//!
//! Rejections carry machine-readable codes: quota and rate limiting mean
//! "retry later", an invalid key means "fix your key", a disabled project
//! means "never retry". Sampled drops are a 202 with `sampled: true` so SDKs
//! do not retry them.

use std::time::Duration;

use axum::Extension;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use validator::{Validate, ValidationError};

use crate::api::ApiState;
use crate::api::auth::AuthedKey;
use crate::api::extractors::ValidatedJson;
use crate::api::types::ApiError;
use crate::core::constants::INGEST_DEDUP_TTL_SECS;
use crate::data::cache::{AdmissionDecision, CacheKey};
use crate::data::sqlite::repositories::projects;
use crate::data::types::Severity;
use crate::domain::quota;
use crate::queue::EventJob;
use crate::utils::crypto::sha256_hex;
use crate::utils::time::normalize_timestamp_ms;

fn validate_level(level: &str) -> Result<(), ValidationError> {
    match Severity::parse(level) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("level")
            .with_message("level must be one of fatal/error/warning/info/debug".into())),
    }
}

fn validate_breadcrumbs(breadcrumbs: &Value) -> Result<(), ValidationError> {
    match breadcrumbs.as_array() {
        Some(items) if items.len() <= 100 => Ok(()),
        Some(_) => {
            Err(ValidationError::new("breadcrumbs").with_message("at most 100 breadcrumbs".into()))
        }
        None => {
            Err(ValidationError::new("breadcrumbs").with_message("breadcrumbs must be an array".into()))
        }
    }
}

/// Occurrence payload submitted by SDKs
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitEventRequest {
    #[validate(length(min = 1, max = 10_000))]
    pub message: String,
    #[validate(length(min = 1, max = 1_000))]
    pub file: String,
    #[validate(range(min = 1))]
    pub line: i64,
    #[validate(range(min = 0))]
    pub column: Option<i64>,
    #[validate(length(min = 1, max = 100_000))]
    pub stack: String,
    #[validate(length(max = 50))]
    #[serde(default = "default_env")]
    pub env: String,
    #[validate(length(max = 2_000))]
    pub url: Option<String>,
    #[validate(range(min = 100, max = 599))]
    pub status_code: Option<i64>,
    #[validate(custom(function = "validate_level"))]
    #[serde(default = "default_level")]
    pub level: String,
    /// Occurrence time: epoch seconds or milliseconds; defaults to now
    pub timestamp: Option<i64>,
    #[validate(custom(function = "validate_breadcrumbs"))]
    pub breadcrumbs: Option<Value>,
    #[validate(length(max = 100))]
    pub session_id: Option<String>,
    #[validate(length(max = 100))]
    pub user_id: Option<String>,
    #[validate(length(max = 200))]
    pub release: Option<String>,
}

fn default_env() -> String {
    "unknown".to_string()
}

fn default_level() -> String {
    "error".to_string()
}

/// Submit an error occurrence
pub async fn submit(
    State(state): State<ApiState>,
    Extension(AuthedKey(key)): Extension<AuthedKey>,
    ValidatedJson(input): ValidatedJson<SubmitEventRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let pool = state.database.pool();
    let project_id = key.project_id;

    // Project lookup (short-TTL cached); a key without a project is stale
    let project = projects::get_project(pool, Some(&state.cache), &project_id)
        .await?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_API_KEY",
                "API key project no longer exists",
            )
        })?;

    // Kill switch: never retry
    if !project.events_enabled {
        tracing::info!(project_id, "Event rejected - ingestion disabled");
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "INGESTION_DISABLED",
            "Event ingestion has been disabled for this project",
        ));
    }

    // Server-side sample rate (project setting)
    if project.sample_rate < 1.0 && rand::random::<f64>() >= project.sample_rate {
        tracing::debug!(project_id, sample_rate = project.sample_rate, "Event dropped by sample rate");
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "accepted": false, "sampled": true })),
        ));
    }

    // Monthly quota against the plan: retry later (next period)
    let (allowed, status) = quota::can_accept_event(pool, &project_id, project.plan).await?;
    if !allowed {
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "QUOTA_EXCEEDED",
            format!(
                "Monthly quota exceeded ({}/{} events)",
                status.used, status.limit
            ),
        )
        .with_detail(json!({
            "used": status.used,
            "limit": status.limit,
            "percentage": status.percentage,
        })));
    }

    // Graduated per-second sampling: drops are 202s, the SDK must not retry
    let decision = state.sampler.check(&project_id).await;
    if !decision.accepted() {
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "accepted": false, "sampled": true })),
        ));
    }
    if decision == AdmissionDecision::AcceptSampled {
        tracing::debug!(project_id, "Event admitted from the graduated sampling band");
    }

    // Short-window duplicate suppression (same project/message/file/line)
    let digest = sha256_hex(&format!(
        "{}|{}|{}|{}",
        project_id, input.message, input.file, input.line
    ));
    let dedup_key = CacheKey::admission_dedup(&project_id, &digest);
    if state.cache.exists(&dedup_key).await.unwrap_or(false) {
        tracing::debug!(project_id, "Event deduplicated at admission");
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "accepted": true, "deduplicated": true })),
        ));
    }
    if let Err(e) = state
        .cache
        .set_raw(
            &dedup_key,
            vec![],
            Some(Duration::from_secs(INGEST_DEDUP_TTL_SECS)),
        )
        .await
    {
        tracing::warn!(project_id, error = %e, "Admission dedup cache write failed");
    }

    let created_at = input
        .timestamp
        .map(normalize_timestamp_ms)
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

    // Session linkage only for severe levels
    let session_id = if matches!(input.level.as_str(), "fatal" | "error") {
        input.session_id.clone()
    } else {
        None
    };

    let job = EventJob {
        project_id: project_id.clone(),
        message: input.message.clone(),
        file: input.file.clone(),
        line: input.line,
        column: input.column,
        stack: input.stack.clone(),
        env: input.env.clone(),
        url: input.url.clone(),
        level: input.level.clone(),
        status_code: input.status_code,
        breadcrumbs: input.breadcrumbs.as_ref().map(|b| b.to_string()),
        session_id,
        user_id: input.user_id.clone(),
        release: input.release.clone(),
        created_at,
    };

    // Queue-side dedup key covers the same window as the cache check, so a
    // cache wipe cannot double-enqueue
    let job_dedup = format!(
        "evt-{}-{}-{}",
        project_id,
        digest,
        created_at / (INGEST_DEDUP_TTL_SECS as i64 * 1000)
    );
    state.queue.enqueue_event(&job, Some(&job_dedup)).await?;

    tracing::debug!(project_id, level = %input.level, "Event queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": true, "queued": true })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_payload() -> Value {
        json!({
            "message": "TypeError: x is undefined",
            "file": "app.js",
            "line": 42,
            "stack": "    at handleClick (app.js:42:7)",
        })
    }

    #[test]
    fn test_payload_defaults() {
        let input: SubmitEventRequest = serde_json::from_value(valid_payload()).unwrap();
        assert!(input.validate().is_ok());
        assert_eq!(input.env, "unknown");
        assert_eq!(input.level, "error");
        assert!(input.timestamp.is_none());
    }

    #[test]
    fn test_payload_rejects_bad_level() {
        let mut payload = valid_payload();
        payload["level"] = json!("catastrophic");
        let input: SubmitEventRequest = serde_json::from_value(payload).unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_payload_rejects_empty_message() {
        let mut payload = valid_payload();
        payload["message"] = json!("");
        let input: SubmitEventRequest = serde_json::from_value(payload).unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_payload_rejects_non_array_breadcrumbs() {
        let mut payload = valid_payload();
        payload["breadcrumbs"] = json!({"not": "an array"});
        let input: SubmitEventRequest = serde_json::from_value(payload).unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_payload_accepts_breadcrumb_array() {
        let mut payload = valid_payload();
        payload["breadcrumbs"] = json!([{"timestamp": 1, "category": "ui"}]);
        let input: SubmitEventRequest = serde_json::from_value(payload).unwrap();
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_validate_level_values() {
        for level in ["fatal", "error", "warning", "info", "debug"] {
            assert!(validate_level(level).is_ok());
        }
        assert!(validate_level("verbose").is_err());
    }
}
