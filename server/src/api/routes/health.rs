//! Health check endpoint

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::api::ApiState;

/// GET /health
pub async fn health(State(state): State<ApiState>) -> (StatusCode, Json<Value>) {
    let database_ok = sqlx::query("SELECT 1")
        .execute(state.database.pool())
        .await
        .is_ok();
    let cache_ok = state.cache.health_check().await.is_ok();

    let status = if database_ok && cache_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "database": database_ok,
            "cache": cache_ok,
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
