//! Shared API response types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Structured API error with a machine-readable code.
///
/// Codes distinguish "retry later" (QUOTA_EXCEEDED, RATE_LIMITED) from "fix
/// your key" (INVALID_API_KEY) from "never retry" (INGESTION_DISABLED).
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub detail: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            message,
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.status.canonical_reason().unwrap_or("error"),
            "code": self.code,
            "message": self.message,
        });
        if let Some(detail) = self.detail
            && let Some(map) = body.as_object_mut()
        {
            map.insert("detail".to_string(), detail);
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<crate::data::SqliteError> for ApiError {
    fn from(e: crate::data::SqliteError) -> Self {
        tracing::error!(error = %e, "Database error in API handler");
        Self::internal("storage error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_carries_code() {
        let err = ApiError::new(StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED", "over quota");
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code, "QUOTA_EXCEEDED");
    }

    #[test]
    fn test_into_response_status() {
        let err = ApiError::not_found("nope");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
