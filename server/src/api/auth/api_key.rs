//! API key authentication for SDK ingestion endpoints
//!
//! Keys arrive in the `X-API-Key` header. The format check runs before any
//! storage lookup; resolution goes through the short-TTL positive/negative
//! cache in the repository. The validated key (with its project) is injected
//! into the request extensions for handlers.

use std::fmt;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::core::constants::API_KEY_TOUCH_DEBOUNCE_SECS;
use crate::data::cache::CacheService;
use crate::data::sqlite::SqliteService;
use crate::data::sqlite::repositories::api_keys;
use crate::data::types::ApiKeyValidation;
use crate::utils::api_key::{display_prefix, hash_api_key, is_api_key_format};

/// Header carrying the SDK key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// API key authentication error
#[derive(Debug)]
pub enum ApiKeyAuthError {
    /// No X-API-Key header provided
    Missing,
    /// Key does not have the expected shape
    InvalidFormat,
    /// Key doesn't exist (or was deleted)
    InvalidKey,
}

impl fmt::Display for ApiKeyAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "API key required"),
            Self::InvalidFormat => write!(f, "Invalid API key format"),
            Self::InvalidKey => write!(f, "Invalid API key"),
        }
    }
}

impl IntoResponse for ApiKeyAuthError {
    fn into_response(self) -> Response {
        let code = match self {
            Self::Missing => "MISSING_API_KEY",
            Self::InvalidFormat => "INVALID_API_KEY_FORMAT",
            Self::InvalidKey => "INVALID_API_KEY",
        };
        let body = json!({
            "error": "unauthorized",
            "code": code,
            "message": self.to_string(),
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// State for the ingestion auth middleware
#[derive(Clone)]
pub struct IngestAuthState {
    pub database: Arc<SqliteService>,
    pub cache: Arc<CacheService>,
    pub api_key_secret: Vec<u8>,
}

/// Validated key context injected into request extensions
#[derive(Debug, Clone)]
pub struct AuthedKey(pub ApiKeyValidation);

/// Ingestion auth middleware
pub async fn ingest_auth_middleware(
    State(state): State<IngestAuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiKeyAuthError> {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(ApiKeyAuthError::Missing)?;

    // Cheap shape check before any storage lookup
    if !is_api_key_format(api_key) {
        tracing::warn!(prefix = display_prefix(api_key), "Invalid API key format");
        return Err(ApiKeyAuthError::InvalidFormat);
    }

    let key_hash = hash_api_key(api_key, &state.api_key_secret);
    let validation =
        api_keys::get_by_hash(state.database.pool(), Some(&state.cache), &key_hash)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "API key lookup failed");
                ApiKeyAuthError::InvalidKey
            })?
            .ok_or_else(|| {
                tracing::warn!(prefix = display_prefix(api_key), "Unknown API key");
                ApiKeyAuthError::InvalidKey
            })?;

    touch_if_needed(Arc::clone(&state.database), &validation);

    tracing::debug!(
        project_id = %validation.project_id,
        key_id = display_prefix(&validation.key_id),
        "API key validated"
    );

    request.extensions_mut().insert(AuthedKey(validation));
    Ok(next.run(request).await)
}

/// Update last_used_at off the request path if not recently touched
fn touch_if_needed(database: Arc<SqliteService>, validation: &ApiKeyValidation) {
    let should_touch = validation
        .last_used_at
        .map(|t| {
            chrono::Utc::now().timestamp_millis() - t > (API_KEY_TOUCH_DEBOUNCE_SECS as i64) * 1000
        })
        .unwrap_or(true);

    if should_touch {
        let key_id = validation.key_id.clone();
        tokio::spawn(async move {
            if let Err(e) =
                api_keys::touch_api_key(database.pool(), &key_id, API_KEY_TOUCH_DEBOUNCE_SECS).await
            {
                tracing::warn!(key_id = %key_id, error = %e, "Failed to update API key last_used_at");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_codes() {
        let response = ApiKeyAuthError::Missing.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = ApiKeyAuthError::InvalidFormat.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = ApiKeyAuthError::InvalidKey.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(ApiKeyAuthError::Missing.to_string(), "API key required");
        assert_eq!(
            ApiKeyAuthError::InvalidFormat.to_string(),
            "Invalid API key format"
        );
        assert_eq!(ApiKeyAuthError::InvalidKey.to_string(), "Invalid API key");
    }
}
