//! Operator authentication for the admin/maintenance surface
//!
//! Guarded by a separate operator bearer token, never by tenant API keys.
//! When no token is configured the whole admin surface answers 404, so a
//! misconfigured deployment does not expose maintenance endpoints.

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use subtle::ConstantTimeEq;

/// State for the admin auth middleware
#[derive(Clone)]
pub struct AdminAuthState {
    /// Configured operator token; None disables the surface entirely
    pub admin_token: Option<String>,
}

/// Admin auth error
#[derive(Debug)]
pub enum AdminAuthError {
    /// Surface disabled (no operator token configured)
    Disabled,
    /// Missing or wrong bearer token
    Unauthorized,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Disabled => StatusCode::NOT_FOUND.into_response(),
            Self::Unauthorized => {
                let body = json!({
                    "error": "unauthorized",
                    "code": "INVALID_OPERATOR_TOKEN",
                    "message": "Valid operator token required",
                });
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
        }
    }
}

/// Admin surface auth middleware
pub async fn admin_auth_middleware(
    State(state): State<AdminAuthState>,
    request: Request,
    next: Next,
) -> Result<Response, AdminAuthError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(AdminAuthError::Disabled);
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AdminAuthError::Unauthorized)?;

    // Constant-time compare; length mismatch short-circuits but leaks only
    // the token length
    if provided.len() != expected.len()
        || provided.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() != 1
    {
        tracing::warn!("Admin auth failed");
        return Err(AdminAuthError::Unauthorized);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_surface_is_404() {
        let response = AdminAuthError::Disabled.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_unauthorized_is_401() {
        let response = AdminAuthError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
