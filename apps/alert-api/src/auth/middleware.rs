//! Bearer token extraction.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::ApiError;
use crate::models::user::UserRole;
use crate::AppState;

/// Authenticated user extracted from the `Authorization: Bearer <jwt>` header.
///
/// The role is read from the user store, not the token, so role changes apply
/// to HTTP requests immediately.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub role: UserRole,
}

/// Rejection returned when the bearer token is missing or invalid.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": self.message
            }
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError {
                message: "Missing Authorization header",
            })?;

        let token = header.strip_prefix("Bearer ").ok_or(AuthError {
            message: "Invalid Authorization header format",
        })?;

        let claims = state.tokens.decode(token).map_err(|e| {
            tracing::debug!(?e, "bearer token rejected");
            AuthError {
                message: "Could not validate credentials",
            }
        })?;

        let user = state
            .users
            .find_user(claims.user_id)
            .await
            .map_err(|_| AuthError {
                message: "User lookup failed",
            })?
            .ok_or(AuthError {
                message: "User not found",
            })?;

        if !user.is_active {
            return Err(AuthError {
                message: "Account is deactivated",
            });
        }

        Ok(AuthUser {
            user_id: user.id,
            role: user.role,
        })
    }
}

/// Reject with 403 unless `user` holds one of `allowed`.
pub fn require_role(user: &AuthUser, allowed: &[UserRole]) -> Result<(), ApiError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Insufficient permissions"))
    }
}
