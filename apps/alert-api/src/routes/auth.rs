use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::password;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::user::{NewUser, UserResponse, UserRole};
use crate::AppState;

use super::users::{ensure_unique, validate_account};

/// Roles an account may request for itself.
const SELF_SIGNUP_ROLES: &[UserRole] = &[UserRole::Faculty, UserRole::Student];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/signup", post(signup))
}

// =========================================================================
// POST /api/auth/login
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserResponse,
}

/// Exchange credentials for an access token.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials or deactivated account", body = ApiErrorBody),
        (status = 403, description = "Account awaiting approval", body = ApiErrorBody),
    ),
)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .db
        .lock()
        .user_by_username(body.username.trim())
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !user.is_active {
        return Err(ApiError::unauthorized(
            "Account is deactivated. Contact administrator.",
        ));
    }
    if !user.is_approved {
        return Err(ApiError::forbidden(
            "Your account is created but still awaiting admin approval.",
        ));
    }

    password::verify_password(&body.password, &user.password_hash)?;

    let access_token = state.tokens.issue(&user)?;

    let user = {
        let mut tables = state.db.lock();
        let stored = tables
            .user_mut(user.id)
            .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;
        stored.last_login_at = Some(Utc::now());
        UserResponse::from(&*stored)
    };

    tracing::info!(user_id = user.id, role = %user.role, "user logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: state.tokens.ttl_secs(),
        user,
    }))
}

// =========================================================================
// POST /api/auth/signup
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    /// `faculty` or `student`.
    pub role: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignupResponse {
    /// Always `pending_approval`.
    pub status: String,
    pub message: String,
    pub user_id: i64,
}

/// Register a faculty or student account. It cannot log in until a super
/// admin approves it.
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    tag = "Auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created, awaiting approval", body = SignupResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 409, description = "Username or email taken", body = ApiErrorBody),
    ),
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let mut errors: Vec<FieldError> = Vec::new();
    let (username, email) =
        validate_account(&body.username, &body.password, body.email.as_deref(), &mut errors);
    let role = UserRole::parse(body.role.trim()).filter(|r| SELF_SIGNUP_ROLES.contains(r));
    if role.is_none() {
        errors.push(FieldError::new(
            "role",
            "Self-signup is only allowed for: faculty, student",
        ));
    }

    let role = match role {
        Some(role) if errors.is_empty() => role,
        _ => return Err(ApiError::validation(errors)),
    };

    let password_hash = password::hash_password(&body.password)?;

    let user = {
        let mut tables = state.db.lock();
        ensure_unique(&tables, &username, email.as_deref())?;
        tables.insert_user(NewUser {
            username,
            email,
            password_hash,
            role,
            full_name: body.full_name.unwrap_or_default().trim().to_string(),
            is_active: true,
            is_approved: false,
        })
    };

    tracing::info!(user_id = user.id, role = %user.role, "signup awaiting approval");

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            status: "pending_approval".to_string(),
            message: "Your account has been created and is awaiting approval by the administrator."
                .to_string(),
            user_id: user.id,
        }),
    ))
}
