//! User administration endpoints.
//!
//! Changing a user's role or active flag here does not touch live connections:
//! a connected recipient keeps the role it registered with until it reconnects.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::middleware::{require_role, AuthUser};
use crate::auth::password::hash_password;
use crate::db::memory::Tables;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::user::{NewUser, UserResponse, UserRole};
use crate::AppState;

const ADMINS: &[UserRole] = &[UserRole::SuperAdmin, UserRole::CollegeAdmin];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/me", get(get_me))
        .route("/users/{user_id}", patch(update_user))
}

// =========================================================================
// POST /api/users
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    security(("bearer" = [])),
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Insufficient permissions", body = ApiErrorBody),
        (status = 409, description = "Username or email taken", body = ApiErrorBody),
    ),
)]
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    require_role(&auth, ADMINS)?;

    // --- Validation ---
    let mut errors: Vec<FieldError> = Vec::new();
    let (username, email) =
        validate_account(&body.username, &body.password, body.email.as_deref(), &mut errors);
    let role = UserRole::parse(body.role.trim());
    if role.is_none() {
        errors.push(FieldError::new("role", format!("Invalid role: {}", body.role)));
    }

    let role = match role {
        Some(role) if errors.is_empty() => role,
        _ => return Err(ApiError::validation(errors)),
    };

    if auth.role == UserRole::CollegeAdmin && role == UserRole::SuperAdmin {
        return Err(ApiError::forbidden(
            "College Admins cannot create Super Admin accounts",
        ));
    }

    let password_hash = hash_password(&body.password)?;

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
            is_approved: true,
        })
    };

    tracing::info!(
        created_by = auth.user_id,
        user_id = user.id,
        role = %user.role,
        "user created"
    );

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// Check the fields every account-creation path shares. Problems are appended
/// to `errors`; returns the trimmed username and the email, if one was given.
pub(crate) fn validate_account(
    username: &str,
    password: &str,
    email: Option<&str>,
    errors: &mut Vec<FieldError>,
) -> (String, Option<String>) {
    let username = username.trim().to_string();
    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        errors.push(FieldError::new(
            "username",
            "Username must be 3-50 characters",
        ));
    }
    if password.chars().count() < 8 {
        errors.push(FieldError::new(
            "password",
            "Password must be at least 8 characters",
        ));
    }
    let email = email
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string);
    if let Some(ref email) = email {
        if !email.contains('@') {
            errors.push(FieldError::new("email", "Email address is invalid"));
        }
    }
    (username, email)
}

/// 409 if the username or email already belongs to someone.
pub(crate) fn ensure_unique(
    tables: &Tables,
    username: &str,
    email: Option<&str>,
) -> Result<(), ApiError> {
    if tables.user_by_username(username).is_some() {
        return Err(ApiError::conflict("Username already exists"));
    }
    if email.is_some_and(|e| tables.email_taken(e)) {
        return Err(ApiError::conflict("Email already exists"));
    }
    Ok(())
}

// =========================================================================
// GET /api/users/me
// =========================================================================

#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The authenticated user", body = UserResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let tables = state.db.lock();
    let user = tables
        .user(auth.user_id)
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(user)))
}

// =========================================================================
// PATCH /api/users/{user_id}
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/api/users/{user_id}",
    tag = "Users",
    security(("bearer" = [])),
    params(
        ("user_id" = i64, Path, description = "User ID"),
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Insufficient permissions", body = ApiErrorBody),
        (status = 404, description = "User not found", body = ApiErrorBody),
    ),
)]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    require_role(&auth, ADMINS)?;

    let role = match body.role.as_deref() {
        Some(name) => Some(UserRole::parse(name.trim()).ok_or_else(|| {
            ApiError::validation(vec![FieldError::new(
                "role",
                format!("Invalid role: {name}"),
            )])
        })?),
        None => None,
    };

    let mut tables = state.db.lock();
    let user = tables
        .user_mut(user_id)
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if auth.role == UserRole::CollegeAdmin
        && (user.role == UserRole::SuperAdmin || role == Some(UserRole::SuperAdmin))
    {
        return Err(ApiError::forbidden(
            "College Admins cannot manage Super Admin accounts",
        ));
    }

    if let Some(role) = role {
        user.role = role;
    }
    if let Some(is_active) = body.is_active {
        user.is_active = is_active;
    }
    if let Some(full_name) = body.full_name {
        user.full_name = full_name.trim().to_string();
    }

    tracing::info!(
        updated_by = auth.user_id,
        user_id,
        role = %user.role,
        is_active = user.is_active,
        "user updated"
    );

    Ok(Json(UserResponse::from(&*user)))
}
