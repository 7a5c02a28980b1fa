//! Approval queue for self-registered accounts. Super admins only.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::middleware::{require_role, AuthUser};
use crate::db::memory::Tables;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::user::{User, UserRole};
use crate::AppState;

const APPROVERS: &[UserRole] = &[UserRole::SuperAdmin];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/pending-users", get(list_pending))
        .route("/admin/pending-users/count", get(pending_count))
        .route("/admin/pending-users/{user_id}", delete(delete_pending))
        .route("/admin/pending-users/{user_id}/approve", post(approve))
        .route("/admin/pending-users/{user_id}/reject", post(reject))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PendingUserResponse {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: UserRole,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PendingUserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            full_name: user.display_name().to_string(),
            role: user.role,
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PendingCountResponse {
    pub pending_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApprovalResponse {
    /// `approved`, `rejected`, or `deleted`.
    pub status: String,
    pub message: String,
    pub user_id: i64,
}

/// The unapproved account `user_id`, or 404/400.
fn pending_user<'a>(
    tables: &'a mut Tables,
    user_id: i64,
    already: &str,
) -> Result<&'a mut User, ApiError> {
    let user = tables
        .user_mut(user_id)
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if user.is_approved {
        return Err(ApiError::bad_request(already));
    }
    Ok(user)
}

// =========================================================================
// GET /api/admin/pending-users
// =========================================================================

#[utoipa::path(
    get,
    path = "/api/admin/pending-users",
    tag = "Pending users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Accounts awaiting approval, newest first", body = Vec<PendingUserResponse>),
        (status = 403, description = "Insufficient permissions", body = ApiErrorBody),
    ),
)]
pub async fn list_pending(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<PendingUserResponse>>, ApiError> {
    require_role(&auth, APPROVERS)?;
    let tables = state.db.lock();
    Ok(Json(
        tables.pending_users().map(PendingUserResponse::from).collect(),
    ))
}

// =========================================================================
// GET /api/admin/pending-users/count
// =========================================================================

#[utoipa::path(
    get,
    path = "/api/admin/pending-users/count",
    tag = "Pending users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Number of accounts awaiting approval", body = PendingCountResponse),
        (status = 403, description = "Insufficient permissions", body = ApiErrorBody),
    ),
)]
pub async fn pending_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PendingCountResponse>, ApiError> {
    require_role(&auth, APPROVERS)?;
    let pending_count = state.db.lock().pending_users().count();
    Ok(Json(PendingCountResponse { pending_count }))
}

// =========================================================================
// POST /api/admin/pending-users/{user_id}/approve
// =========================================================================

#[utoipa::path(
    post,
    path = "/api/admin/pending-users/{user_id}/approve",
    tag = "Pending users",
    security(("bearer" = [])),
    params(
        ("user_id" = i64, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Account approved and activated", body = ApprovalResponse),
        (status = 400, description = "Already approved", body = ApiErrorBody),
        (status = 403, description = "Insufficient permissions", body = ApiErrorBody),
        (status = 404, description = "User not found", body = ApiErrorBody),
    ),
)]
pub async fn approve(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    require_role(&auth, APPROVERS)?;

    let mut tables = state.db.lock();
    let user = pending_user(&mut tables, user_id, "User is already approved")?;
    user.is_approved = true;
    user.is_active = true;
    let username = user.username.clone();
    drop(tables);

    tracing::info!(approved_by = auth.user_id, user_id, "user approved");

    Ok(Json(ApprovalResponse {
        status: "approved".to_string(),
        message: format!("User '{username}' has been approved and can now log in."),
        user_id,
    }))
}

// =========================================================================
// POST /api/admin/pending-users/{user_id}/reject
// =========================================================================

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RejectParams {
    /// Delete the account instead of deactivating it.
    #[serde(default)]
    pub permanent: bool,
}

#[utoipa::path(
    post,
    path = "/api/admin/pending-users/{user_id}/reject",
    tag = "Pending users",
    security(("bearer" = [])),
    params(
        ("user_id" = i64, Path, description = "User ID"),
        RejectParams,
    ),
    responses(
        (status = 200, description = "Account rejected", body = ApprovalResponse),
        (status = 400, description = "Account was already approved", body = ApiErrorBody),
        (status = 403, description = "Insufficient permissions", body = ApiErrorBody),
        (status = 404, description = "User not found", body = ApiErrorBody),
    ),
)]
pub async fn reject(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
    Query(params): Query<RejectParams>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    require_role(&auth, APPROVERS)?;

    let mut tables = state.db.lock();
    let user = pending_user(
        &mut tables,
        user_id,
        "Cannot reject an already approved user. Deactivate it instead.",
    )?;
    let username = user.username.clone();
    let message = if params.permanent {
        tables.remove_user(user_id);
        format!("User '{username}' has been permanently rejected and deleted.")
    } else {
        user.is_active = false;
        format!("User '{username}' has been rejected and deactivated.")
    };
    drop(tables);

    tracing::info!(
        rejected_by = auth.user_id,
        user_id,
        permanent = params.permanent,
        "user rejected"
    );

    Ok(Json(ApprovalResponse {
        status: "rejected".to_string(),
        message,
        user_id,
    }))
}

// =========================================================================
// DELETE /api/admin/pending-users/{user_id}
// =========================================================================

#[utoipa::path(
    delete,
    path = "/api/admin/pending-users/{user_id}",
    tag = "Pending users",
    security(("bearer" = [])),
    params(
        ("user_id" = i64, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Pending account deleted", body = ApprovalResponse),
        (status = 400, description = "Account was already approved", body = ApiErrorBody),
        (status = 403, description = "Insufficient permissions", body = ApiErrorBody),
        (status = 404, description = "User not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_pending(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    require_role(&auth, APPROVERS)?;

    let mut tables = state.db.lock();
    let username = pending_user(
        &mut tables,
        user_id,
        "Cannot delete an approved user through the approval queue",
    )?
    .username
    .clone();
    tables.remove_user(user_id);
    drop(tables);

    tracing::info!(deleted_by = auth.user_id, user_id, "pending user deleted");

    Ok(Json(ApprovalResponse {
        status: "deleted".to_string(),
        message: format!("Pending user '{username}' has been deleted."),
        user_id,
    }))
}
