//! Alert endpoints. Every mutation publishes its live event while the table
//! lock is still held, so connected recipients see events in commit order.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::middleware::{require_role, AuthUser};
use crate::db::memory::Tables;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::events::Event;
use crate::gateway::targeting::{self, TargetRoles};
use crate::models::alert::{Alert, AlertCategory, AlertPriority, AlertResponse, NewAlert};
use crate::models::user::UserRole;
use crate::AppState;

use super::StatusResponse;

const SENDERS: &[UserRole] = &[
    UserRole::SuperAdmin,
    UserRole::CollegeAdmin,
    UserRole::Faculty,
];
const ADMINS: &[UserRole] = &[UserRole::SuperAdmin, UserRole::CollegeAdmin];

/// Hours after which info and reminder alerts leave the default listing.
const LOW_PRIORITY_TTL_HOURS: i64 = 24;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/alerts", post(create_alert).get(list_alerts))
        .route("/alerts/history", get(alert_history))
        .route("/alerts/bulk-delete", post(bulk_delete))
        .route("/alerts/bulk-restore", post(bulk_restore))
        .route("/alerts/{alert_id}", delete(delete_alert))
        .route("/alerts/{alert_id}/permanent", delete(purge_alert))
        .route("/alerts/{alert_id}/view", post(mark_viewed))
}

/// Build the API view of `alert` from the current tables.
pub(crate) fn alert_response(tables: &Tables, alert: &Alert) -> AlertResponse {
    let sender_name = tables
        .user(alert.sender_id)
        .map(|u| u.display_name().to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    AlertResponse::new(
        alert,
        sender_name,
        tables.reaction_counts(alert.id),
        tables.acknowledgment_count(alert.id),
    )
}

// =========================================================================
// POST /api/alerts
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAlertRequest {
    pub title: String,
    pub message: String,
    pub priority: AlertPriority,
    #[serde(default)]
    pub category: AlertCategory,
    /// Role names to notify. Omitted or empty means everyone.
    #[serde(default)]
    pub target_roles: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/api/alerts",
    tag = "Alerts",
    security(("bearer" = [])),
    request_body = CreateAlertRequest,
    responses(
        (status = 201, description = "Alert created and broadcast", body = AlertResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Sender may not address these roles", body = ApiErrorBody),
    ),
)]
pub async fn create_alert(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateAlertRequest>,
) -> Result<(StatusCode, Json<AlertResponse>), ApiError> {
    require_role(&auth, SENDERS)?;

    let mut errors: Vec<FieldError> = Vec::new();
    let title = body.title.trim().to_string();
    if title.is_empty() || title.chars().count() > 200 {
        errors.push(FieldError::new("title", "Title must be 1-200 characters"));
    }
    let message = body.message.trim().to_string();
    if message.is_empty() {
        errors.push(FieldError::new("message", "Message is required"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let targets = TargetRoles::new(&body.target_roles);
    targeting::validate_sender_scope(auth.role, &targets).map_err(ApiError::forbidden)?;

    let target_roles = if body.target_roles.is_empty() {
        vec![targeting::ALL.to_string()]
    } else {
        body.target_roles
    };

    let mut tables = state.db.lock();
    let alert = tables.insert_alert(NewAlert {
        title,
        message,
        priority: body.priority,
        category: body.category,
        sender_id: auth.user_id,
        target_roles,
    });
    let response = alert_response(&tables, &alert);

    let report = state.dispatcher.publish(&Event::NewAlert {
        alert: response.clone(),
    });
    drop(tables);

    tracing::info!(
        alert_id = alert.id,
        sender_id = auth.user_id,
        priority = ?alert.priority,
        delivered = report.delivered,
        "alert created"
    );

    Ok((StatusCode::CREATED, Json(response)))
}

// =========================================================================
// GET /api/alerts
// =========================================================================

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListAlertsParams {
    pub skip: Option<usize>,
    /// Page size (1-200, default 50).
    pub limit: Option<usize>,
    pub priority: Option<String>,
    pub category: Option<String>,
    /// Case-insensitive match on title or message.
    pub search: Option<String>,
    pub sender_id: Option<i64>,
    /// Only alerts created at or after this instant (RFC 3339, `YYYY-MM-DDTHH:MM:SS`, or `YYYY-MM-DD`).
    pub start_date: Option<String>,
    /// Only alerts created at or before this instant. A bare date means midnight.
    pub end_date: Option<String>,
    /// Include info and reminder alerts older than a day.
    #[serde(default)]
    pub include_expired: bool,
}

#[utoipa::path(
    get,
    path = "/api/alerts",
    tag = "Alerts",
    security(("bearer" = [])),
    params(ListAlertsParams),
    responses(
        (status = 200, description = "Active alerts visible to the caller, newest first", body = Vec<AlertResponse>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<ListAlertsParams>,
) -> Result<Json<Vec<AlertResponse>>, ApiError> {
    // Unknown filter values are ignored rather than rejected.
    let priority = params.priority.as_deref().and_then(AlertPriority::parse);
    let category = params.category.as_deref().and_then(AlertCategory::parse);
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);
    let start = params.start_date.as_deref().and_then(parse_date_bound);
    let end = params.end_date.as_deref().and_then(parse_date_bound);
    let cutoff = Utc::now() - Duration::hours(LOW_PRIORITY_TTL_HOURS);
    let limit = params.limit.unwrap_or(50).clamp(1, 200);

    let tables = state.db.lock();
    let alerts: Vec<AlertResponse> = tables
        .alerts_newest_first()
        .filter(|a| a.is_active)
        .filter(|a| params.include_expired || !a.priority.expires() || a.created_at >= cutoff)
        .filter(|a| targeting::can_view(auth.user_id, auth.role, a))
        .filter(|a| priority.is_none_or(|p| a.priority == p))
        .filter(|a| category.is_none_or(|c| a.category == c))
        .filter(|a| params.sender_id.is_none_or(|id| a.sender_id == id))
        .filter(|a| start.is_none_or(|t| a.created_at >= t))
        .filter(|a| end.is_none_or(|t| a.created_at <= t))
        .filter(|a| {
            search.as_deref().is_none_or(|q| {
                a.title.to_lowercase().contains(q) || a.message.to_lowercase().contains(q)
            })
        })
        .skip(params.skip.unwrap_or(0))
        .take(limit)
        .map(|a| alert_response(&tables, a))
        .collect();

    Ok(Json(alerts))
}

/// Parse a date filter. Naive values are taken as UTC; unparseable input
/// yields `None` and the filter is skipped.
fn parse_date_bound(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

// =========================================================================
// GET /api/alerts/history
// =========================================================================

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AlertHistoryParams {
    pub skip: Option<usize>,
    /// Page size (1-200, default 100).
    pub limit: Option<usize>,
    pub priority: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/alerts/history",
    tag = "Alerts",
    security(("bearer" = [])),
    params(AlertHistoryParams),
    responses(
        (status = 200, description = "All alerts visible to the caller, including deleted ones", body = Vec<AlertResponse>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn alert_history(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<AlertHistoryParams>,
) -> Result<Json<Vec<AlertResponse>>, ApiError> {
    let priority = params.priority.as_deref().and_then(AlertPriority::parse);
    let limit = params.limit.unwrap_or(100).clamp(1, 200);

    let tables = state.db.lock();
    let alerts: Vec<AlertResponse> = tables
        .alerts_newest_first()
        .filter(|a| targeting::can_view(auth.user_id, auth.role, a))
        .filter(|a| priority.is_none_or(|p| a.priority == p))
        .skip(params.skip.unwrap_or(0))
        .take(limit)
        .map(|a| alert_response(&tables, a))
        .collect();

    Ok(Json(alerts))
}

// =========================================================================
// POST /api/alerts/{alert_id}/view
// =========================================================================

#[utoipa::path(
    post,
    path = "/api/alerts/{alert_id}/view",
    tag = "Alerts",
    security(("bearer" = [])),
    params(
        ("alert_id" = i64, Path, description = "Alert ID"),
    ),
    responses(
        (status = 200, description = "View recorded", body = StatusResponse),
        (status = 404, description = "Alert not found", body = ApiErrorBody),
    ),
)]
pub async fn mark_viewed(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(alert_id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut tables = state.db.lock();
    if tables.alert(alert_id).is_none() {
        return Err(ApiError::not_found("Alert not found"));
    }
    tables.record_view(alert_id, auth.user_id);
    Ok(Json(StatusResponse::new("success")))
}

// =========================================================================
// DELETE /api/alerts/{alert_id}
// =========================================================================

#[utoipa::path(
    delete,
    path = "/api/alerts/{alert_id}",
    tag = "Alerts",
    security(("bearer" = [])),
    params(
        ("alert_id" = i64, Path, description = "Alert ID"),
    ),
    responses(
        (status = 200, description = "Alert deactivated", body = StatusResponse),
        (status = 403, description = "Insufficient permissions", body = ApiErrorBody),
        (status = 404, description = "Alert not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_alert(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(alert_id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    require_role(&auth, ADMINS)?;

    let mut tables = state.db.lock();
    let alert = tables
        .alert_mut(alert_id)
        .ok_or_else(|| ApiError::not_found("Alert not found"))?;
    alert.is_active = false;
    state.dispatcher.publish(&Event::AlertDeleted { alert_id });
    drop(tables);

    tracing::info!(alert_id, deleted_by = auth.user_id, "alert deactivated");
    Ok(Json(StatusResponse::new("success")))
}

// =========================================================================
// DELETE /api/alerts/{alert_id}/permanent
// =========================================================================

#[utoipa::path(
    delete,
    path = "/api/alerts/{alert_id}/permanent",
    tag = "Alerts",
    security(("bearer" = [])),
    params(
        ("alert_id" = i64, Path, description = "Alert ID"),
    ),
    responses(
        (status = 200, description = "Alert and its reactions, views and acknowledgments removed", body = StatusResponse),
        (status = 403, description = "Insufficient permissions", body = ApiErrorBody),
        (status = 404, description = "Alert not found", body = ApiErrorBody),
    ),
)]
pub async fn purge_alert(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(alert_id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    require_role(&auth, &[UserRole::SuperAdmin])?;

    let mut tables = state.db.lock();
    tables
        .purge_alert(alert_id)
        .ok_or_else(|| ApiError::not_found("Alert not found"))?;
    state.dispatcher.publish(&Event::AlertDeleted { alert_id });
    drop(tables);

    tracing::info!(alert_id, deleted_by = auth.user_id, "alert permanently deleted");
    Ok(Json(
        StatusResponse::new("success").with_message("Alert permanently deleted"),
    ))
}

// =========================================================================
// POST /api/alerts/bulk-delete, /api/alerts/bulk-restore
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkAlertsRequest {
    pub alert_ids: Vec<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkAlertsResponse {
    /// Alerts whose state actually changed.
    pub deleted_ids: Vec<i64>,
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/api/alerts/bulk-delete",
    tag = "Alerts",
    security(("bearer" = [])),
    request_body = BulkAlertsRequest,
    responses(
        (status = 200, description = "Active alerts among the ids were deactivated", body = BulkAlertsResponse),
        (status = 403, description = "Insufficient permissions", body = ApiErrorBody),
    ),
)]
pub async fn bulk_delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<BulkAlertsRequest>,
) -> Result<Json<BulkAlertsResponse>, ApiError> {
    require_role(&auth, ADMINS)?;

    let mut deleted_ids = Vec::new();
    let mut tables = state.db.lock();
    for alert_id in body.alert_ids {
        if let Some(alert) = tables.alert_mut(alert_id).filter(|a| a.is_active) {
            alert.is_active = false;
            deleted_ids.push(alert_id);
            state.dispatcher.publish(&Event::AlertDeleted { alert_id });
        }
    }
    drop(tables);

    tracing::info!(count = deleted_ids.len(), deleted_by = auth.user_id, "alerts bulk deleted");
    Ok(Json(BulkAlertsResponse {
        message: format!("Successfully deleted {} alert(s)", deleted_ids.len()),
        deleted_ids,
    }))
}

#[utoipa::path(
    post,
    path = "/api/alerts/bulk-restore",
    tag = "Alerts",
    security(("bearer" = [])),
    request_body = BulkAlertsRequest,
    responses(
        (status = 200, description = "Inactive alerts among the ids were reactivated", body = BulkAlertsResponse),
        (status = 403, description = "Insufficient permissions", body = ApiErrorBody),
    ),
)]
pub async fn bulk_restore(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<BulkAlertsRequest>,
) -> Result<Json<BulkAlertsResponse>, ApiError> {
    require_role(&auth, ADMINS)?;

    let mut restored = Vec::new();
    {
        let mut tables = state.db.lock();
        for alert_id in body.alert_ids {
            if let Some(alert) = tables.alert_mut(alert_id).filter(|a| !a.is_active) {
                alert.is_active = true;
                restored.push(alert_id);
            }
        }
    }

    Ok(Json(BulkAlertsResponse {
        message: format!("Successfully restored {} alert(s)", restored.len()),
        deleted_ids: restored,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_bounds_accept_common_formats() {
        let midnight = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_date_bound("2025-03-01"), Some(midnight));
        assert_eq!(parse_date_bound("2025-03-01T00:00:00"), Some(midnight));
        assert_eq!(parse_date_bound("2025-03-01T02:00:00+02:00"), Some(midnight));
        assert_eq!(parse_date_bound("2025-03-01T00:00:00.000Z"), Some(midnight));
    }

    #[test]
    fn date_bounds_ignore_garbage() {
        assert_eq!(parse_date_bound("yesterday"), None);
        assert_eq!(parse_date_bound("2025-13-01"), None);
        assert_eq!(parse_date_bound(""), None);
    }
}
