use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::events::{AcknowledgmentUpdate, Event, UpdateAction};
use crate::models::acknowledgment::Acknowledgment;
use crate::AppState;

use super::StatusResponse;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/acknowledgments/alert/{alert_id}",
            post(acknowledge).delete(unacknowledge),
        )
        .route("/acknowledgments/alert/{alert_id}/stats", get(acknowledgment_stats))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AcknowledgeResponse {
    /// `acknowledged`, or `already_acknowledged` when nothing changed.
    pub status: String,
    pub acknowledgment: Acknowledgment,
}

// =========================================================================
// POST /api/acknowledgments/alert/{alert_id}
// =========================================================================

#[utoipa::path(
    post,
    path = "/api/acknowledgments/alert/{alert_id}",
    tag = "Acknowledgments",
    security(("bearer" = [])),
    params(
        ("alert_id" = i64, Path, description = "Alert ID"),
    ),
    responses(
        (status = 200, description = "Alert acknowledged", body = AcknowledgeResponse),
        (status = 404, description = "Alert not found", body = ApiErrorBody),
    ),
)]
pub async fn acknowledge(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(alert_id): Path<i64>,
) -> Result<Json<AcknowledgeResponse>, ApiError> {
    let mut tables = state.db.lock();
    if tables.alert(alert_id).is_none() {
        return Err(ApiError::not_found("Alert not found"));
    }

    if let Some(existing) = tables.acknowledgment(alert_id, auth.user_id) {
        return Ok(Json(AcknowledgeResponse {
            status: "already_acknowledged".to_string(),
            acknowledgment: existing.clone(),
        }));
    }

    let acknowledgment = tables.insert_acknowledgment(alert_id, auth.user_id);
    state.dispatcher.publish(&Event::AcknowledgmentUpdate {
        acknowledgment: AcknowledgmentUpdate {
            alert_id,
            count: tables.acknowledgment_count(alert_id),
            user_id: auth.user_id,
            action: UpdateAction::Add,
        },
    });
    drop(tables);

    Ok(Json(AcknowledgeResponse {
        status: "acknowledged".to_string(),
        acknowledgment,
    }))
}

// =========================================================================
// DELETE /api/acknowledgments/alert/{alert_id}
// =========================================================================

/// Withdraw the caller's acknowledgment. No live event is sent.
#[utoipa::path(
    delete,
    path = "/api/acknowledgments/alert/{alert_id}",
    tag = "Acknowledgments",
    security(("bearer" = [])),
    params(
        ("alert_id" = i64, Path, description = "Alert ID"),
    ),
    responses(
        (status = 200, description = "Acknowledgment withdrawn", body = StatusResponse),
        (status = 404, description = "Acknowledgment not found", body = ApiErrorBody),
    ),
)]
pub async fn unacknowledge(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(alert_id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .db
        .lock()
        .remove_acknowledgment(alert_id, auth.user_id)
        .ok_or_else(|| ApiError::not_found("Acknowledgment not found"))?;

    Ok(Json(StatusResponse::new("unacknowledged")))
}

// =========================================================================
// GET /api/acknowledgments/alert/{alert_id}/stats
// =========================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct AcknowledgedBy {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub acknowledged_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AcknowledgmentStatsResponse {
    pub alert_id: i64,
    pub total_users: usize,
    pub acknowledged_count: usize,
    /// Percentage of all users, rounded to two decimals.
    pub acknowledgment_rate: f64,
    pub user_list: Vec<AcknowledgedBy>,
}

#[utoipa::path(
    get,
    path = "/api/acknowledgments/alert/{alert_id}/stats",
    tag = "Acknowledgments",
    security(("bearer" = [])),
    params(
        ("alert_id" = i64, Path, description = "Alert ID"),
    ),
    responses(
        (status = 200, description = "Who has acknowledged the alert", body = AcknowledgmentStatsResponse),
        (status = 404, description = "Alert not found", body = ApiErrorBody),
    ),
)]
pub async fn acknowledgment_stats(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(alert_id): Path<i64>,
) -> Result<Json<AcknowledgmentStatsResponse>, ApiError> {
    let tables = state.db.lock();
    if tables.alert(alert_id).is_none() {
        return Err(ApiError::not_found("Alert not found"));
    }

    let mut user_list: Vec<AcknowledgedBy> = tables
        .acknowledgments_for(alert_id)
        .filter_map(|ack| {
            let user = tables.user(ack.user_id)?;
            Some(AcknowledgedBy {
                id: user.id,
                username: user.username.clone(),
                full_name: user.display_name().to_string(),
                acknowledged_at: ack.acknowledged_at,
            })
        })
        .collect();
    user_list.sort_by_key(|u| u.acknowledged_at);

    let total_users = tables.user_count();
    let acknowledged_count = tables.acknowledgment_count(alert_id);
    let acknowledgment_rate = if total_users == 0 {
        0.0
    } else {
        let rate = acknowledged_count as f64 / total_users as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    };

    Ok(Json(AcknowledgmentStatsResponse {
        alert_id,
        total_users,
        acknowledged_count,
        acknowledgment_rate,
        user_list,
    }))
}
