use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::events::{Event, ReactionUpdate, UpdateAction};
use crate::models::reaction::Reaction;
use crate::AppState;

use super::StatusResponse;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reactions", post(add_reaction))
        .route("/reactions/{reaction_id}", delete(remove_reaction))
        .route("/reactions/alert/{alert_id}", get(list_reactions))
}

// =========================================================================
// POST /api/reactions
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddReactionRequest {
    pub alert_id: i64,
    pub emoji: String,
}

#[utoipa::path(
    post,
    path = "/api/reactions",
    tag = "Reactions",
    security(("bearer" = [])),
    request_body = AddReactionRequest,
    responses(
        (status = 201, description = "Reaction added and broadcast", body = Reaction),
        (status = 400, description = "Already reacted with this emoji", body = ApiErrorBody),
        (status = 404, description = "Alert not found", body = ApiErrorBody),
    ),
)]
pub async fn add_reaction(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<AddReactionRequest>,
) -> Result<(StatusCode, Json<Reaction>), ApiError> {
    let emoji = body.emoji.trim();
    if emoji.is_empty() || emoji.chars().count() > 16 {
        return Err(ApiError::validation(vec![FieldError::new(
            "emoji",
            "Emoji must be 1-16 characters",
        )]));
    }

    let mut tables = state.db.lock();
    if tables.alert(body.alert_id).is_none() {
        return Err(ApiError::not_found("Alert not found"));
    }
    if tables
        .find_reaction(body.alert_id, auth.user_id, emoji)
        .is_some()
    {
        return Err(ApiError::bad_request("Already reacted with this emoji"));
    }

    let reaction = tables.insert_reaction(body.alert_id, auth.user_id, emoji);
    state.dispatcher.publish(&Event::ReactionUpdate {
        reaction: ReactionUpdate {
            alert_id: reaction.alert_id,
            reaction_counts: tables.reaction_counts(reaction.alert_id),
            user_id: auth.user_id,
            emoji: reaction.emoji.clone(),
            action: UpdateAction::Add,
        },
    });
    drop(tables);

    Ok((StatusCode::CREATED, Json(reaction)))
}

// =========================================================================
// DELETE /api/reactions/{reaction_id}
// =========================================================================

#[utoipa::path(
    delete,
    path = "/api/reactions/{reaction_id}",
    tag = "Reactions",
    security(("bearer" = [])),
    params(
        ("reaction_id" = i64, Path, description = "Reaction ID"),
    ),
    responses(
        (status = 200, description = "Reaction removed and broadcast", body = StatusResponse),
        (status = 404, description = "No such reaction owned by the caller", body = ApiErrorBody),
    ),
)]
pub async fn remove_reaction(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(reaction_id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut tables = state.db.lock();
    let reaction = tables
        .remove_reaction(reaction_id, auth.user_id)
        .ok_or_else(|| ApiError::not_found("Reaction not found"))?;

    state.dispatcher.publish(&Event::ReactionUpdate {
        reaction: ReactionUpdate {
            alert_id: reaction.alert_id,
            reaction_counts: tables.reaction_counts(reaction.alert_id),
            user_id: auth.user_id,
            emoji: reaction.emoji,
            action: UpdateAction::Remove,
        },
    });
    drop(tables);

    Ok(Json(StatusResponse::new("success")))
}

// =========================================================================
// GET /api/reactions/alert/{alert_id}
// =========================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct OwnReaction {
    pub id: i64,
    pub emoji: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertReactionsResponse {
    pub reaction_counts: BTreeMap<String, usize>,
    /// The caller's own reactions, so clients can offer removal.
    pub user_reactions: Vec<OwnReaction>,
}

#[utoipa::path(
    get,
    path = "/api/reactions/alert/{alert_id}",
    tag = "Reactions",
    security(("bearer" = [])),
    params(
        ("alert_id" = i64, Path, description = "Alert ID"),
    ),
    responses(
        (status = 200, description = "Reaction counts for the alert", body = AlertReactionsResponse),
    ),
)]
pub async fn list_reactions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(alert_id): Path<i64>,
) -> Result<Json<AlertReactionsResponse>, ApiError> {
    let tables = state.db.lock();
    let user_reactions = tables
        .reactions_for(alert_id)
        .filter(|r| r.user_id == auth.user_id)
        .map(|r| OwnReaction {
            id: r.id,
            emoji: r.emoji.clone(),
        })
        .collect();

    Ok(Json(AlertReactionsResponse {
        reaction_counts: tables.reaction_counts(alert_id),
        user_reactions,
    }))
}
