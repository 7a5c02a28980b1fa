pub mod acknowledgments;
pub mod alerts;
pub mod auth;
pub mod health;
pub mod pending_users;
pub mod reactions;
pub mod users;

use axum::Router;
use serde::Serialize;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(crate::gateway::server::router())
        .nest(
            "/api",
            health::router()
                .merge(auth::router())
                .merge(users::router())
                .merge(pending_users::router())
                .merge(alerts::router())
                .merge(reactions::router())
                .merge(acknowledgments::router()),
        )
}

/// Body of endpoints that only report an outcome.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Auth
        auth::login,
        auth::signup,
        // Users
        users::create_user,
        users::get_me,
        users::update_user,
        // Pending users
        pending_users::list_pending,
        pending_users::pending_count,
        pending_users::approve,
        pending_users::reject,
        pending_users::delete_pending,
        // Alerts
        alerts::create_alert,
        alerts::list_alerts,
        alerts::alert_history,
        alerts::mark_viewed,
        alerts::delete_alert,
        alerts::purge_alert,
        alerts::bulk_delete,
        alerts::bulk_restore,
        // Reactions
        reactions::add_reaction,
        reactions::remove_reaction,
        reactions::list_reactions,
        // Acknowledgments
        acknowledgments::acknowledge,
        acknowledgments::unacknowledge,
        acknowledgments::acknowledgment_stats,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::user::UserRole,
            crate::models::user::UserResponse,
            crate::models::alert::AlertPriority,
            crate::models::alert::AlertCategory,
            crate::models::alert::AlertResponse,
            crate::models::reaction::Reaction,
            crate::models::acknowledgment::Acknowledgment,
            // Route request/response types
            StatusResponse,
            health::HealthResponse,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::SignupRequest,
            auth::SignupResponse,
            users::CreateUserRequest,
            users::UpdateUserRequest,
            pending_users::PendingUserResponse,
            pending_users::PendingCountResponse,
            pending_users::ApprovalResponse,
            alerts::CreateAlertRequest,
            alerts::BulkAlertsRequest,
            alerts::BulkAlertsResponse,
            reactions::AddReactionRequest,
            reactions::AlertReactionsResponse,
            reactions::OwnReaction,
            acknowledgments::AcknowledgeResponse,
            acknowledgments::AcknowledgmentStatsResponse,
            acknowledgments::AcknowledgedBy,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Auth", description = "Authentication"),
        (name = "Users", description = "User administration"),
        (name = "Pending users", description = "Approval of self-registered accounts"),
        (name = "Alerts", description = "Alert publishing and listing"),
        (name = "Reactions", description = "Alert reactions"),
        (name = "Acknowledgments", description = "Alert acknowledgments"),
    )
)]
pub struct ApiDoc;
