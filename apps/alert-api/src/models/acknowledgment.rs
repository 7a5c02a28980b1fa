use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Acknowledgment {
    pub id: i64,
    pub alert_id: i64,
    pub user_id: i64,
    pub acknowledged_at: DateTime<Utc>,
}
