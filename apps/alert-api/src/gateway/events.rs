//! Live event types, close codes, and wire-format frames.

use std::collections::BTreeMap;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::models::alert::AlertResponse;

use super::targeting::TargetRoles;

// ---------------------------------------------------------------------------
// Close codes (4000-range for application-level)
// ---------------------------------------------------------------------------

pub const CLOSE_NO_TOKEN: u16 = 4001;
pub const CLOSE_INVALID_TOKEN: u16 = 4002;
pub const CLOSE_IDENTITY_MISMATCH: u16 = 4003;
pub const CLOSE_USER_NOT_FOUND: u16 = 4004;
pub const CLOSE_ACCOUNT_DEACTIVATED: u16 = 4005;
pub const CLOSE_REPLACED: u16 = 4006;
pub const CLOSE_IDLE_TIMEOUT: u16 = 4009;
/// Standard "internal error" close code.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionUpdate {
    pub alert_id: i64,
    pub reaction_counts: BTreeMap<String, usize>,
    pub user_id: i64,
    pub emoji: String,
    pub action: UpdateAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcknowledgmentUpdate {
    pub alert_id: i64,
    pub count: usize,
    pub user_id: i64,
    pub action: UpdateAction,
}

/// An event pushed to live connections. The `type` tag is the wire
/// discriminator clients switch on.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NewAlert { alert: AlertResponse },
    ReactionUpdate { reaction: ReactionUpdate },
    AcknowledgmentUpdate { acknowledgment: AcknowledgmentUpdate },
    AlertDeleted { alert_id: i64 },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::NewAlert { .. } => "new_alert",
            Event::ReactionUpdate { .. } => "reaction_update",
            Event::AcknowledgmentUpdate { .. } => "acknowledgment_update",
            Event::AlertDeleted { .. } => "alert_deleted",
        }
    }

    /// Audience restriction carried by the event itself.
    ///
    /// Only new alerts are scoped. Reaction, acknowledgment, and deletion
    /// updates go to every live connection regardless of the alert's targets.
    pub fn scope(&self) -> Option<TargetRoles> {
        match self {
            Event::NewAlert { alert } => Some(TargetRoles::new(&alert.target_roles)),
            _ => None,
        }
    }

    /// Serialize into a text frame stamped with `timestamp`.
    pub fn to_frame(&self, timestamp: DateTime<Utc>) -> Result<Utf8Bytes, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("timestamp".to_string(), serde_json::to_value(timestamp)?);
        }
        Ok(Utf8Bytes::from(serde_json::to_string(&value)?))
    }
}

// ---------------------------------------------------------------------------
// Control frames
// ---------------------------------------------------------------------------

/// Reply sent for any text frame received on an active connection.
pub fn pong() -> Message {
    Message::Text(Utf8Bytes::from_static(
        r#"{"type":"pong","message":"Connection alive"}"#,
    ))
}

pub fn close(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }))
}
