use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Emergency,
    Important,
    Info,
    Reminder,
}

impl AlertPriority {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "emergency" => Some(AlertPriority::Emergency),
            "important" => Some(AlertPriority::Important),
            "info" => Some(AlertPriority::Info),
            "reminder" => Some(AlertPriority::Reminder),
            _ => None,
        }
    }

    /// Low-priority alerts drop out of the default listing after a day.
    pub fn expires(self) -> bool {
        matches!(self, AlertPriority::Info | AlertPriority::Reminder)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Emergency,
    Academic,
    Event,
    Maintenance,
    Weather,
    #[default]
    General,
}

impl AlertCategory {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "emergency" => Some(AlertCategory::Emergency),
            "academic" => Some(AlertCategory::Academic),
            "event" => Some(AlertCategory::Event),
            "maintenance" => Some(AlertCategory::Maintenance),
            "weather" => Some(AlertCategory::Weather),
            "general" => Some(AlertCategory::General),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub priority: AlertPriority,
    pub category: AlertCategory,
    pub sender_id: i64,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    /// Role names exactly as requested by the sender (never empty).
    pub target_roles: Vec<String>,
}

#[derive(Debug)]
pub struct NewAlert {
    pub title: String,
    pub message: String,
    pub priority: AlertPriority,
    pub category: AlertCategory,
    pub sender_id: i64,
    pub target_roles: Vec<String>,
}

/// Alert as returned by the API and pushed in `new_alert` events.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AlertResponse {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub priority: AlertPriority,
    pub category: AlertCategory,
    pub sender_id: i64,
    pub sender_name: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub reaction_counts: BTreeMap<String, usize>,
    pub target_roles: Vec<String>,
    pub acknowledgment_count: usize,
}

impl AlertResponse {
    pub fn new(
        alert: &Alert,
        sender_name: impl Into<String>,
        reaction_counts: BTreeMap<String, usize>,
        acknowledgment_count: usize,
    ) -> Self {
        Self {
            id: alert.id,
            title: alert.title.clone(),
            message: alert.message.clone(),
            priority: alert.priority,
            category: alert.category,
            sender_id: alert.sender_id,
            sender_name: sender_name.into(),
            created_at: alert.created_at,
            is_active: alert.is_active,
            reaction_counts,
            target_roles: alert.target_roles.clone(),
            acknowledgment_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_low_priorities_expire() {
        assert!(AlertPriority::Info.expires());
        assert!(AlertPriority::Reminder.expires());
        assert!(!AlertPriority::Emergency.expires());
        assert!(!AlertPriority::Important.expires());
    }

    #[test]
    fn parse_matches_wire_names() {
        assert_eq!(AlertPriority::parse("Emergency"), Some(AlertPriority::Emergency));
        assert_eq!(AlertPriority::parse("urgent"), None);
        assert_eq!(AlertCategory::parse("weather"), Some(AlertCategory::Weather));
        let json = serde_json::to_string(&AlertCategory::Maintenance).unwrap();
        assert_eq!(json, "\"maintenance\"");
    }
}
