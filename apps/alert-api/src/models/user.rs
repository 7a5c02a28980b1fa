use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Campus roles. Serialized as lowercase snake_case strings, which are also the
/// canonical names used by alert targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    CollegeAdmin,
    Faculty,
    Student,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::SuperAdmin => "super_admin",
            UserRole::CollegeAdmin => "college_admin",
            UserRole::Faculty => "faculty",
            UserRole::Student => "student",
        }
    }

    /// Parse a role name, ignoring ASCII case.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "super_admin" => Some(UserRole::SuperAdmin),
            "college_admin" => Some(UserRole::CollegeAdmin),
            "faculty" => Some(UserRole::Faculty),
            "student" => Some(UserRole::Student),
            _ => None,
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, UserRole::SuperAdmin | UserRole::CollegeAdmin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
    pub full_name: String,
    pub is_active: bool,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Name shown next to alerts this user sends.
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
    pub full_name: String,
    pub is_active: bool,
    pub is_approved: bool,
}

/// Public view of a user (never includes the password hash).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub full_name: String,
    pub is_active: bool,
    pub is_approved: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            full_name: user.display_name().to_string(),
            is_active: user.is_active,
            is_approved: user.is_approved,
        }
    }
}
