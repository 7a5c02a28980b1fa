//! Role targeting: which recipients an alert's `target_roles` reaches.
//!
//! An omitted or empty scope means **everyone**. `TargetRoles::new` substitutes
//! `["all"]` for an empty list, so there is no way to build a scope that
//! silently reaches nobody.

use serde::{Deserialize, Serialize};

use crate::models::alert::Alert;
use crate::models::user::UserRole;

/// Wildcard sentinel matching every recipient.
pub const ALL: &str = "all";

/// Lowercase a role name and fold the one accepted plural (`students`).
pub fn normalize_role(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower == "students" {
        "student".to_string()
    } else {
        lower
    }
}

/// A normalized, deduplicated, non-empty set of target role names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TargetRoles(Vec<String>);

impl TargetRoles {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for role in roles {
            let role = normalize_role(role.as_ref());
            if !normalized.contains(&role) {
                normalized.push(role);
            }
        }
        if normalized.is_empty() {
            normalized.push(ALL.to_string());
        }
        Self(normalized)
    }

    pub fn all() -> Self {
        Self(vec![ALL.to_string()])
    }

    pub fn is_all(&self) -> bool {
        self.contains(ALL)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.iter().any(|r| r == role)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for TargetRoles {
    fn from(roles: Vec<String>) -> Self {
        Self::new(roles)
    }
}

impl From<TargetRoles> for Vec<String> {
    fn from(roles: TargetRoles) -> Self {
        roles.0
    }
}

/// Whether a recipient holding `role` falls inside `targets`.
pub fn in_scope(role: UserRole, targets: &TargetRoles) -> bool {
    targets.is_all() || targets.contains(role.as_str())
}

/// Check that `sender` may address `targets`.
///
/// - super admins: everyone, or any mix of students, faculty, and college admins
/// - college admins: everyone, or students and faculty
/// - faculty: students only
/// - students: nobody
pub fn validate_sender_scope(sender: UserRole, targets: &TargetRoles) -> Result<(), &'static str> {
    if targets.is_all() {
        return if sender.is_admin() {
            Ok(())
        } else {
            Err("You do not have permission to send alerts to all groups.")
        };
    }

    let allowed: &[&str] = match sender {
        UserRole::SuperAdmin => &["student", "faculty", "college_admin"],
        UserRole::CollegeAdmin => &["student", "faculty"],
        UserRole::Faculty => &["student"],
        UserRole::Student => return Err("Students cannot send alerts."),
    };

    let permitted = targets
        .as_slice()
        .iter()
        .all(|r| allowed.contains(&r.as_str()));

    match (permitted, sender) {
        (true, _) => Ok(()),
        (false, UserRole::SuperAdmin) => {
            Err("Invalid target roles. Super Admin can send to: student, faculty, college_admin")
        }
        (false, UserRole::CollegeAdmin) => {
            Err("College Admins can only send alerts to Students and Faculty.")
        }
        (false, _) => Err("Faculty can only send alerts to Students."),
    }
}

/// Listing visibility: in scope, or an admin looking at their own alert.
pub fn can_view(viewer_id: i64, viewer_role: UserRole, alert: &Alert) -> bool {
    let targets = TargetRoles::new(&alert.target_roles);
    if in_scope(viewer_role, &targets) {
        return true;
    }
    viewer_role.is_admin() && alert.sender_id == viewer_id
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::alert::{AlertCategory, AlertPriority};

    fn roles(names: &[&str]) -> TargetRoles {
        TargetRoles::new(names.iter().copied())
    }

    #[test]
    fn all_reaches_every_role() {
        assert!(in_scope(UserRole::Student, &roles(&["all"])));
        assert!(in_scope(UserRole::SuperAdmin, &roles(&["ALL"])));
        assert!(in_scope(UserRole::Faculty, &roles(&["student", "all"])));
    }

    #[test]
    fn role_outside_set_is_excluded() {
        assert!(!in_scope(UserRole::Faculty, &roles(&["student"])));
        assert!(!in_scope(UserRole::Student, &roles(&["faculty", "college_admin"])));
    }

    #[test]
    fn plural_and_case_are_normalized() {
        assert!(in_scope(UserRole::Student, &roles(&["Students"])));
        assert!(in_scope(UserRole::Faculty, &roles(&["FACULTY"])));
        assert_eq!(roles(&["Students", "student"]).as_slice(), ["student"]);
    }

    #[test]
    fn only_students_has_a_synonym() {
        assert_eq!(normalize_role("Faculties"), "faculties");
        assert!(!in_scope(UserRole::Faculty, &roles(&["faculties"])));
    }

    #[test]
    fn empty_scope_means_everyone() {
        let empty: [&str; 0] = [];
        let targets = TargetRoles::new(empty);
        assert!(targets.is_all());
        assert!(in_scope(UserRole::CollegeAdmin, &targets));
    }

    #[test]
    fn deserializes_through_normalization() {
        let targets: TargetRoles = serde_json::from_str(r#"["Students","Faculty"]"#).unwrap();
        assert_eq!(targets.as_slice(), ["student", "faculty"]);
        let empty: TargetRoles = serde_json::from_str("[]").unwrap();
        assert!(empty.is_all());
    }

    #[test]
    fn sender_scope_rules() {
        use UserRole::*;

        assert!(validate_sender_scope(SuperAdmin, &roles(&["all"])).is_ok());
        assert!(validate_sender_scope(SuperAdmin, &roles(&["college_admin", "faculty"])).is_ok());
        assert!(validate_sender_scope(SuperAdmin, &roles(&["super_admin"])).is_err());

        assert!(validate_sender_scope(CollegeAdmin, &roles(&["all"])).is_ok());
        assert!(validate_sender_scope(CollegeAdmin, &roles(&["Students", "faculty"])).is_ok());
        assert!(validate_sender_scope(CollegeAdmin, &roles(&["college_admin"])).is_err());

        assert!(validate_sender_scope(Faculty, &roles(&["students"])).is_ok());
        assert!(validate_sender_scope(Faculty, &roles(&["all"])).is_err());
        assert!(validate_sender_scope(Faculty, &roles(&["student", "faculty"])).is_err());

        assert!(validate_sender_scope(Student, &roles(&["student"])).is_err());
    }

    #[test]
    fn admins_see_their_own_alerts_outside_scope() {
        let alert = Alert {
            id: 1,
            title: "t".into(),
            message: "m".into(),
            priority: AlertPriority::Info,
            category: AlertCategory::General,
            sender_id: 7,
            created_at: Utc::now(),
            is_active: true,
            target_roles: vec!["student".into()],
        };
        assert!(can_view(7, UserRole::CollegeAdmin, &alert));
        assert!(!can_view(8, UserRole::CollegeAdmin, &alert));
        assert!(can_view(9, UserRole::Student, &alert));
        assert!(!can_view(7, UserRole::Faculty, &alert));
    }
}
