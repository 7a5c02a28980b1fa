//! In-process tables for users, alerts, reactions, views, and acknowledgments.
//!
//! All tables sit behind a single `parking_lot::Mutex`. Mutation handlers keep
//! the guard while they publish the resulting event, which makes the order of
//! broadcasts match the order of commits. The guard must never be held across
//! an `.await`.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};

use crate::models::acknowledgment::Acknowledgment;
use crate::models::alert::{Alert, NewAlert};
use crate::models::reaction::Reaction;
use crate::models::user::{NewUser, User, UserRole};

pub struct MemoryDb {
    tables: Mutex<Tables>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock()
    }

    /// Create the `admin` super admin unless a super admin already exists.
    pub fn seed_admin(&self, password_hash: String) -> Option<User> {
        let mut tables = self.lock();
        if tables.users.values().any(|u| u.role == UserRole::SuperAdmin) {
            return None;
        }
        let admin = tables.insert_user(NewUser {
            username: "admin".to_string(),
            email: Some("admin@campus.local".to_string()),
            password_hash,
            role: UserRole::SuperAdmin,
            full_name: "System Administrator".to_string(),
            is_active: true,
            is_approved: true,
        });
        Some(admin)
    }
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct Tables {
    users: BTreeMap<i64, User>,
    alerts: BTreeMap<i64, Alert>,
    reactions: BTreeMap<i64, Reaction>,
    /// (alert_id, user_id)
    views: HashSet<(i64, i64)>,
    /// Keyed by (alert_id, user_id).
    acknowledgments: BTreeMap<(i64, i64), Acknowledgment>,
    last_user_id: i64,
    last_alert_id: i64,
    last_reaction_id: i64,
    last_acknowledgment_id: i64,
}

impl Tables {
    // -- users ---------------------------------------------------------------

    pub fn insert_user(&mut self, new: NewUser) -> User {
        self.last_user_id += 1;
        let user = User {
            id: self.last_user_id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            full_name: new.full_name,
            is_active: new.is_active,
            is_approved: new.is_approved,
            created_at: Utc::now(),
            last_login_at: None,
        };
        self.users.insert(user.id, user.clone());
        user
    }

    pub fn user(&self, id: i64) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn user_mut(&mut self, id: i64) -> Option<&mut User> {
        self.users.get_mut(&id)
    }

    pub fn user_by_username(&self, username: &str) -> Option<&User> {
        self.users.values().find(|u| u.username == username)
    }

    pub fn email_taken(&self, email: &str) -> bool {
        self.users
            .values()
            .any(|u| u.email.as_deref() == Some(email))
    }

    /// Accounts still waiting for approval, newest first.
    pub fn pending_users(&self) -> impl Iterator<Item = &User> {
        self.users.values().rev().filter(|u| !u.is_approved)
    }

    pub fn remove_user(&mut self, id: i64) -> Option<User> {
        self.users.remove(&id)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    // -- alerts --------------------------------------------------------------

    pub fn insert_alert(&mut self, new: NewAlert) -> Alert {
        self.last_alert_id += 1;
        let alert = Alert {
            id: self.last_alert_id,
            title: new.title,
            message: new.message,
            priority: new.priority,
            category: new.category,
            sender_id: new.sender_id,
            created_at: Utc::now(),
            is_active: true,
            target_roles: new.target_roles,
        };
        self.alerts.insert(alert.id, alert.clone());
        alert
    }

    pub fn alert(&self, id: i64) -> Option<&Alert> {
        self.alerts.get(&id)
    }

    pub fn alert_mut(&mut self, id: i64) -> Option<&mut Alert> {
        self.alerts.get_mut(&id)
    }

    /// All alerts, newest first.
    pub fn alerts_newest_first(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.values().rev()
    }

    /// Remove an alert together with its reactions, views, and acknowledgments.
    pub fn purge_alert(&mut self, id: i64) -> Option<Alert> {
        let alert = self.alerts.remove(&id)?;
        self.reactions.retain(|_, r| r.alert_id != id);
        self.views.retain(|(alert_id, _)| *alert_id != id);
        self.acknowledgments.retain(|(alert_id, _), _| *alert_id != id);
        Some(alert)
    }

    // -- views ---------------------------------------------------------------

    /// Record that `user_id` has seen `alert_id`. Returns false if already seen.
    pub fn record_view(&mut self, alert_id: i64, user_id: i64) -> bool {
        self.views.insert((alert_id, user_id))
    }

    // -- reactions -----------------------------------------------------------

    pub fn find_reaction(&self, alert_id: i64, user_id: i64, emoji: &str) -> Option<&Reaction> {
        self.reactions
            .values()
            .find(|r| r.alert_id == alert_id && r.user_id == user_id && r.emoji == emoji)
    }

    pub fn insert_reaction(&mut self, alert_id: i64, user_id: i64, emoji: &str) -> Reaction {
        self.last_reaction_id += 1;
        let reaction = Reaction {
            id: self.last_reaction_id,
            alert_id,
            user_id,
            emoji: emoji.to_string(),
            created_at: Utc::now(),
        };
        self.reactions.insert(reaction.id, reaction.clone());
        reaction
    }

    /// Remove reaction `id` if it belongs to `user_id`.
    pub fn remove_reaction(&mut self, id: i64, user_id: i64) -> Option<Reaction> {
        match self.reactions.get(&id) {
            Some(r) if r.user_id == user_id => self.reactions.remove(&id),
            _ => None,
        }
    }

    pub fn reactions_for(&self, alert_id: i64) -> impl Iterator<Item = &Reaction> {
        self.reactions.values().filter(move |r| r.alert_id == alert_id)
    }

    /// Emoji → number of reactions on `alert_id`.
    pub fn reaction_counts(&self, alert_id: i64) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for reaction in self.reactions_for(alert_id) {
            *counts.entry(reaction.emoji.clone()).or_insert(0) += 1;
        }
        counts
    }

    // -- acknowledgments -----------------------------------------------------

    pub fn acknowledgment(&self, alert_id: i64, user_id: i64) -> Option<&Acknowledgment> {
        self.acknowledgments.get(&(alert_id, user_id))
    }

    pub fn insert_acknowledgment(&mut self, alert_id: i64, user_id: i64) -> Acknowledgment {
        self.last_acknowledgment_id += 1;
        let ack = Acknowledgment {
            id: self.last_acknowledgment_id,
            alert_id,
            user_id,
            acknowledged_at: Utc::now(),
        };
        self.acknowledgments.insert((alert_id, user_id), ack.clone());
        ack
    }

    pub fn remove_acknowledgment(&mut self, alert_id: i64, user_id: i64) -> Option<Acknowledgment> {
        self.acknowledgments.remove(&(alert_id, user_id))
    }

    /// Acknowledgments of `alert_id`, ordered by user id.
    pub fn acknowledgments_for(&self, alert_id: i64) -> impl Iterator<Item = &Acknowledgment> {
        self.acknowledgments
            .range((alert_id, i64::MIN)..=(alert_id, i64::MAX))
            .map(|(_, ack)| ack)
    }

    pub fn acknowledgment_count(&self, alert_id: i64) -> usize {
        self.acknowledgments_for(alert_id).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::alert::{AlertCategory, AlertPriority};

    fn new_alert(sender_id: i64) -> NewAlert {
        NewAlert {
            title: "Water outage".into(),
            message: "Building C, 2-4pm".into(),
            priority: AlertPriority::Info,
            category: AlertCategory::Maintenance,
            sender_id,
            target_roles: vec!["all".into()],
        }
    }

    #[test]
    fn seed_admin_only_once() {
        let db = MemoryDb::new();
        assert!(db.seed_admin("hash".into()).is_some());
        assert!(db.seed_admin("hash".into()).is_none());
        assert_eq!(db.lock().user_count(), 1);
        assert!(db.lock().user_by_username("admin").is_some());
    }

    #[test]
    fn pending_users_excludes_approved() {
        let db = MemoryDb::new();
        db.seed_admin("hash".into());
        let mut t = db.lock();
        let pending = t.insert_user(NewUser {
            username: "newbie".into(),
            email: None,
            password_hash: "hash".into(),
            role: UserRole::Student,
            full_name: String::new(),
            is_active: true,
            is_approved: false,
        });

        let ids: Vec<i64> = t.pending_users().map(|u| u.id).collect();
        assert_eq!(ids, vec![pending.id]);
        assert!(t.remove_user(pending.id).is_some());
        assert_eq!(t.pending_users().count(), 0);
        assert_eq!(t.user_count(), 1);
    }

    #[test]
    fn reaction_counts_group_by_emoji() {
        let db = MemoryDb::new();
        let mut t = db.lock();
        let alert = t.insert_alert(new_alert(1));
        t.insert_reaction(alert.id, 1, "👍");
        t.insert_reaction(alert.id, 2, "👍");
        t.insert_reaction(alert.id, 2, "❤️");

        let counts = t.reaction_counts(alert.id);
        assert_eq!(counts.get("👍"), Some(&2));
        assert_eq!(counts.get("❤️"), Some(&1));
        assert!(t.find_reaction(alert.id, 2, "❤️").is_some());
    }

    #[test]
    fn remove_reaction_requires_owner() {
        let db = MemoryDb::new();
        let mut t = db.lock();
        let alert = t.insert_alert(new_alert(1));
        let reaction = t.insert_reaction(alert.id, 5, "👍");
        assert!(t.remove_reaction(reaction.id, 6).is_none());
        assert!(t.remove_reaction(reaction.id, 5).is_some());
        assert!(t.remove_reaction(reaction.id, 5).is_none());
    }

    #[test]
    fn purge_alert_cascades() {
        let db = MemoryDb::new();
        let mut t = db.lock();
        let keep = t.insert_alert(new_alert(1));
        let gone = t.insert_alert(new_alert(1));
        t.insert_reaction(gone.id, 2, "👍");
        t.insert_reaction(keep.id, 2, "👍");
        t.insert_acknowledgment(gone.id, 2);
        t.record_view(gone.id, 2);

        assert!(t.purge_alert(gone.id).is_some());
        assert!(t.alert(gone.id).is_none());
        assert_eq!(t.reactions_for(gone.id).count(), 0);
        assert_eq!(t.acknowledgment_count(gone.id), 0);
        assert!(t.record_view(gone.id, 2));
        assert_eq!(t.reactions_for(keep.id).count(), 1);
    }

    #[test]
    fn alerts_list_newest_first() {
        let db = MemoryDb::new();
        let mut t = db.lock();
        let a = t.insert_alert(new_alert(1));
        let b = t.insert_alert(new_alert(1));
        let ids: Vec<i64> = t.alerts_newest_first().map(|x| x.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }
}
