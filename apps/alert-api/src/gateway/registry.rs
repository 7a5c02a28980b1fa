//! Registry of live connections, keyed by recipient.
//!
//! The table is an `Arc<HashMap>` behind a `parking_lot::RwLock`. Taking a
//! snapshot clones the `Arc`; writers go through `Arc::make_mut`, which copies
//! the map only while a snapshot is still alive. A fan-out pass therefore
//! iterates a frozen view, never the table other tasks are mutating.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::models::user::UserRole;

use super::events::{self, CLOSE_REPLACED};

/// Sending half of a connection's outbound queue. The connection's writer task
/// owns the receiving half and drains it into the socket.
pub type ConnectionSender = mpsc::Sender<Message>;

/// One live delivery channel.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub recipient_id: i64,
    /// Role captured at connect time. Not refreshed until the recipient reconnects.
    pub role: UserRole,
    /// Distinguishes this connection from earlier ones for the same recipient.
    pub connection_id: u64,
    pub channel: ConnectionSender,
}

/// Immutable point-in-time view of the registry.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot(Arc<HashMap<i64, ConnectionEntry>>);

impl RegistrySnapshot {
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionEntry> {
        self.0.values()
    }

    pub fn get(&self, recipient_id: i64) -> Option<&ConnectionEntry> {
        self.0.get(&recipient_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct ConnectionRegistry {
    entries: RwLock<Arc<HashMap<i64, ConnectionEntry>>>,
    next_connection_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(HashMap::new())),
            next_connection_id: AtomicU64::new(0),
        }
    }

    /// Insert or replace the entry for `recipient_id`. Returns the id of the
    /// new connection.
    ///
    /// A displaced connection is asked to close; if its queue is full or gone
    /// it is simply dropped.
    pub fn register(&self, recipient_id: i64, role: UserRole, channel: ConnectionSender) -> u64 {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = ConnectionEntry {
            recipient_id,
            role,
            connection_id,
            channel,
        };

        let displaced = {
            let mut entries = self.entries.write();
            Arc::make_mut(&mut *entries).insert(recipient_id, entry)
        };

        if let Some(old) = displaced {
            tracing::debug!(
                recipient_id,
                old_connection_id = old.connection_id,
                connection_id,
                "replacing existing connection"
            );
            let _ = old
                .channel
                .try_send(events::close(CLOSE_REPLACED, "Replaced by a newer connection"));
        }

        connection_id
    }

    /// Remove the entry for `recipient_id`, whichever connection it holds.
    /// Absent entries are a no-op. Returns whether anything was removed.
    pub fn remove(&self, recipient_id: i64) -> bool {
        let mut entries = self.entries.write();
        if !entries.contains_key(&recipient_id) {
            return false;
        }
        Arc::make_mut(&mut *entries).remove(&recipient_id).is_some()
    }

    /// Remove the entry for `recipient_id` only if it still belongs to
    /// `connection_id`. A newer connection for the same recipient is left alone.
    pub fn remove_connection(&self, recipient_id: i64, connection_id: u64) -> bool {
        let mut entries = self.entries.write();
        match entries.get(&recipient_id) {
            Some(entry) if entry.connection_id == connection_id => {}
            _ => return false,
        }
        Arc::make_mut(&mut *entries).remove(&recipient_id).is_some()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot(self.entries.read().clone())
    }

    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn contains(&self, recipient_id: i64) -> bool {
        self.entries.read().contains_key(&recipient_id)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
