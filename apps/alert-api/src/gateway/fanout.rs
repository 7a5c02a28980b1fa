//! Fan-out of live events to registered connections.
//!
//! `broadcast` never awaits: it serializes the event once, pushes the frame into
//! each matching connection's bounded queue with `try_send`, and returns. Each
//! queue is FIFO, so a recipient sees broadcasts in the order they were issued.
//! A connection whose queue is closed or full is treated as dead and purged
//! after the pass. Nothing is retried or buffered for later.

use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;

use super::events::Event;
use super::registry::ConnectionRegistry;
use super::targeting::{self, TargetRoles};

/// Outcome of a single fan-out pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Live connections outside the event's scope.
    pub skipped: usize,
    /// Dead connections removed from the registry.
    pub purged: usize,
}

/// Cloneable handle to the fan-out engine. Store in AppState.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `event` to every live connection whose role is in `target_roles`,
    /// or to every live connection when `target_roles` is `None`.
    pub fn broadcast(&self, event: &Event, target_roles: Option<&TargetRoles>) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let frame = match event.to_frame(Utc::now()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(?e, event = event.kind(), "failed to serialize event");
                return report;
            }
        };

        let snapshot = self.registry.snapshot();
        let mut dead = Vec::new();

        for entry in snapshot.iter() {
            if let Some(scope) = target_roles {
                if !targeting::in_scope(entry.role, scope) {
                    report.skipped += 1;
                    continue;
                }
            }

            match entry.channel.try_send(Message::Text(frame.clone())) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        recipient_id = entry.recipient_id,
                        event = event.kind(),
                        "outbound queue full, dropping connection"
                    );
                    dead.push((entry.recipient_id, entry.connection_id));
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        recipient_id = entry.recipient_id,
                        event = event.kind(),
                        "connection gone, purging"
                    );
                    dead.push((entry.recipient_id, entry.connection_id));
                }
            }
        }

        for (recipient_id, connection_id) in dead {
            if self.registry.remove_connection(recipient_id, connection_id) {
                report.purged += 1;
            }
        }

        tracing::debug!(
            event = event.kind(),
            delivered = report.delivered,
            skipped = report.skipped,
            purged = report.purged,
            "broadcast complete"
        );

        report
    }

    /// Broadcast using the event's own scope: new alerts reach their target
    /// roles, every other event reaches everyone.
    pub fn publish(&self, event: &Event) -> BroadcastReport {
        let scope = event.scope();
        self.broadcast(event, scope.as_ref())
    }
}
