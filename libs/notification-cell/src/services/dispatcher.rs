// libs/notification-cell/src/services/dispatcher.rs
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Notification, NotificationKind};

/// Outbox for committed state transitions. `notify` only enqueues, so a slow or
/// failing delivery can never hold up or unwind the transition that produced it.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::UnboundedSender<Notification>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher and the receiving end of its outbox. Hand the
    /// receiver to a [`crate::services::NotificationWorker`].
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn notify(&self, recipient_id: Uuid, kind: NotificationKind, payload: Value) {
        let notification = Notification::new(recipient_id, kind, payload);
        debug!(
            "Queueing {} notification {} for {}",
            kind, notification.id, recipient_id
        );

        if let Err(e) = self.sender.send(notification) {
            warn!(
                "Notification outbox closed, dropping {} notification for {}",
                e.0.kind, e.0.recipient_id
            );
        }
    }
}
