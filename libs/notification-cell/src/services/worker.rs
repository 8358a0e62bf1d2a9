// libs/notification-cell/src/services/worker.rs
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::models::{DeliveryPolicy, Notification, NotificationError};
use crate::services::sink::NotificationSink;

/// Drains the dispatcher outbox and hands each notification to a sink.
pub struct NotificationWorker {
    receiver: mpsc::UnboundedReceiver<Notification>,
    sink: Arc<dyn NotificationSink>,
    policy: DeliveryPolicy,
}

impl NotificationWorker {
    pub fn new(receiver: mpsc::UnboundedReceiver<Notification>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            receiver,
            sink,
            policy: DeliveryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs until every dispatcher handle has been dropped.
    pub async fn run(mut self) {
        info!("Notification worker started");

        while let Some(notification) = self.receiver.recv().await {
            if let Err(e) = self.deliver_with_retry(&notification).await {
                error!(
                    "Giving up on {} notification {} for {}: {}",
                    notification.kind, notification.id, notification.recipient_id, e
                );
            }
        }

        info!("Notification worker stopped: outbox closed");
    }

    #[instrument(skip(self, notification), fields(notification_id = %notification.id, kind = %notification.kind))]
    pub async fn deliver_with_retry(&self, notification: &Notification) -> Result<(), NotificationError> {
        let attempt_timeout = Duration::from_millis(self.policy.attempt_timeout_ms);
        let mut last_error = NotificationError::DeliveryFailed("no delivery attempted".to_string());

        for attempt in 1..=self.policy.max_attempts.max(1) {
            match timeout(attempt_timeout, self.sink.deliver(notification)).await {
                Ok(Ok(())) => {
                    debug!("Notification delivered on attempt {}", attempt);
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!("Notification delivery attempt {} failed: {}", attempt, e);
                    last_error = e;
                }
                Err(_) => {
                    warn!("Notification delivery attempt {} timed out", attempt);
                    last_error = NotificationError::Timeout {
                        timeout_ms: self.policy.attempt_timeout_ms,
                    };
                }
            }

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(Duration::from_millis(self.policy.backoff_ms * u64::from(attempt))).await;
            }
        }

        Err(last_error)
    }
}
