// libs/notification-cell/src/services/sink.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::{SupabaseAuth, SupabaseClient};

use crate::models::{Notification, NotificationError};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Writes notifications to the `notifications` table; the hosted change feed
/// pushes each new row to the recipient's open sessions.
pub struct SupabaseNotificationSink {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseNotificationSink {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }
}

#[async_trait]
impl NotificationSink for SupabaseNotificationSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        let body = json!({
            "id": notification.id,
            "user_id": notification.recipient_id,
            "type": notification.kind,
            "title": notification.title,
            "message": notification.message,
            "data": notification.payload,
            "read": notification.read,
            "created_at": notification.created_at.to_rfc3339(),
        });

        let _: Vec<Value> = self
            .supabase
            .request_returning(
                Method::POST,
                "/rest/v1/notifications",
                SupabaseAuth::ServiceRole,
                Some(body),
            )
            .await
            .map_err(|e| NotificationError::DeliveryFailed(e.to_string()))?;

        debug!("Notification {} stored for {}", notification.id, notification.recipient_id);
        Ok(())
    }
}

/// Used when no store is configured (local development).
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            "[notification] {} -> {}: {}",
            notification.kind, notification.recipient_id, notification.message
        );
        Ok(())
    }
}
