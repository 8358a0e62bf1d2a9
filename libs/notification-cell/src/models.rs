// libs/notification-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentRequested,
    AppointmentAccepted,
    AppointmentRejected,
    PaymentCompleted,
    AppointmentCancelled,
    AppointmentCompleted,
}

impl NotificationKind {
    pub fn title(&self) -> &'static str {
        match self {
            NotificationKind::AppointmentRequested => "New consultation request",
            NotificationKind::AppointmentAccepted => "Consultation request accepted",
            NotificationKind::AppointmentRejected => "Consultation request declined",
            NotificationKind::PaymentCompleted => "Consultation confirmed",
            NotificationKind::AppointmentCancelled => "Consultation cancelled",
            NotificationKind::AppointmentCompleted => "Consultation completed",
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            NotificationKind::AppointmentRequested => "A client has requested a consultation with you.",
            NotificationKind::AppointmentAccepted => "Your request was accepted. Complete the payment to confirm the slot.",
            NotificationKind::AppointmentRejected => "The lawyer is unable to take this consultation.",
            NotificationKind::PaymentCompleted => "Payment received. The consultation is now scheduled.",
            NotificationKind::AppointmentCancelled => "A scheduled consultation has been cancelled.",
            NotificationKind::AppointmentCompleted => "Your consultation has been marked as completed.",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::AppointmentRequested => write!(f, "appointment_requested"),
            NotificationKind::AppointmentAccepted => write!(f, "appointment_accepted"),
            NotificationKind::AppointmentRejected => write!(f, "appointment_rejected"),
            NotificationKind::PaymentCompleted => write!(f, "payment_completed"),
            NotificationKind::AppointmentCancelled => write!(f, "appointment_cancelled"),
            NotificationKind::AppointmentCompleted => write!(f, "appointment_completed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub payload: Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(recipient_id: Uuid, kind: NotificationKind, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            kind,
            title: kind.title().to_string(),
            message: kind.default_message().to_string(),
            payload,
            read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout_ms: u64,
    pub backoff_ms: u64,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout_ms: 5_000,
            backoff_ms: 200,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Notification delivery timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}
