// libs/payment-cell/src/models.rs
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use appointment_cell::models::{AppointmentError, Payment};
use shared_models::error::AppError;

// ==============================================================================
// CHECKOUT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub appointment_id: Uuid,
    /// Major units, e.g. `120.00`.
    pub amount: f64,
    pub currency: String,
}

impl CheckoutRequest {
    pub fn amount_cents(&self) -> Result<i64, PaymentError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(PaymentError::ValidationError(
                "Amount must be a positive number".to_string(),
            ));
        }

        let cents = (self.amount * 100.0).round();
        if cents > i64::MAX as f64 {
            return Err(PaymentError::ValidationError("Amount is out of range".to_string()));
        }

        Ok(cents as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub payment_id: Uuid,
    pub session_id: String,
    pub checkout_url: String,
    pub amount_cents: i64,
    pub currency: String,
    /// True when an open session was handed out again instead of a new one.
    pub reused: bool,
}

/// What the gateway needs to open a hosted checkout for one payment record.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub payment_id: Uuid,
    pub appointment_id: Uuid,
    pub client_id: Uuid,
    pub case_id: Uuid,
    pub lawyer_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
}

impl CheckoutSessionRequest {
    pub fn for_payment(payment: &Payment, description: String) -> Self {
        Self {
            payment_id: payment.id,
            appointment_id: payment.appointment_id,
            client_id: payment.client_id,
            case_id: payment.case_id,
            lawyer_id: payment.lawyer_id,
            amount_cents: payment.amount_cents,
            currency: payment.currency.clone(),
            description,
        }
    }

    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        let mut metadata = vec![
            ("appointment_id", self.appointment_id.to_string()),
            ("payment_id", self.payment_id.to_string()),
            ("client_id", self.client_id.to_string()),
            ("case_id", self.case_id.to_string()),
        ];
        if let Some(lawyer_id) = self.lawyer_id {
            metadata.push(("lawyer_id", lawyer_id.to_string()));
        }
        metadata
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub session_id: String,
}

// ==============================================================================
// PROCESSOR MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Complete,
    Expired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    #[serde(other)]
    Unknown,
}

/// A hosted checkout session as the processor reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub status: Option<SessionStatus>,
    pub payment_status: SessionPaymentStatus,
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub payment_method_types: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
}

impl CheckoutSession {
    pub fn is_open(&self) -> bool {
        self.status == Some(SessionStatus::Open)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedOutcome {
    Paid,
    Pending,
    Failed(String),
}

/// The processor's authoritative view of a payment, either re-fetched or
/// carried by a verified webhook event.
#[derive(Debug, Clone)]
pub struct ProcessorObservation {
    pub outcome: ObservedOutcome,
    pub processor_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl ProcessorObservation {
    pub fn from_session(session: &CheckoutSession) -> Self {
        let outcome = match (session.payment_status, session.status) {
            (SessionPaymentStatus::Paid | SessionPaymentStatus::NoPaymentRequired, _) => ObservedOutcome::Paid,
            (_, Some(SessionStatus::Expired)) => ObservedOutcome::Failed("checkout session expired".to_string()),
            _ => ObservedOutcome::Pending,
        };

        Self {
            outcome,
            processor_payment_id: session.payment_intent.clone(),
            payment_method: session.payment_method_types.first().cloned(),
            metadata: session.metadata.clone(),
        }
    }

    pub fn metadata_uuid(&self, key: &str) -> Option<Result<Uuid, String>> {
        self.metadata
            .get(key)
            .map(|value| Uuid::parse_str(value).map_err(|_| value.clone()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationResult {
    AlreadyCompleted,
    CompletedNow,
    StillPending,
    Failed,
    /// Money was captured but the appointment cannot be scheduled by it,
    /// because it was cancelled or another payment already scheduled it.
    RefundReview,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub result: ReconciliationResult,
    pub payment: Payment,
}

// ==============================================================================
// WEBHOOK MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: Value,
}

/// The subset of a payment intent used by failure events.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub last_payment_error: Option<PaymentIntentError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentError {
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Reconciled { result: ReconciliationResult },
    FailureRecorded { changed: bool },
    Ignored { event_type: String },
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Unknown payment reference: {0}")]
    UnknownPaymentReference(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payment processor error: {0}")]
    ExternalService(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),
}

impl From<PaymentError> for AppError {
    fn from(error: PaymentError) -> Self {
        match error {
            PaymentError::UnknownPaymentReference(_) => AppError::NotFound(error.to_string()),
            PaymentError::PreconditionFailed(msg) => AppError::PreconditionFailed(msg),
            PaymentError::ValidationError(msg) => AppError::ValidationError(msg),
            PaymentError::Unauthorized(msg) => AppError::Forbidden(msg),
            PaymentError::ExternalService(msg) => AppError::ExternalService(msg),
            PaymentError::InvalidSignature(_) => AppError::Auth(error.to_string()),
            PaymentError::MalformedPayload(msg) => AppError::BadRequest(msg),
            PaymentError::Appointment(inner) => AppError::from(inner),
        }
    }
}
