// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub lawyer_id: Option<Uuid>,
    pub case_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn slot(&self) -> TimeSlot {
        TimeSlot::new(self.start_time, i64::from(self.duration_minutes))
    }

    pub fn is_lawyer(&self, user_id: Uuid) -> bool {
        self.lawyer_id == Some(user_id)
    }

    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.client_id == user_id || self.is_lawyer(user_id)
    }

    /// The other party of the appointment, if there is one.
    pub fn counterparty_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.client_id == user_id {
            self.lawyer_id
        } else {
            Some(self.client_id)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    AwaitingPayment,
    Scheduled,
    Completed,
    Cancelled,
    Rejected,
    Rescheduled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::AwaitingPayment => "awaiting_payment",
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::Rescheduled => "rescheduled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named operations of the appointment state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Accept,
    Reject,
    Cancel,
    Complete,
    ConfirmPayment,
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionAction::Accept => write!(f, "accept"),
            TransitionAction::Reject => write!(f, "reject"),
            TransitionAction::Cancel => write!(f, "cancel"),
            TransitionAction::Complete => write!(f, "complete"),
            TransitionAction::ConfirmPayment => write!(f, "confirm payment for"),
        }
    }
}

/// Result of a state-machine operation. `Unchanged` means the operation had
/// already been applied and nothing was written; callers must not announce it.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Applied(Appointment),
    Unchanged(Appointment),
}

impl TransitionOutcome {
    pub fn appointment(&self) -> &Appointment {
        match self {
            TransitionOutcome::Applied(appointment) | TransitionOutcome::Unchanged(appointment) => appointment,
        }
    }

    pub fn into_appointment(self) -> Appointment {
        match self {
            TransitionOutcome::Applied(appointment) | TransitionOutcome::Unchanged(appointment) => appointment,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Fields written together with a status change.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentUpdate {
    pub status: AppointmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentUpdate {
    pub fn status(status: AppointmentStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            responded_at: None,
            cancellation_reason: None,
            cancelled_by: None,
            updated_at: now,
        }
    }

    pub fn responded(mut self, at: DateTime<Utc>) -> Self {
        self.responded_at = Some(at);
        self
    }

    pub fn cancelled(mut self, by: Uuid, reason: Option<String>) -> Self {
        self.cancelled_by = Some(by);
        self.cancellation_reason = reason;
        self
    }

    pub fn apply_to(&self, appointment: &mut Appointment) {
        appointment.status = self.status;
        if let Some(at) = self.responded_at {
            appointment.responded_at = Some(at);
        }
        if let Some(reason) = &self.cancellation_reason {
            appointment.cancellation_reason = Some(reason.clone());
        }
        if let Some(by) = self.cancelled_by {
            appointment.cancelled_by = Some(by);
        }
        appointment.updated_at = self.updated_at;
    }
}

// ==============================================================================
// CASE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Case {
    pub id: Uuid,
    pub client_id: Uuid,
    pub lawyer_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: CaseStatus,
    /// Lawyer's hourly rate at the time the request was made.
    pub hourly_rate_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    InProgress,
    Completed,
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Open => "open",
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Completed => "completed",
            CaseStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseDraft {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LawyerProfile {
    pub id: Uuid,
    pub hourly_rate_cents: i64,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}

// ==============================================================================
// PAYMENT RECORD MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub client_id: Uuid,
    pub lawyer_id: Option<Uuid>,
    pub case_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub external_reference: Option<String>,
    pub processor_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub failure_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn pending_for(appointment: &Appointment, amount_cents: i64, currency: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            client_id: appointment.client_id,
            lawyer_id: appointment.lawyer_id,
            case_id: appointment.case_id,
            amount_cents,
            currency: currency.to_ascii_lowercase(),
            status: PaymentStatus::Pending,
            external_reference: None,
            processor_payment_id: None,
            payment_method: None,
            failure_reason: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Pending and completed records count as the appointment's one active payment.
    pub fn is_active(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentCompletion {
    pub processor_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub completed_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub lawyer_id: Uuid,
    pub case: CaseDraft,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub case: Case,
    pub appointment: Appointment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acceptance {
    pub appointment: Appointment,
    pub payment: Option<Payment>,
    pub changed: bool,
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, duration_minutes: i64) -> Self {
        Self {
            start,
            end: start + Duration::minutes(duration_minutes),
        }
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }
}

/// Which appointment statuses hold a lawyer's time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictScope {
    #[default]
    ScheduledOnly,
    IncludeAwaitingPayment,
}

impl ConflictScope {
    pub fn parse(value: &str) -> Self {
        match value {
            "include_awaiting_payment" => ConflictScope::IncludeAwaitingPayment,
            _ => ConflictScope::ScheduledOnly,
        }
    }

    pub fn binding_statuses(&self) -> &'static [AppointmentStatus] {
        match self {
            ConflictScope::ScheduledOnly => &[AppointmentStatus::Scheduled],
            ConflictScope::IncludeAwaitingPayment => {
                &[AppointmentStatus::Scheduled, AppointmentStatus::AwaitingPayment]
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
    /// Overlapping requests that are not binding yet.
    pub tentative_overlaps: Vec<Appointment>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Case not found")]
    CaseNotFound,

    #[error("Lawyer not found")]
    LawyerNotFound,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Cannot {action} an appointment that is {current}")]
    InvalidTransition {
        current: AppointmentStatus,
        action: TransitionAction,
    },

    #[error("Requested slot overlaps {} existing booking(s)", conflicting.len())]
    SlotConflict { conflicting: Vec<Uuid> },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::NotFound | AppointmentError::CaseNotFound | AppointmentError::LawyerNotFound => {
                AppError::NotFound(error.to_string())
            }
            AppointmentError::Unauthorized(msg) => AppError::Forbidden(msg),
            AppointmentError::InvalidTransition { .. } => AppError::Conflict(error.to_string()),
            AppointmentError::SlotConflict { .. } => AppError::Conflict(error.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// VALIDATION MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct AppointmentValidationRules {
    pub min_duration_minutes: i32,
    pub max_duration_minutes: i32,
    pub max_title_length: usize,
}

impl Default for AppointmentValidationRules {
    fn default() -> Self {
        Self {
            min_duration_minutes: 1,
            max_duration_minutes: 8 * 60,
            max_title_length: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub currency: String,
    pub conflict_scope: ConflictScope,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            conflict_scope: ConflictScope::ScheduledOnly,
        }
    }
}
