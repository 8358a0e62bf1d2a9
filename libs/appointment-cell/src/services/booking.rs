// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use notification_cell::{NotificationDispatcher, NotificationKind};

use crate::models::{
    Acceptance, Appointment, AppointmentError, AppointmentStatus, AppointmentUpdate,
    BookAppointmentRequest, BookingConfirmation, BookingSettings, Case, CaseStatus, Payment,
    TransitionAction, TransitionOutcome,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::{AppointmentLifecycleService, TransitionPlan};
use crate::services::pricing::PricingService;
use crate::services::store::ConsultationStore;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The appointment state machine. Every status write on an appointment goes
/// through one of the named operations here.
pub struct AppointmentBookingService {
    store: Arc<dyn ConsultationStore>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    pricing_service: PricingService,
    notifier: NotificationDispatcher,
    settings: BookingSettings,
    clock: Clock,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn ConsultationStore>,
        notifier: NotificationDispatcher,
        settings: BookingSettings,
    ) -> Self {
        let conflict_service = ConflictDetectionService::new(Arc::clone(&store), settings.conflict_scope);

        Self {
            store,
            conflict_service,
            lifecycle_service: AppointmentLifecycleService::new(),
            pricing_service: PricingService::new(),
            notifier,
            settings,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn conflicts(&self) -> &ConflictDetectionService {
        &self.conflict_service
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    // ==========================================================================
    // BOOKING REQUESTS
    // ==========================================================================

    #[instrument(skip(self, request), fields(lawyer_id = %request.lawyer_id))]
    pub async fn request_appointment(
        &self,
        client_id: Uuid,
        request: BookAppointmentRequest,
    ) -> Result<BookingConfirmation, AppointmentError> {
        let now = self.now();

        self.lifecycle_service
            .validate_appointment_timing(request.start_time, request.duration_minutes, now)?;

        if client_id == request.lawyer_id {
            return Err(AppointmentError::ValidationError(
                "Cannot book a consultation with yourself".to_string(),
            ));
        }

        let title = request.case.title.trim();
        if title.is_empty() {
            return Err(AppointmentError::ValidationError("Case title is required".to_string()));
        }
        if title.len() > self.lifecycle_service.rules().max_title_length {
            return Err(AppointmentError::ValidationError("Case title is too long".to_string()));
        }

        let lawyer = self
            .store
            .get_lawyer(request.lawyer_id)
            .await?
            .ok_or(AppointmentError::LawyerNotFound)?;

        if !lawyer.is_available {
            return Err(AppointmentError::ValidationError(
                "Lawyer is not accepting consultations".to_string(),
            ));
        }

        self.conflict_service
            .ensure_available(
                lawyer.id,
                request.start_time,
                i64::from(request.duration_minutes),
                None,
            )
            .await?;

        let case = Case {
            id: Uuid::new_v4(),
            client_id,
            lawyer_id: Some(lawyer.id),
            title: title.to_string(),
            description: request.case.description,
            category: request.case.category,
            status: CaseStatus::Open,
            hourly_rate_cents: lawyer.hourly_rate_cents,
            created_at: now,
            updated_at: now,
        };
        let case = self.store.insert_case(&case).await?;

        let appointment = Appointment {
            id: Uuid::new_v4(),
            client_id,
            lawyer_id: Some(lawyer.id),
            case_id: case.id,
            start_time: request.start_time,
            duration_minutes: request.duration_minutes,
            status: AppointmentStatus::Pending,
            notes: request.notes,
            cancellation_reason: None,
            cancelled_by: None,
            created_at: now,
            responded_at: None,
            updated_at: now,
        };
        let appointment = self.store.insert_appointment(&appointment).await?;

        info!("Consultation {} requested by client {}", appointment.id, client_id);

        self.notifier.notify(
            lawyer.id,
            NotificationKind::AppointmentRequested,
            json!({
                "appointment_id": appointment.id,
                "case_id": case.id,
                "case_title": case.title,
                "start_time": appointment.start_time,
                "duration_minutes": appointment.duration_minutes,
            }),
        );

        Ok(BookingConfirmation { case, appointment })
    }

    pub async fn get_appointment(&self, appointment_id: Uuid, actor_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        if !appointment.is_party(actor_id) {
            return Err(AppointmentError::Unauthorized(
                "Not a party to this appointment".to_string(),
            ));
        }
        Ok(appointment)
    }

    // ==========================================================================
    // LAWYER RESPONSE
    // ==========================================================================

    #[instrument(skip(self))]
    pub async fn accept_request(&self, appointment_id: Uuid, lawyer_id: Uuid) -> Result<Acceptance, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        if !appointment.is_lawyer(lawyer_id) {
            return Err(AppointmentError::Unauthorized(
                "Only the assigned lawyer can accept this request".to_string(),
            ));
        }

        if self.lifecycle_service.plan(appointment.status, TransitionAction::Accept)? == TransitionPlan::AlreadyApplied {
            return self.unchanged_acceptance(appointment).await;
        }

        self.conflict_service
            .ensure_available(
                lawyer_id,
                appointment.start_time,
                i64::from(appointment.duration_minutes),
                Some(appointment.id),
            )
            .await?;

        let amount_cents = self.quote(&appointment).await?;

        let now = self.now();
        let update = AppointmentUpdate::status(AppointmentStatus::AwaitingPayment, now).responded(now);

        let appointment = match self.apply(appointment, TransitionAction::Accept, &update).await? {
            TransitionOutcome::Applied(appointment) => appointment,
            TransitionOutcome::Unchanged(appointment) => return self.unchanged_acceptance(appointment).await,
        };

        self.open_payment(appointment, amount_cents).await
    }

    async fn quote(&self, appointment: &Appointment) -> Result<i64, AppointmentError> {
        let case = self
            .store
            .get_case(appointment.case_id)
            .await?
            .ok_or(AppointmentError::CaseNotFound)?;
        self.pricing_service
            .quote_cents(case.hourly_rate_cents, appointment.duration_minutes)
    }

    /// Creates the pending payment for an accepted appointment and tells the
    /// client what to pay.
    async fn open_payment(&self, appointment: Appointment, amount_cents: i64) -> Result<Acceptance, AppointmentError> {
        let payment = Payment::pending_for(&appointment, amount_cents, &self.settings.currency, self.now());
        let payment = self.store.insert_payment(&payment).await?;

        info!(
            "Consultation {} accepted, payment {} pending for {} cents",
            appointment.id, payment.id, payment.amount_cents
        );

        self.notifier.notify(
            appointment.client_id,
            NotificationKind::AppointmentAccepted,
            json!({
                "appointment_id": appointment.id,
                "payment_id": payment.id,
                "amount_cents": payment.amount_cents,
                "currency": payment.currency,
                "amount": PricingService::format_amount(payment.amount_cents),
            }),
        );

        Ok(Acceptance {
            appointment,
            payment: Some(payment),
            changed: true,
        })
    }

    /// The appointment is already accepted. If the earlier accept stopped
    /// before its payment was stored, this call finishes it and reports a change.
    async fn unchanged_acceptance(&self, appointment: Appointment) -> Result<Acceptance, AppointmentError> {
        if appointment.status == AppointmentStatus::AwaitingPayment
            && self.store.appointment_payments(appointment.id).await?.is_empty()
        {
            warn!("Appointment {} was accepted without a payment, creating it now", appointment.id);
            let amount_cents = self.quote(&appointment).await?;
            return self.open_payment(appointment, amount_cents).await;
        }

        let payment = self.store.active_payment_for_appointment(appointment.id).await?;
        Ok(Acceptance {
            appointment,
            payment,
            changed: false,
        })
    }

    #[instrument(skip(self))]
    pub async fn reject_request(&self, appointment_id: Uuid, lawyer_id: Uuid) -> Result<TransitionOutcome, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        if !appointment.is_lawyer(lawyer_id) {
            return Err(AppointmentError::Unauthorized(
                "Only the assigned lawyer can reject this request".to_string(),
            ));
        }

        let now = self.now();
        let update = AppointmentUpdate::status(AppointmentStatus::Rejected, now).responded(now);
        let outcome = self.apply(appointment, TransitionAction::Reject, &update).await?;

        if let TransitionOutcome::Applied(appointment) = &outcome {
            self.notifier.notify(
                appointment.client_id,
                NotificationKind::AppointmentRejected,
                json!({ "appointment_id": appointment.id }),
            );
        }

        Ok(outcome)
    }

    // ==========================================================================
    // SCHEDULED APPOINTMENTS
    // ==========================================================================

    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        actor_id: Uuid,
        reason: Option<String>,
    ) -> Result<TransitionOutcome, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        if !appointment.is_party(actor_id) {
            return Err(AppointmentError::Unauthorized(
                "Only the client or the lawyer can cancel this appointment".to_string(),
            ));
        }

        let update = AppointmentUpdate::status(AppointmentStatus::Cancelled, self.now()).cancelled(actor_id, reason);
        let outcome = self.apply(appointment, TransitionAction::Cancel, &update).await?;

        if let TransitionOutcome::Applied(appointment) = &outcome {
            if let Some(recipient) = appointment.counterparty_of(actor_id) {
                self.notifier.notify(
                    recipient,
                    NotificationKind::AppointmentCancelled,
                    json!({
                        "appointment_id": appointment.id,
                        "cancelled_by": actor_id,
                        "reason": appointment.cancellation_reason,
                    }),
                );
            }
        }

        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn complete(&self, appointment_id: Uuid, lawyer_id: Uuid) -> Result<TransitionOutcome, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        if !appointment.is_lawyer(lawyer_id) {
            return Err(AppointmentError::Unauthorized(
                "Only the assigned lawyer can complete this appointment".to_string(),
            ));
        }

        let update = AppointmentUpdate::status(AppointmentStatus::Completed, self.now());
        let outcome = self.apply(appointment, TransitionAction::Complete, &update).await?;

        if let TransitionOutcome::Applied(appointment) = &outcome {
            self.notifier.notify(
                appointment.client_id,
                NotificationKind::AppointmentCompleted,
                json!({ "appointment_id": appointment.id }),
            );
        }

        Ok(outcome)
    }

    /// Payment-driven `awaiting_payment -> scheduled`. Reserved for payment
    /// reconciliation, which announces the result itself.
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, appointment_id: Uuid) -> Result<TransitionOutcome, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        let update = AppointmentUpdate::status(AppointmentStatus::Scheduled, self.now());
        self.apply(appointment, TransitionAction::ConfirmPayment, &update).await
    }

    /// Plan the action, then write it conditionally on the status it was
    /// planned from. When another writer got there first the appointment is
    /// re-read and the action re-evaluated against what is stored now.
    async fn apply(
        &self,
        appointment: Appointment,
        action: TransitionAction,
        update: &AppointmentUpdate,
    ) -> Result<TransitionOutcome, AppointmentError> {
        let from = match self.lifecycle_service.plan(appointment.status, action)? {
            TransitionPlan::AlreadyApplied => return Ok(TransitionOutcome::Unchanged(appointment)),
            TransitionPlan::Apply { from, .. } => from,
        };

        if let Some(updated) = self
            .store
            .transition_appointment(appointment.id, from, update)
            .await?
        {
            debug!("Appointment {} moved {} -> {}", updated.id, from, updated.status);
            return Ok(TransitionOutcome::Applied(updated));
        }

        let current = self.load(appointment.id).await?;
        warn!(
            "Concurrent update on appointment {}: expected {}, found {}",
            current.id, from, current.status
        );

        match self.lifecycle_service.plan(current.status, action)? {
            TransitionPlan::AlreadyApplied => Ok(TransitionOutcome::Unchanged(current)),
            TransitionPlan::Apply { .. } => Err(AppointmentError::InvalidTransition {
                current: current.status,
                action,
            }),
        }
    }
}
