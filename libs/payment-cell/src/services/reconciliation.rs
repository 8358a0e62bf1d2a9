// libs/payment-cell/src/services/reconciliation.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentError, AppointmentStatus, BookingSettings, CaseStatus, Payment, PaymentCompletion,
    PaymentStatus, TransitionOutcome,
};
use appointment_cell::services::{AppointmentBookingService, Clock, ConsultationStore};
use notification_cell::{NotificationDispatcher, NotificationKind};

use crate::models::{
    ObservedOutcome, PaymentError, ProcessorObservation, ReconciliationReport, ReconciliationResult,
};
use crate::services::gateway::PaymentGateway;

/// Brings local payment and appointment records in line with what the
/// processor reports. Safe to run any number of times, from any number of
/// callers, for the same reference.
pub struct PaymentReconciliationService {
    store: Arc<dyn ConsultationStore>,
    gateway: Arc<dyn PaymentGateway>,
    booking: AppointmentBookingService,
    notifier: NotificationDispatcher,
    clock: Clock,
}

impl PaymentReconciliationService {
    pub fn new(
        store: Arc<dyn ConsultationStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: NotificationDispatcher,
        settings: BookingSettings,
    ) -> Self {
        let booking = AppointmentBookingService::new(Arc::clone(&store), notifier.clone(), settings);

        Self {
            store,
            gateway,
            booking,
            notifier,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.booking = self.booking.with_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    async fn payment_by_reference(&self, external_reference: &str) -> Result<Payment, PaymentError> {
        self.store
            .find_payment_by_reference(external_reference)
            .await?
            .ok_or_else(|| PaymentError::UnknownPaymentReference(external_reference.to_string()))
    }

    /// Client-verify path: asks the processor for the session's current status.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, external_reference: &str) -> Result<ReconciliationReport, PaymentError> {
        let payment = self.payment_by_reference(external_reference).await?;
        if payment.status == PaymentStatus::Completed {
            return self.already_completed(payment).await;
        }

        let session = self.gateway.retrieve_checkout_session(external_reference).await?;
        let observation = ProcessorObservation::from_session(&session);

        self.apply_observation(payment, observation).await
    }

    /// Webhook path: the verified event already carries the processor's status.
    #[instrument(skip(self, observation))]
    pub async fn reconcile_reported(
        &self,
        external_reference: &str,
        observation: ProcessorObservation,
    ) -> Result<ReconciliationReport, PaymentError> {
        let payment = self.payment_by_reference(external_reference).await?;
        if payment.status == PaymentStatus::Completed {
            return self.already_completed(payment).await;
        }

        self.apply_observation(payment, observation).await
    }

    /// Marks a pending payment failed. Returns whether anything changed.
    #[instrument(skip(self))]
    pub async fn record_failure(&self, external_reference: &str, reason: &str) -> Result<bool, PaymentError> {
        let payment = self.payment_by_reference(external_reference).await?;
        self.fail(payment, reason).await
    }

    /// A declined attempt inside a checkout session. The client may still
    /// retry in the same session, so the payment only fails once its session
    /// can no longer be paid.
    #[instrument(skip(self))]
    pub async fn record_declined_attempt(&self, payment_id: Uuid, reason: &str) -> Result<bool, PaymentError> {
        let payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentError::UnknownPaymentReference(payment_id.to_string()))?;

        if payment.status != PaymentStatus::Pending {
            return Ok(false);
        }

        if let Some(reference) = payment.external_reference.as_deref() {
            let session = self.gateway.retrieve_checkout_session(reference).await?;
            if session.is_open() || ProcessorObservation::from_session(&session).outcome == ObservedOutcome::Paid {
                info!(
                    "Declined attempt on payment {} ({}); session {} can still be paid",
                    payment.id, reason, reference
                );
                return Ok(false);
            }
        }

        self.fail(payment, reason).await
    }

    async fn fail(&self, payment: Payment, reason: &str) -> Result<bool, PaymentError> {
        if payment.status != PaymentStatus::Pending {
            debug!("Ignoring failure for payment {} in status {}", payment.id, payment.status);
            return Ok(false);
        }

        match self.store.fail_payment(payment.id, reason).await? {
            Some(failed) => {
                warn!("Payment {} failed: {}", failed.id, reason);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn check_metadata(&self, payment: &Payment, observation: &ProcessorObservation) -> Result<(), PaymentError> {
        for (key, expected) in [("payment_id", payment.id), ("appointment_id", payment.appointment_id)] {
            match observation.metadata_uuid(key) {
                None => {}
                Some(Ok(reported)) if reported == expected => {}
                Some(reported) => {
                    error!(
                        "Processor metadata {} = {:?} does not match payment {} (expected {})",
                        key, reported, payment.id, expected
                    );
                    return Err(PaymentError::ValidationError(format!(
                        "Processor metadata {} does not match the payment record",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    async fn apply_observation(
        &self,
        payment: Payment,
        observation: ProcessorObservation,
    ) -> Result<ReconciliationReport, PaymentError> {
        self.check_metadata(&payment, &observation)?;

        match &observation.outcome {
            ObservedOutcome::Pending => {
                debug!("Payment {} still pending at the processor", payment.id);
                return Ok(ReconciliationReport {
                    result: ReconciliationResult::StillPending,
                    payment,
                });
            }
            ObservedOutcome::Failed(reason) => {
                info!("Processor reports payment {} not completed: {}", payment.id, reason);
                return Ok(ReconciliationReport {
                    result: ReconciliationResult::Failed,
                    payment,
                });
            }
            ObservedOutcome::Paid => {}
        }

        let completion = PaymentCompletion {
            processor_payment_id: observation.processor_payment_id.clone(),
            payment_method: observation.payment_method.clone(),
            completed_at: self.now(),
        };

        let Some(completed) = self.store.complete_payment(payment.id, &completion).await? else {
            debug!("Payment {} completed by a concurrent reconciliation", payment.id);
            let current = self.store.get_payment(payment.id).await?.unwrap_or(payment);
            return Ok(ReconciliationReport {
                result: ReconciliationResult::AlreadyCompleted,
                payment: current,
            });
        };

        info!(
            "Payment {} completed ({} {})",
            completed.id, completed.amount_cents, completed.currency
        );

        let result = self.schedule_paid_appointment(&completed).await?;

        Ok(ReconciliationReport {
            result,
            payment: completed,
        })
    }

    /// The payment is already recorded as completed. Normally there is nothing
    /// left to do; if an earlier run stopped after completing the payment, the
    /// remaining steps are driven again.
    async fn already_completed(&self, payment: Payment) -> Result<ReconciliationReport, PaymentError> {
        let appointment = self
            .store
            .get_appointment(payment.appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        match appointment.status {
            AppointmentStatus::AwaitingPayment => {
                warn!(
                    "Payment {} is completed but appointment {} is still awaiting payment, resuming",
                    payment.id, appointment.id
                );
                self.schedule_paid_appointment(&payment).await?;
            }
            AppointmentStatus::Scheduled => self.mark_case_in_progress(appointment.case_id).await,
            _ => {}
        }

        Ok(ReconciliationReport {
            result: ReconciliationResult::AlreadyCompleted,
            payment,
        })
    }

    /// Steps after the payment row is completed: schedule the appointment,
    /// move the case along and tell both parties. Only the caller whose
    /// appointment write applies sends notifications. Money that cannot
    /// schedule the appointment is flagged for a refund.
    async fn schedule_paid_appointment(&self, payment: &Payment) -> Result<ReconciliationResult, PaymentError> {
        let outcome = match self.booking.confirm_payment(payment.appointment_id).await {
            Ok(outcome) => outcome,
            Err(AppointmentError::InvalidTransition { current, .. }) => {
                error!(
                    "Payment {} ({} {}) completed for appointment {} which is {}; needs refund review",
                    payment.id, payment.amount_cents, payment.currency, payment.appointment_id, current
                );
                return Ok(ReconciliationResult::RefundReview);
            }
            Err(e) => return Err(e.into()),
        };

        let appointment = match outcome {
            TransitionOutcome::Applied(appointment) => appointment,
            TransitionOutcome::Unchanged(appointment) => {
                let payments = self.store.appointment_payments(appointment.id).await?;
                if let Some(other) = payments
                    .iter()
                    .find(|p| p.id != payment.id && p.status == PaymentStatus::Completed)
                {
                    error!(
                        "Payment {} ({} {}) completed for appointment {} already paid by {}; needs refund review",
                        payment.id, payment.amount_cents, payment.currency, appointment.id, other.id
                    );
                    return Ok(ReconciliationResult::RefundReview);
                }

                debug!("Appointment {} already scheduled", appointment.id);
                return Ok(ReconciliationResult::CompletedNow);
            }
        };

        self.mark_case_in_progress(appointment.case_id).await;

        let payload = json!({
            "appointment_id": appointment.id,
            "payment_id": payment.id,
            "amount_cents": payment.amount_cents,
            "currency": payment.currency,
            "start_time": appointment.start_time,
        });

        self.notifier
            .notify(appointment.client_id, NotificationKind::PaymentCompleted, payload.clone());
        if let Some(lawyer_id) = appointment.lawyer_id {
            self.notifier
                .notify(lawyer_id, NotificationKind::PaymentCompleted, payload);
        }

        info!("Appointment {} scheduled after payment {}", appointment.id, payment.id);
        Ok(ReconciliationResult::CompletedNow)
    }

    async fn mark_case_in_progress(&self, case_id: Uuid) {
        match self
            .store
            .update_case_status(case_id, &[CaseStatus::Open], CaseStatus::InProgress)
            .await
        {
            Ok(Some(_)) => debug!("Case {} is now in progress", case_id),
            Ok(None) => {}
            Err(e) => warn!("Failed to move case {} to in progress: {}", case_id, e),
        }
    }
}
