// libs/payment-cell/src/services/checkout.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentError, AppointmentStatus, Payment, PaymentStatus};
use appointment_cell::services::{ConsultationStore, PricingService};

use crate::models::{
    CheckoutRequest, CheckoutResponse, CheckoutSession, CheckoutSessionRequest, ObservedOutcome,
    PaymentError, ProcessorObservation, SessionStatus,
};
use crate::services::gateway::PaymentGateway;

/// Opens hosted checkout sessions for appointments that are waiting to be paid.
pub struct PaymentSessionManager {
    store: Arc<dyn ConsultationStore>,
    gateway: Arc<dyn PaymentGateway>,
    pricing_service: PricingService,
    currency: String,
}

impl PaymentSessionManager {
    pub fn new(store: Arc<dyn ConsultationStore>, gateway: Arc<dyn PaymentGateway>, currency: &str) -> Self {
        Self {
            store,
            gateway,
            pricing_service: PricingService::new(),
            currency: currency.to_ascii_lowercase(),
        }
    }

    #[instrument(skip(self, request), fields(appointment_id = %request.appointment_id))]
    pub async fn create_checkout_session(
        &self,
        client_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, PaymentError> {
        let appointment = self
            .store
            .get_appointment(request.appointment_id)
            .await?
            .ok_or_else(|| PaymentError::PreconditionFailed("Appointment not found".to_string()))?;

        if appointment.client_id != client_id {
            return Err(PaymentError::PreconditionFailed(
                "Appointment does not belong to the caller".to_string(),
            ));
        }

        if appointment.status != AppointmentStatus::AwaitingPayment {
            return Err(PaymentError::PreconditionFailed(format!(
                "Appointment is {}, not awaiting payment",
                appointment.status
            )));
        }

        let requested_cents = request.amount_cents()?;

        let payment = match self.store.active_payment_for_appointment(appointment.id).await? {
            Some(payment) if payment.status == PaymentStatus::Completed => {
                return Err(PaymentError::PreconditionFailed(
                    "Appointment is already paid".to_string(),
                ));
            }
            Some(payment) => payment,
            None => {
                self.close_failed_sessions(appointment.id).await?;

                let case = self
                    .store
                    .get_case(appointment.case_id)
                    .await?
                    .ok_or(AppointmentError::CaseNotFound)?;
                let amount_cents = self
                    .pricing_service
                    .quote_cents(case.hourly_rate_cents, appointment.duration_minutes)?;
                let payment = Payment::pending_for(&appointment, amount_cents, &self.currency, Utc::now());
                info!("Creating payment {} for appointment {}", payment.id, appointment.id);
                self.store.insert_payment(&payment).await?
            }
        };

        if requested_cents != payment.amount_cents || !request.currency.eq_ignore_ascii_case(&payment.currency) {
            warn!(
                "Checkout amount mismatch for payment {}: requested {} {}, quoted {} {}",
                payment.id, requested_cents, request.currency, payment.amount_cents, payment.currency
            );
            return Err(PaymentError::ValidationError(format!(
                "Amount does not match the quoted price of {} {}",
                PricingService::format_amount(payment.amount_cents),
                payment.currency.to_ascii_uppercase()
            )));
        }

        // Each payment keeps the one session reference it was given.
        let payment = match payment.external_reference.clone() {
            None => payment,
            Some(reference) => match self.reuse_session(&payment, &reference).await? {
                Some(response) => return Ok(response),
                None => self.replace_payment(&appointment, payment).await?,
            },
        };

        let session_request = CheckoutSessionRequest::for_payment(
            &payment,
            format!("Legal consultation ({} minutes)", appointment.duration_minutes),
        );
        let session = self.gateway.create_checkout_session(&session_request).await?;

        let checkout_url = session
            .url
            .clone()
            .ok_or_else(|| PaymentError::ExternalService("checkout session has no URL".to_string()))?;

        self.store
            .attach_payment_reference(payment.id, &session.id)
            .await?
            .ok_or_else(|| {
                PaymentError::PreconditionFailed("Payment is no longer pending".to_string())
            })?;

        info!("Checkout session {} opened for payment {}", session.id, payment.id);

        Ok(CheckoutResponse {
            payment_id: payment.id,
            session_id: session.id,
            checkout_url,
            amount_cents: payment.amount_cents,
            currency: payment.currency,
            reused: false,
        })
    }

    /// An open session is handed out again. A session that has taken money,
    /// or is still settling it, must be verified instead. `None` means the
    /// session is closed and the payment needs a new one.
    async fn reuse_session(&self, payment: &Payment, reference: &str) -> Result<Option<CheckoutResponse>, PaymentError> {
        let session = self.gateway.retrieve_checkout_session(reference).await?;
        ensure_not_settling(&session)?;

        if !session.is_open() {
            return Ok(None);
        }

        let Some(url) = session.url else {
            warn!("Open checkout session {} has no URL, closing it", session.id);
            self.gateway.expire_checkout_session(&session.id).await?;
            return Ok(None);
        };

        info!("Reusing open checkout session {} for payment {}", session.id, payment.id);
        Ok(Some(CheckoutResponse {
            payment_id: payment.id,
            session_id: session.id,
            checkout_url: url,
            amount_cents: payment.amount_cents,
            currency: payment.currency.clone(),
            reused: true,
        }))
    }

    /// Retires a payment whose session closed unpaid and opens a fresh one
    /// for the same amount.
    async fn replace_payment(&self, appointment: &Appointment, previous: Payment) -> Result<Payment, PaymentError> {
        self.store
            .fail_payment(previous.id, "checkout session expired")
            .await?
            .ok_or_else(|| {
                PaymentError::PreconditionFailed("Payment changed while opening checkout, try again".to_string())
            })?;

        let payment = Payment::pending_for(appointment, previous.amount_cents, &previous.currency, Utc::now());
        info!(
            "Payment {} replaces {} for appointment {}",
            payment.id, previous.id, appointment.id
        );
        Ok(self.store.insert_payment(&payment).await?)
    }

    /// Sessions of failed payments must not stay payable once a new payment
    /// is opened.
    async fn close_failed_sessions(&self, appointment_id: Uuid) -> Result<(), PaymentError> {
        let payments = self.store.appointment_payments(appointment_id).await?;

        for payment in payments.iter().filter(|p| p.status == PaymentStatus::Failed) {
            let Some(reference) = payment.external_reference.as_deref() else {
                continue;
            };

            let session = self.gateway.retrieve_checkout_session(reference).await?;
            ensure_not_settling(&session)?;

            if session.is_open() {
                info!("Expiring checkout session {} of failed payment {}", reference, payment.id);
                self.gateway.expire_checkout_session(reference).await?;
            }
        }

        Ok(())
    }
}

fn ensure_not_settling(session: &CheckoutSession) -> Result<(), PaymentError> {
    if ProcessorObservation::from_session(session).outcome == ObservedOutcome::Paid {
        return Err(PaymentError::PreconditionFailed(
            "Payment already received, verify the session to confirm the appointment".to_string(),
        ));
    }

    if session.status == Some(SessionStatus::Complete) {
        return Err(PaymentError::PreconditionFailed(
            "Payment is still being processed, verify the session again later".to_string(),
        ));
    }

    Ok(())
}
