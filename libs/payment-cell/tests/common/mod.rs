#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, BookAppointmentRequest, BookingSettings, CaseDraft, LawyerProfile, Payment,
};
use appointment_cell::services::{AppointmentBookingService, Clock, InMemoryConsultationStore};
use notification_cell::{Notification, NotificationDispatcher};
use payment_cell::models::{
    CheckoutSession, CheckoutSessionRequest, PaymentError, SessionPaymentStatus, SessionStatus,
};
use payment_cell::services::PaymentGateway;

/// Scripted processor. Session ids are `cs_test_1`, `cs_test_2`, ...
/// Retrieval yields once so concurrent callers interleave.
#[derive(Default)]
pub struct FakeGateway {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    created: AtomicUsize,
    retrieved: AtomicUsize,
    expired: AtomicUsize,
    unavailable: std::sync::atomic::AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn retrieved_count(&self) -> usize {
        self.retrieved.load(Ordering::SeqCst)
    }

    pub fn expired_count(&self) -> usize {
        self.expired.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn session(&self, session_id: &str) -> CheckoutSession {
        self.sessions.lock().unwrap()[session_id].clone()
    }

    pub fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(session_id).unwrap();
        session.status = Some(SessionStatus::Complete);
        session.payment_status = SessionPaymentStatus::Paid;
        session.payment_intent = Some(format!("pi_{}", session_id));
    }

    pub fn expire(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(session_id).unwrap();
        session.status = Some(SessionStatus::Expired);
        session.url = None;
    }

    /// Payment accepted but not yet settled, as with bank debits.
    pub fn mark_processing(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(session_id).unwrap();
        session.status = Some(SessionStatus::Complete);
        session.payment_status = SessionPaymentStatus::Unpaid;
        session.url = None;
    }

    pub fn set_metadata(&self, session_id: &str, key: &str, value: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(session_id).unwrap();
        session.metadata.insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::ExternalService("payment processor timed out".to_string()));
        }

        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("cs_test_{}", n);
        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.example.com/pay/{}", id)),
            status: Some(SessionStatus::Open),
            payment_status: SessionPaymentStatus::Unpaid,
            payment_intent: None,
            payment_method_types: vec!["card".to_string()],
            metadata: request
                .metadata()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            amount_total: Some(request.amount_cents),
            currency: Some(request.currency.clone()),
        };

        self.sessions.lock().unwrap().insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError> {
        tokio::task::yield_now().await;
        self.retrieved.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::ExternalService("payment processor timed out".to_string()));
        }

        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PaymentError::UnknownPaymentReference(session_id.to_string()))
    }

    async fn expire_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::ExternalService("payment processor timed out".to_string()));
        }

        self.expired.fetch_add(1, Ordering::SeqCst);
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| PaymentError::UnknownPaymentReference(session_id.to_string()))?;
        session.status = Some(SessionStatus::Expired);
        session.url = None;
        Ok(session.clone())
    }
}

pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}

pub fn drain(outbox: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut notifications = Vec::new();
    while let Ok(notification) = outbox.try_recv() {
        notifications.push(notification);
    }
    notifications
}

pub fn seed_lawyer(store: &InMemoryConsultationStore, hourly_rate_cents: i64) -> Uuid {
    let lawyer_id = Uuid::new_v4();
    store.seed_lawyer(LawyerProfile {
        id: lawyer_id,
        hourly_rate_cents,
        is_available: true,
    });
    lawyer_id
}

/// Requests and accepts a consultation, leaving it awaiting payment.
pub async fn accepted_appointment(
    store: &InMemoryConsultationStore,
    notifier: NotificationDispatcher,
    clock: Clock,
    client_id: Uuid,
    lawyer_id: Uuid,
    start_time: DateTime<Utc>,
    duration_minutes: i32,
) -> (Appointment, Payment) {
    let booking = AppointmentBookingService::new(Arc::new(store.clone()), notifier, BookingSettings::default())
        .with_clock(clock);

    let confirmation = booking
        .request_appointment(
            client_id,
            BookAppointmentRequest {
                lawyer_id,
                case: CaseDraft {
                    title: "Contract review".to_string(),
                    description: Some("Review of a supplier agreement".to_string()),
                    category: Some("business".to_string()),
                },
                start_time,
                duration_minutes,
                notes: None,
            },
        )
        .await
        .unwrap();

    let acceptance = booking
        .accept_request(confirmation.appointment.id, lawyer_id)
        .await
        .unwrap();

    (acceptance.appointment, acceptance.payment.unwrap())
}
