mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, BookAppointmentRequest, BookingSettings, CaseDraft, Payment, PaymentStatus,
};
use appointment_cell::services::{
    AppointmentBookingService, ConsultationStore, InMemoryConsultationStore,
};
use notification_cell::{Notification, NotificationDispatcher};
use payment_cell::models::{CheckoutRequest, PaymentError};
use payment_cell::services::PaymentSessionManager;

use common::{accepted_appointment, fixed_clock, seed_lawyer, FakeGateway};

struct Fixture {
    store: InMemoryConsultationStore,
    gateway: Arc<FakeGateway>,
    manager: PaymentSessionManager,
    notifier: NotificationDispatcher,
    _outbox: UnboundedReceiver<Notification>,
    client_id: Uuid,
    lawyer_id: Uuid,
}

fn fixture() -> Fixture {
    let store = InMemoryConsultationStore::new();
    let gateway = FakeGateway::new();
    let lawyer_id = seed_lawyer(&store, 15_000);
    let (notifier, outbox) = NotificationDispatcher::channel();
    let manager = PaymentSessionManager::new(Arc::new(store.clone()), gateway.clone(), "usd");

    Fixture {
        store,
        gateway,
        manager,
        notifier,
        _outbox: outbox,
        client_id: Uuid::new_v4(),
        lawyer_id,
    }
}

impl Fixture {
    async fn accepted(&self, duration_minutes: i32) -> (Appointment, Payment) {
        let start = Utc::now() + Duration::days(3);
        accepted_appointment(
            &self.store,
            self.notifier.clone(),
            fixed_clock(Utc::now()),
            self.client_id,
            self.lawyer_id,
            start,
            duration_minutes,
        )
        .await
    }

    fn request(&self, appointment_id: Uuid, amount: f64) -> CheckoutRequest {
        CheckoutRequest {
            appointment_id,
            amount,
            currency: "usd".to_string(),
        }
    }
}

#[tokio::test]
async fn test_checkout_opens_session_and_records_reference() {
    let fx = fixture();
    let (appointment, payment) = fx.accepted(30).await;
    assert_eq!(payment.amount_cents, 7_500);

    let response = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 75.0))
        .await
        .unwrap();

    assert_eq!(response.payment_id, payment.id);
    assert_eq!(response.session_id, "cs_test_1");
    assert_eq!(response.checkout_url, "https://checkout.example.com/pay/cs_test_1");
    assert_eq!(response.amount_cents, 7_500);
    assert!(!response.reused);

    let stored = fx.store.get_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.external_reference.as_deref(), Some("cs_test_1"));
    assert_eq!(stored.status, PaymentStatus::Pending);

    let session = fx.gateway.session("cs_test_1");
    assert_eq!(session.amount_total, Some(7_500));
    assert_eq!(session.metadata["payment_id"], payment.id.to_string());
    assert_eq!(session.metadata["appointment_id"], appointment.id.to_string());
    assert_eq!(session.metadata["lawyer_id"], fx.lawyer_id.to_string());
}

#[tokio::test]
async fn test_open_session_is_reused() {
    let fx = fixture();
    let (appointment, _) = fx.accepted(60).await;

    let first = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await
        .unwrap();
    let second = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await
        .unwrap();

    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.payment_id, first.payment_id);
    assert!(second.reused);
    assert_eq!(fx.gateway.created_count(), 1);
    assert_eq!(fx.store.payments_for_appointment(appointment.id).len(), 1);
}

#[tokio::test]
async fn test_expired_session_is_replaced_by_a_new_payment() {
    let fx = fixture();
    let (appointment, _) = fx.accepted(60).await;

    let first = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await
        .unwrap();
    fx.gateway.expire(&first.session_id);

    let second = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await
        .unwrap();

    assert_ne!(second.payment_id, first.payment_id);
    assert_eq!(second.session_id, "cs_test_2");
    assert_eq!(second.amount_cents, 15_000);
    assert!(!second.reused);

    // Both references still lead to their own payment
    let retired = fx.store.find_payment_by_reference(&first.session_id).await.unwrap().unwrap();
    assert_eq!(retired.id, first.payment_id);
    assert_eq!(retired.status, PaymentStatus::Failed);
    let current = fx.store.find_payment_by_reference(&second.session_id).await.unwrap().unwrap();
    assert_eq!(current.id, second.payment_id);
    assert_eq!(current.status, PaymentStatus::Pending);
    assert_eq!(fx.store.payments_for_appointment(appointment.id).len(), 2);
}

#[tokio::test]
async fn test_session_still_settling_is_not_replaced() {
    let fx = fixture();
    let (appointment, _) = fx.accepted(60).await;

    let first = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await
        .unwrap();
    fx.gateway.mark_processing(&first.session_id);

    let result = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await;

    assert_matches!(result, Err(PaymentError::PreconditionFailed(msg)) if msg.contains("processed"));
    assert_eq!(fx.gateway.created_count(), 1);
    let stored = fx.store.get_payment(first.payment_id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert_eq!(stored.external_reference.as_deref(), Some(first.session_id.as_str()));
}

#[tokio::test]
async fn test_new_payment_closes_the_failed_payments_open_session() {
    let fx = fixture();
    let (appointment, _) = fx.accepted(60).await;

    let first = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await
        .unwrap();
    fx.store
        .fail_payment(first.payment_id, "asynchronous payment failed")
        .await
        .unwrap()
        .unwrap();

    let second = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await
        .unwrap();

    assert_ne!(second.payment_id, first.payment_id);
    assert_eq!(fx.gateway.expired_count(), 1);
    assert!(!fx.gateway.session(&first.session_id).is_open());
    assert!(fx.gateway.session(&second.session_id).is_open());
}

#[tokio::test]
async fn test_failed_payment_whose_session_was_paid_blocks_a_new_payment() {
    let fx = fixture();
    let (appointment, _) = fx.accepted(60).await;

    let first = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await
        .unwrap();
    fx.store
        .fail_payment(first.payment_id, "asynchronous payment failed")
        .await
        .unwrap()
        .unwrap();
    fx.gateway.mark_paid(&first.session_id);

    let result = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await;

    assert_matches!(result, Err(PaymentError::PreconditionFailed(msg)) if msg.contains("verify"));
    assert_eq!(fx.gateway.created_count(), 1);
    assert_eq!(fx.store.payments_for_appointment(appointment.id).len(), 1);
}

#[tokio::test]
async fn test_paid_session_must_be_verified_instead() {
    let fx = fixture();
    let (appointment, _) = fx.accepted(60).await;

    let first = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await
        .unwrap();
    fx.gateway.mark_paid(&first.session_id);

    let result = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await;

    assert_matches!(result, Err(PaymentError::PreconditionFailed(msg)) if msg.contains("verify"));
    assert_eq!(fx.gateway.created_count(), 1);
}

#[tokio::test]
async fn test_amount_must_match_the_quote() {
    let fx = fixture();
    let (appointment, _) = fx.accepted(60).await;

    let result = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 1.0))
        .await;
    assert_matches!(result, Err(PaymentError::ValidationError(msg)) if msg.contains("150.00"));

    let result = fx
        .manager
        .create_checkout_session(
            fx.client_id,
            CheckoutRequest {
                appointment_id: appointment.id,
                amount: 150.0,
                currency: "eur".to_string(),
            },
        )
        .await;
    assert_matches!(result, Err(PaymentError::ValidationError(_)));
    assert_eq!(fx.gateway.created_count(), 0);
}

#[tokio::test]
async fn test_checkout_preconditions() {
    let fx = fixture();

    // Unknown appointment
    let result = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(Uuid::new_v4(), 150.0))
        .await;
    assert_matches!(result, Err(PaymentError::PreconditionFailed(_)));

    // Still pending the lawyer's answer
    let booking = AppointmentBookingService::new(
        Arc::new(fx.store.clone()),
        fx.notifier.clone(),
        BookingSettings::default(),
    );
    let pending = booking
        .request_appointment(
            fx.client_id,
            BookAppointmentRequest {
                lawyer_id: fx.lawyer_id,
                case: CaseDraft {
                    title: "Will and testament".to_string(),
                    description: None,
                    category: None,
                },
                start_time: Utc::now() + Duration::days(10),
                duration_minutes: 60,
                notes: None,
            },
        )
        .await
        .unwrap();
    let result = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(pending.appointment.id, 150.0))
        .await;
    assert_matches!(result, Err(PaymentError::PreconditionFailed(msg)) if msg.contains("pending"));

    // Someone else's appointment
    let (appointment, _) = fx.accepted(60).await;
    let result = fx
        .manager
        .create_checkout_session(Uuid::new_v4(), fx.request(appointment.id, 150.0))
        .await;
    assert_matches!(result, Err(PaymentError::PreconditionFailed(_)));
    assert_eq!(fx.gateway.created_count(), 0);
}

#[tokio::test]
async fn test_processor_outage_leaves_payment_without_reference() {
    let fx = fixture();
    let (appointment, payment) = fx.accepted(60).await;
    fx.gateway.set_unavailable(true);

    let result = fx
        .manager
        .create_checkout_session(fx.client_id, fx.request(appointment.id, 150.0))
        .await;

    assert_matches!(result, Err(PaymentError::ExternalService(_)));
    let stored = fx.store.get_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.external_reference, None);
    assert_eq!(stored.status, PaymentStatus::Pending);
}
