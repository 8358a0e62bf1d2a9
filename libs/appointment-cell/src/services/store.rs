// libs/appointment-cell/src/services/store.rs
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentUpdate, Case, CaseStatus,
    LawyerProfile, Payment, PaymentCompletion,
};

/// Persistence for cases, appointments and payment records.
///
/// Every status change is a conditional write: it only applies when the row
/// is still in the expected status, and returns `None` when zero rows were
/// affected. Callers re-read and re-evaluate in that case.
#[async_trait]
pub trait ConsultationStore: Send + Sync {
    async fn get_lawyer(&self, lawyer_id: Uuid) -> Result<Option<LawyerProfile>, AppointmentError>;

    async fn insert_case(&self, case: &Case) -> Result<Case, AppointmentError>;

    async fn get_case(&self, case_id: Uuid) -> Result<Option<Case>, AppointmentError>;

    async fn update_case_status(
        &self,
        case_id: Uuid,
        expected: &[CaseStatus],
        status: CaseStatus,
    ) -> Result<Option<Case>, AppointmentError>;

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError>;

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Appointments of one lawyer that are in any of `statuses`, ordered by start time.
    async fn lawyer_appointments(
        &self,
        lawyer_id: Uuid,
        statuses: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn transition_appointment(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        update: &AppointmentUpdate,
    ) -> Result<Option<Appointment>, AppointmentError>;

    async fn insert_payment(&self, payment: &Payment) -> Result<Payment, AppointmentError>;

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppointmentError>;

    async fn find_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>, AppointmentError>;

    /// Every payment of an appointment in any status, oldest first.
    async fn appointment_payments(&self, appointment_id: Uuid) -> Result<Vec<Payment>, AppointmentError>;

    /// Most recent pending or completed payment of an appointment.
    async fn active_payment_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<Payment>, AppointmentError>;

    /// Stores the processor session reference; only applies while the payment is pending.
    async fn attach_payment_reference(
        &self,
        payment_id: Uuid,
        reference: &str,
    ) -> Result<Option<Payment>, AppointmentError>;

    /// Marks the payment completed; only applies while it is not completed yet.
    async fn complete_payment(
        &self,
        payment_id: Uuid,
        completion: &PaymentCompletion,
    ) -> Result<Option<Payment>, AppointmentError>;

    /// Marks the payment failed; only applies while it is pending.
    async fn fail_payment(&self, payment_id: Uuid, reason: &str) -> Result<Option<Payment>, AppointmentError>;
}

/// Hands out stores bound to a caller's credentials, or to the service role
/// for processor-driven paths that have no user session.
pub trait StoreProvider: Send + Sync {
    fn for_user(&self, auth_token: &str) -> Arc<dyn ConsultationStore>;

    fn service(&self) -> Arc<dyn ConsultationStore>;
}
