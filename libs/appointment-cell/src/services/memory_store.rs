// libs/appointment-cell/src/services/memory_store.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentUpdate, Case, CaseStatus,
    LawyerProfile, Payment, PaymentCompletion, PaymentStatus,
};
use crate::services::store::{ConsultationStore, StoreProvider};

#[derive(Default)]
struct Tables {
    lawyers: HashMap<Uuid, LawyerProfile>,
    cases: HashMap<Uuid, Case>,
    appointments: HashMap<Uuid, Appointment>,
    payments: Vec<Payment>,
}

/// Process-local store with the same conditional-write semantics as the
/// hosted one. Used for local runs without a database and in tests; clones
/// share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryConsultationStore {
    tables: Arc<Mutex<Tables>>,
    writes: Arc<AtomicU64>,
    fail_appointment_writes: Arc<AtomicBool>,
    fail_payment_inserts: Arc<AtomicBool>,
}

impl InMemoryConsultationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, AppointmentError> {
        self.tables
            .lock()
            .map_err(|_| AppointmentError::DatabaseError("in-memory store poisoned".to_string()))
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of rows inserted or updated so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes appointment status writes fail until switched back off.
    pub fn set_fail_appointment_writes(&self, fail: bool) {
        self.fail_appointment_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes payment inserts fail until switched back off.
    pub fn set_fail_payment_inserts(&self, fail: bool) {
        self.fail_payment_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn seed_lawyer(&self, lawyer: LawyerProfile) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.lawyers.insert(lawyer.id, lawyer);
        }
    }

    pub fn seed_case(&self, case: Case) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.cases.insert(case.id, case);
        }
    }

    pub fn seed_appointment(&self, appointment: Appointment) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.appointments.insert(appointment.id, appointment);
        }
    }

    pub fn seed_payment(&self, payment: Payment) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.payments.push(payment);
        }
    }

    pub fn payments_for_appointment(&self, appointment_id: Uuid) -> Vec<Payment> {
        self.tables
            .lock()
            .map(|tables| {
                tables
                    .payments
                    .iter()
                    .filter(|p| p.appointment_id == appointment_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn update_payment<F>(&self, payment_id: Uuid, applies: fn(PaymentStatus) -> bool, change: F) -> Result<Option<Payment>, AppointmentError>
    where
        F: FnOnce(&mut Payment),
    {
        let mut tables = self.tables()?;
        let Some(payment) = tables.payments.iter_mut().find(|p| p.id == payment_id) else {
            return Ok(None);
        };
        if !applies(payment.status) {
            return Ok(None);
        }

        change(payment);
        payment.updated_at = Utc::now();
        let updated = payment.clone();
        drop(tables);

        self.record_write();
        Ok(Some(updated))
    }
}

#[async_trait]
impl ConsultationStore for InMemoryConsultationStore {
    async fn get_lawyer(&self, lawyer_id: Uuid) -> Result<Option<LawyerProfile>, AppointmentError> {
        Ok(self.tables()?.lawyers.get(&lawyer_id).cloned())
    }

    async fn insert_case(&self, case: &Case) -> Result<Case, AppointmentError> {
        self.tables()?.cases.insert(case.id, case.clone());
        self.record_write();
        Ok(case.clone())
    }

    async fn get_case(&self, case_id: Uuid) -> Result<Option<Case>, AppointmentError> {
        Ok(self.tables()?.cases.get(&case_id).cloned())
    }

    async fn update_case_status(
        &self,
        case_id: Uuid,
        expected: &[CaseStatus],
        status: CaseStatus,
    ) -> Result<Option<Case>, AppointmentError> {
        let mut tables = self.tables()?;
        let Some(case) = tables.cases.get_mut(&case_id) else {
            return Ok(None);
        };
        if !expected.contains(&case.status) {
            return Ok(None);
        }

        case.status = status;
        case.updated_at = Utc::now();
        let updated = case.clone();
        drop(tables);

        self.record_write();
        Ok(Some(updated))
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError> {
        self.tables()?.appointments.insert(appointment.id, appointment.clone());
        self.record_write();
        Ok(appointment.clone())
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.tables()?.appointments.get(&appointment_id).cloned())
    }

    async fn lawyer_appointments(
        &self,
        lawyer_id: Uuid,
        statuses: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut appointments: Vec<Appointment> = self
            .tables()?
            .appointments
            .values()
            .filter(|a| a.lawyer_id == Some(lawyer_id) && statuses.contains(&a.status))
            .cloned()
            .collect();
        appointments.sort_by_key(|a| a.start_time);
        Ok(appointments)
    }

    async fn transition_appointment(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        update: &AppointmentUpdate,
    ) -> Result<Option<Appointment>, AppointmentError> {
        if self.fail_appointment_writes.load(Ordering::SeqCst) {
            return Err(AppointmentError::DatabaseError("appointment write rejected".to_string()));
        }

        let mut tables = self.tables()?;
        let Some(appointment) = tables.appointments.get_mut(&appointment_id) else {
            return Ok(None);
        };
        if appointment.status != expected {
            return Ok(None);
        }

        update.apply_to(appointment);
        let updated = appointment.clone();
        drop(tables);

        self.record_write();
        Ok(Some(updated))
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<Payment, AppointmentError> {
        if self.fail_payment_inserts.load(Ordering::SeqCst) {
            return Err(AppointmentError::DatabaseError("payment insert failed".to_string()));
        }
        self.tables()?.payments.push(payment.clone());
        self.record_write();
        Ok(payment.clone())
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppointmentError> {
        Ok(self.tables()?.payments.iter().find(|p| p.id == payment_id).cloned())
    }

    async fn find_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>, AppointmentError> {
        Ok(self
            .tables()?
            .payments
            .iter()
            .find(|p| p.external_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn appointment_payments(&self, appointment_id: Uuid) -> Result<Vec<Payment>, AppointmentError> {
        let mut payments: Vec<Payment> = self
            .tables()?
            .payments
            .iter()
            .filter(|p| p.appointment_id == appointment_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn active_payment_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<Payment>, AppointmentError> {
        Ok(self
            .tables()?
            .payments
            .iter()
            .filter(|p| p.appointment_id == appointment_id && p.status.is_active())
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn attach_payment_reference(
        &self,
        payment_id: Uuid,
        reference: &str,
    ) -> Result<Option<Payment>, AppointmentError> {
        let reference = reference.to_string();
        self.update_payment(
            payment_id,
            |status| status == PaymentStatus::Pending,
            move |payment| payment.external_reference = Some(reference),
        )
    }

    async fn complete_payment(
        &self,
        payment_id: Uuid,
        completion: &PaymentCompletion,
    ) -> Result<Option<Payment>, AppointmentError> {
        self.update_payment(
            payment_id,
            |status| status != PaymentStatus::Completed,
            |payment| {
                payment.status = PaymentStatus::Completed;
                payment.processor_payment_id = completion.processor_payment_id.clone();
                payment.payment_method = completion.payment_method.clone();
                payment.completed_at = Some(completion.completed_at);
            },
        )
    }

    async fn fail_payment(&self, payment_id: Uuid, reason: &str) -> Result<Option<Payment>, AppointmentError> {
        let reason = reason.to_string();
        self.update_payment(
            payment_id,
            |status| status == PaymentStatus::Pending,
            move |payment| {
                payment.status = PaymentStatus::Failed;
                payment.failure_reason = Some(reason);
            },
        )
    }
}

impl StoreProvider for InMemoryConsultationStore {
    fn for_user(&self, _auth_token: &str) -> Arc<dyn ConsultationStore> {
        Arc::new(self.clone())
    }

    fn service(&self) -> Arc<dyn ConsultationStore> {
        Arc::new(self.clone())
    }
}
