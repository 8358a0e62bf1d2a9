// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{SupabaseAuth, SupabaseClient};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentUpdate, Case, CaseStatus,
    LawyerProfile, Payment, PaymentCompletion,
};
use crate::services::store::{ConsultationStore, StoreProvider};

#[derive(Debug, Clone)]
enum Credential {
    User(String),
    ServiceRole,
}

/// PostgREST-backed store. Conditional writes are expressed as filters on the
/// PATCH, with `return=representation` so an empty result means no row matched.
pub struct SupabaseConsultationStore {
    supabase: Arc<SupabaseClient>,
    credential: Credential,
}

impl SupabaseConsultationStore {
    pub fn for_user(supabase: Arc<SupabaseClient>, auth_token: &str) -> Self {
        Self {
            supabase,
            credential: Credential::User(auth_token.to_string()),
        }
    }

    pub fn service_role(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            credential: Credential::ServiceRole,
        }
    }

    fn auth(&self) -> SupabaseAuth<'_> {
        match &self.credential {
            Credential::User(token) => SupabaseAuth::User(token),
            Credential::ServiceRole => SupabaseAuth::ServiceRole,
        }
    }

    async fn select<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, AppointmentError> {
        self.supabase
            .request_as::<Vec<T>>(Method::GET, path, self.auth(), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    async fn select_one<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, AppointmentError> {
        Ok(self.select::<T>(path).await?.into_iter().next())
    }

    async fn insert<T: DeserializeOwned + Serialize>(&self, table: &str, row: &T) -> Result<T, AppointmentError> {
        let body = serde_json::to_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        let path = format!("/rest/v1/{}", table);

        self.supabase
            .request_returning::<T>(Method::POST, &path, self.auth(), Some(body))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError(format!("Insert into {} returned no row", table)))
    }

    async fn update<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<Option<T>, AppointmentError> {
        let rows = self
            .supabase
            .request_returning::<T>(Method::PATCH, path, self.auth(), Some(body))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if rows.is_empty() {
            debug!("Conditional update matched no rows: {}", path);
        }

        Ok(rows.into_iter().next())
    }
}

fn status_list<S: ToString>(statuses: &[S]) -> String {
    statuses.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(",")
}

#[async_trait]
impl ConsultationStore for SupabaseConsultationStore {
    async fn get_lawyer(&self, lawyer_id: Uuid) -> Result<Option<LawyerProfile>, AppointmentError> {
        let path = format!(
            "/rest/v1/lawyers?id=eq.{}&select=id,hourly_rate_cents,is_available",
            lawyer_id
        );
        self.select_one(&path).await
    }

    async fn insert_case(&self, case: &Case) -> Result<Case, AppointmentError> {
        self.insert("cases", case).await
    }

    async fn get_case(&self, case_id: Uuid) -> Result<Option<Case>, AppointmentError> {
        self.select_one(&format!("/rest/v1/cases?id=eq.{}", case_id)).await
    }

    async fn update_case_status(
        &self,
        case_id: Uuid,
        expected: &[CaseStatus],
        status: CaseStatus,
    ) -> Result<Option<Case>, AppointmentError> {
        let path = format!(
            "/rest/v1/cases?id=eq.{}&status=in.({})",
            case_id,
            status_list(expected)
        );
        let body = json!({
            "status": status,
            "updated_at": Utc::now().to_rfc3339(),
        });
        self.update(&path, body).await
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError> {
        self.insert("appointments", appointment).await
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        self.select_one(&format!("/rest/v1/appointments?id=eq.{}", appointment_id)).await
    }

    async fn lawyer_appointments(
        &self,
        lawyer_id: Uuid,
        statuses: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let path = format!(
            "/rest/v1/appointments?lawyer_id=eq.{}&status=in.({})&order=start_time.asc",
            lawyer_id,
            status_list(statuses)
        );
        self.select(&path).await
    }

    #[instrument(skip(self, update), fields(to = %update.status))]
    async fn transition_appointment(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        update: &AppointmentUpdate,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id, expected
        );
        let body = serde_json::to_value(update).map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        self.update(&path, body).await
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<Payment, AppointmentError> {
        self.insert("payments", payment).await
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppointmentError> {
        self.select_one(&format!("/rest/v1/payments?id=eq.{}", payment_id)).await
    }

    async fn find_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>, AppointmentError> {
        let path = format!(
            "/rest/v1/payments?external_reference=eq.{}",
            urlencoding::encode(reference)
        );
        self.select_one(&path).await
    }

    async fn appointment_payments(&self, appointment_id: Uuid) -> Result<Vec<Payment>, AppointmentError> {
        let path = format!(
            "/rest/v1/payments?appointment_id=eq.{}&order=created_at.asc",
            appointment_id
        );
        self.select(&path).await
    }

    async fn active_payment_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<Payment>, AppointmentError> {
        let path = format!(
            "/rest/v1/payments?appointment_id=eq.{}&status=in.(pending,completed)&order=created_at.desc&limit=1",
            appointment_id
        );
        self.select_one(&path).await
    }

    async fn attach_payment_reference(
        &self,
        payment_id: Uuid,
        reference: &str,
    ) -> Result<Option<Payment>, AppointmentError> {
        let path = format!("/rest/v1/payments?id=eq.{}&status=eq.pending", payment_id);
        let body = json!({
            "external_reference": reference,
            "updated_at": Utc::now().to_rfc3339(),
        });
        self.update(&path, body).await
    }

    #[instrument(skip(self, completion))]
    async fn complete_payment(
        &self,
        payment_id: Uuid,
        completion: &PaymentCompletion,
    ) -> Result<Option<Payment>, AppointmentError> {
        let path = format!("/rest/v1/payments?id=eq.{}&status=neq.completed", payment_id);
        let body = json!({
            "status": "completed",
            "processor_payment_id": completion.processor_payment_id,
            "payment_method": completion.payment_method,
            "completed_at": completion.completed_at.to_rfc3339(),
            "updated_at": completion.completed_at.to_rfc3339(),
        });
        self.update(&path, body).await
    }

    async fn fail_payment(&self, payment_id: Uuid, reason: &str) -> Result<Option<Payment>, AppointmentError> {
        let path = format!("/rest/v1/payments?id=eq.{}&status=eq.pending", payment_id);
        let body = json!({
            "status": "failed",
            "failure_reason": reason,
            "updated_at": Utc::now().to_rfc3339(),
        });
        self.update(&path, body).await
    }
}

/// Builds Supabase stores that share one HTTP client.
pub struct SupabaseStoreProvider {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseStoreProvider {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }
}

impl StoreProvider for SupabaseStoreProvider {
    fn for_user(&self, auth_token: &str) -> Arc<dyn ConsultationStore> {
        Arc::new(SupabaseConsultationStore::for_user(self.supabase.clone(), auth_token))
    }

    fn service(&self) -> Arc<dyn ConsultationStore> {
        Arc::new(SupabaseConsultationStore::service_role(self.supabase.clone()))
    }
}
