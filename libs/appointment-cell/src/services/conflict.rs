// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, ConflictCheckResponse, ConflictScope, TimeSlot,
};
use crate::services::store::ConsultationStore;

/// True when the candidate slot overlaps any of `existing` booked for the same
/// lawyer. Intervals are half-open, so back-to-back slots do not conflict.
pub fn has_conflict(
    lawyer_id: Uuid,
    start_time: DateTime<Utc>,
    duration_minutes: i64,
    existing: &[Appointment],
) -> bool {
    let candidate = TimeSlot::new(start_time, duration_minutes);
    existing
        .iter()
        .any(|a| a.lawyer_id == Some(lawyer_id) && a.slot().overlaps(&candidate))
}

pub struct ConflictDetectionService {
    store: Arc<dyn ConsultationStore>,
    scope: ConflictScope,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn ConsultationStore>, scope: ConflictScope) -> Self {
        Self { store, scope }
    }

    /// Check a slot against the lawyer's binding bookings. Requests that have
    /// not been paid for yet (or not accepted) are reported separately as
    /// tentative and never block.
    pub async fn check_conflicts(
        &self,
        lawyer_id: Uuid,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        debug!(
            "Checking conflicts for lawyer {} at {} ({} minutes, scope {:?})",
            lawyer_id, start_time, duration_minutes, self.scope
        );

        let binding = self.scope.binding_statuses();

        let existing = self
            .store
            .lawyer_appointments(
                lawyer_id,
                &[
                    AppointmentStatus::Pending,
                    AppointmentStatus::AwaitingPayment,
                    AppointmentStatus::Scheduled,
                ],
            )
            .await?;

        let (blocking, tentative): (Vec<Appointment>, Vec<Appointment>) = existing
            .into_iter()
            .filter(|a| Some(a.id) != exclude_appointment_id)
            .filter(|a| has_conflict(lawyer_id, start_time, duration_minutes, std::slice::from_ref(a)))
            .partition(|a| binding.contains(&a.status));

        if !blocking.is_empty() {
            warn!(
                "Conflict detected for lawyer {} - {} conflicting appointments",
                lawyer_id,
                blocking.len()
            );
        }

        Ok(ConflictCheckResponse {
            has_conflict: !blocking.is_empty(),
            conflicting_appointments: blocking,
            tentative_overlaps: tentative,
        })
    }

    /// Fails with `SlotConflict` when the slot is taken.
    pub async fn ensure_available(
        &self,
        lawyer_id: Uuid,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let response = self
            .check_conflicts(lawyer_id, start_time, duration_minutes, exclude_appointment_id)
            .await?;

        if response.has_conflict {
            return Err(AppointmentError::SlotConflict {
                conflicting: response.conflicting_appointments.iter().map(|a| a.id).collect(),
            });
        }

        Ok(())
    }
}
