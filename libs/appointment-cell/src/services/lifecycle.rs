// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus, AppointmentValidationRules, TransitionAction};

/// What applying an action to the current status amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    Apply {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    /// The action's target status is already in place; nothing to write.
    AlreadyApplied,
}

#[derive(Default)]
pub struct AppointmentLifecycleService {
    rules: AppointmentValidationRules,
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: AppointmentValidationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &AppointmentValidationRules {
        &self.rules
    }

    /// Resolve an action against the current status. Repeating an action whose
    /// target is already reached is a no-op, not an error.
    pub fn plan(
        &self,
        current: AppointmentStatus,
        action: TransitionAction,
    ) -> Result<TransitionPlan, AppointmentError> {
        use AppointmentStatus::*;

        let (source, target) = match action {
            TransitionAction::Accept => (Pending, AwaitingPayment),
            TransitionAction::Reject => (Pending, Rejected),
            TransitionAction::ConfirmPayment => (AwaitingPayment, Scheduled),
            TransitionAction::Cancel => (Scheduled, Cancelled),
            TransitionAction::Complete => (Scheduled, Completed),
        };

        if current == source {
            debug!("Transition planned: {} -> {} ({})", source, target, action);
            Ok(TransitionPlan::Apply { from: source, to: target })
        } else if current == target {
            debug!("Action {} already applied (status {})", action, current);
            Ok(TransitionPlan::AlreadyApplied)
        } else {
            warn!("Invalid transition attempted: {} on {}", action, current);
            Err(AppointmentError::InvalidTransition { current, action })
        }
    }

    pub fn validate_appointment_timing(
        &self,
        start_time: DateTime<Utc>,
        duration_minutes: i32,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if duration_minutes < self.rules.min_duration_minutes {
            return Err(AppointmentError::ValidationError(
                "Duration must be a positive number of minutes".to_string(),
            ));
        }

        if duration_minutes > self.rules.max_duration_minutes {
            return Err(AppointmentError::ValidationError(format!(
                "Duration cannot exceed {} minutes",
                self.rules.max_duration_minutes
            )));
        }

        if start_time <= now {
            return Err(AppointmentError::ValidationError(
                "Appointment must start in the future".to_string(),
            ));
        }

        Ok(())
    }
}
