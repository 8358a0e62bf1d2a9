// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{BookAppointmentRequest, CancelAppointmentRequest, TransitionOutcome};
use crate::router::AppointmentState;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ConflictCheckQuery {
    pub lawyer_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub exclude_appointment_id: Option<Uuid>,
}

fn caller_id(user: &User) -> Result<Uuid, AppError> {
    user.user_id()
        .ok_or_else(|| AppError::Auth("Token subject is not a valid user id".to_string()))
}

fn transition_response(outcome: TransitionOutcome, applied: &str, unchanged: &str) -> Json<Value> {
    let changed = outcome.was_applied();
    Json(json!({
        "success": true,
        "changed": changed,
        "appointment": outcome.into_appointment(),
        "message": if changed { applied } else { unchanged },
    }))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn request_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let client_id = caller_id(&user)?;
    let booking_service = state.booking_service(auth.token());

    let confirmation = booking_service.request_appointment(client_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "case": confirmation.case,
        "appointment": confirmation.appointment,
        "message": "Consultation requested, waiting for the lawyer to respond"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor_id = caller_id(&user)?;
    let booking_service = state.booking_service(auth.token());

    let appointment = booking_service.get_appointment(appointment_id, actor_id).await?;

    Ok(Json(json!(appointment)))
}

// ==============================================================================
// LAWYER RESPONSE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn accept_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let lawyer_id = caller_id(&user)?;
    let booking_service = state.booking_service(auth.token());

    let acceptance = booking_service.accept_request(appointment_id, lawyer_id).await?;

    Ok(Json(json!({
        "success": true,
        "changed": acceptance.changed,
        "appointment": acceptance.appointment,
        "payment": acceptance.payment,
        "message": if acceptance.changed {
            "Request accepted, waiting for the client's payment"
        } else {
            "Request was already accepted"
        }
    })))
}

#[axum::debug_handler]
pub async fn reject_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let lawyer_id = caller_id(&user)?;
    let booking_service = state.booking_service(auth.token());

    let outcome = booking_service.reject_request(appointment_id, lawyer_id).await?;

    Ok(transition_response(outcome, "Request rejected", "Request was already rejected"))
}

// ==============================================================================
// SCHEDULED APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    body: Option<Json<CancelAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let actor_id = caller_id(&user)?;
    let reason = body.and_then(|Json(request)| request.reason);
    let booking_service = state.booking_service(auth.token());

    let outcome = booking_service.cancel(appointment_id, actor_id, reason).await?;

    Ok(transition_response(outcome, "Appointment cancelled", "Appointment was already cancelled"))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let lawyer_id = caller_id(&user)?;
    let booking_service = state.booking_service(auth.token());

    let outcome = booking_service.complete(appointment_id, lawyer_id).await?;

    Ok(transition_response(outcome, "Appointment completed", "Appointment was already completed"))
}

// ==============================================================================
// UTILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(state): State<AppointmentState>,
    Query(query): Query<ConflictCheckQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    if query.duration_minutes <= 0 {
        return Err(AppError::ValidationError(
            "Duration must be a positive number of minutes".to_string(),
        ));
    }

    let booking_service = state.booking_service(auth.token());

    let conflict_response = booking_service
        .conflicts()
        .check_conflicts(
            query.lawyer_id,
            query.start_time,
            query.duration_minutes,
            query.exclude_appointment_id,
        )
        .await?;

    Ok(Json(json!(conflict_response)))
}
