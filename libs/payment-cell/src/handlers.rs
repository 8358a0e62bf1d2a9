// libs/payment-cell/src/handlers.rs
use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CheckoutRequest, PaymentError, ReconciliationResult, VerifyRequest};
use crate::router::PaymentState;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

fn caller_id(user: &User) -> Result<Uuid, AppError> {
    user.user_id()
        .ok_or_else(|| AppError::Auth("Token subject is not a valid user id".to_string()))
}

#[axum::debug_handler]
pub async fn create_checkout_session(
    State(state): State<PaymentState>,
    Extension(user): Extension<User>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<Value>, AppError> {
    let client_id = caller_id(&user)?;

    let checkout = state
        .session_manager()
        .create_checkout_session(client_id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "payment_id": checkout.payment_id,
        "session_id": checkout.session_id,
        "checkout_url": checkout.checkout_url,
        "amount_cents": checkout.amount_cents,
        "currency": checkout.currency,
        "reused": checkout.reused,
    })))
}

#[axum::debug_handler]
pub async fn verify_payment(
    State(state): State<PaymentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<Value>, AppError> {
    let client_id = caller_id(&user)?;

    // Look the payment up with the caller's credentials first
    let payment = state
        .stores
        .for_user(auth.token())
        .find_payment_by_reference(&request.session_id)
        .await
        .map_err(PaymentError::from)?
        .ok_or_else(|| PaymentError::UnknownPaymentReference(request.session_id.clone()))?;

    if payment.client_id != client_id {
        return Err(AppError::Forbidden(
            "Only the paying client can verify this session".to_string(),
        ));
    }

    let report = state
        .reconciliation_service()
        .reconcile(&request.session_id)
        .await?;

    let message = match report.result {
        ReconciliationResult::CompletedNow => "Payment confirmed, the consultation is scheduled",
        ReconciliationResult::AlreadyCompleted => "Payment was already confirmed",
        ReconciliationResult::StillPending => "Payment has not been completed yet",
        ReconciliationResult::Failed => "Payment was not completed",
        ReconciliationResult::RefundReview => "Payment received, but it cannot confirm this consultation and will be reviewed for a refund",
    };

    Ok(Json(json!({
        "success": true,
        "result": report.result,
        "payment": report.payment,
        "message": message,
    })))
}

#[axum::debug_handler]
pub async fn handle_webhook(
    State(state): State<PaymentState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .webhook_service()
        .process(&body, signature, Utc::now().timestamp())
        .await
        .map_err(|e| {
            warn!("Webhook refused: {}", e);
            e
        })?;

    Ok(Json(json!({
        "received": true,
        "outcome": outcome,
    })))
}
