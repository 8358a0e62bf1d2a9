// libs/payment-cell/src/services/webhook.rs
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::models::{
    CheckoutSession, PaymentError, PaymentIntentObject, ProcessorObservation, WebhookEvent,
    WebhookOutcome,
};
use crate::services::reconciliation::PaymentReconciliationService;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verifies `Stripe-Signature` headers: `t=<unix>,v1=<hex hmac>[,v1=...]`,
/// where the HMAC-SHA256 covers `"<t>.<raw body>"`.
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.to_string(),
            tolerance_secs: SIGNATURE_TOLERANCE_SECS,
        }
    }

    pub fn verify(&self, payload: &[u8], signature_header: &str, now: i64) -> Result<(), PaymentError> {
        if self.secret.is_empty() {
            return Err(PaymentError::InvalidSignature("webhook secret is not configured".to_string()));
        }

        let mut timestamp: Option<i64> = None;
        let mut signatures = Vec::new();

        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
        if signatures.is_empty() {
            return Err(PaymentError::InvalidSignature("missing v1 signature".to_string()));
        }

        if (now - timestamp).abs() > self.tolerance_secs {
            warn!("Webhook timestamp {} outside tolerance (now {})", timestamp, now);
            return Err(PaymentError::InvalidSignature("timestamp outside tolerance".to_string()));
        }

        let mut signed_payload = format!("{}.", timestamp).into_bytes();
        signed_payload.extend_from_slice(payload);

        for signature in signatures {
            let Ok(expected) = hex::decode(signature) else {
                continue;
            };
            let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
                .map_err(|_| PaymentError::InvalidSignature("unusable webhook secret".to_string()))?;
            mac.update(&signed_payload);
            if mac.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }

        Err(PaymentError::InvalidSignature("signature mismatch".to_string()))
    }
}

/// Verifies, parses and routes processor webhook events.
pub struct PaymentWebhookService {
    verifier: Option<WebhookVerifier>,
    reconciliation: PaymentReconciliationService,
}

impl PaymentWebhookService {
    /// `verifier` is `None` only when verification is explicitly disabled.
    pub fn new(verifier: Option<WebhookVerifier>, reconciliation: PaymentReconciliationService) -> Self {
        Self {
            verifier,
            reconciliation,
        }
    }

    pub async fn process(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
        now: i64,
    ) -> Result<WebhookOutcome, PaymentError> {
        match &self.verifier {
            Some(verifier) => {
                let header = signature_header
                    .ok_or_else(|| PaymentError::InvalidSignature("missing signature header".to_string()))?;
                verifier.verify(payload, header, now)?;
            }
            None => warn!("Webhook signature verification is disabled"),
        }

        let event: WebhookEvent =
            serde_json::from_slice(payload).map_err(|e| PaymentError::MalformedPayload(e.to_string()))?;

        self.handle_event(event).await
    }

    pub async fn handle_event(&self, event: WebhookEvent) -> Result<WebhookOutcome, PaymentError> {
        info!("Processing webhook event {} ({})", event.id, event.event_type);

        match event.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                let session = parse_object::<CheckoutSession>(event)?;
                let observation = ProcessorObservation::from_session(&session);
                let report = self.reconciliation.reconcile_reported(&session.id, observation).await?;
                Ok(WebhookOutcome::Reconciled { result: report.result })
            }
            "checkout.session.expired" => {
                let session = parse_object::<CheckoutSession>(event)?;
                let changed = self
                    .reconciliation
                    .record_failure(&session.id, "checkout session expired")
                    .await?;
                Ok(WebhookOutcome::FailureRecorded { changed })
            }
            "checkout.session.async_payment_failed" => {
                let session = parse_object::<CheckoutSession>(event)?;
                let changed = self
                    .reconciliation
                    .record_failure(&session.id, "asynchronous payment failed")
                    .await?;
                Ok(WebhookOutcome::FailureRecorded { changed })
            }
            "payment_intent.payment_failed" => {
                let intent = parse_object::<PaymentIntentObject>(event)?;
                let Some(payment_id) = intent
                    .metadata
                    .get("payment_id")
                    .and_then(|value| uuid::Uuid::parse_str(value).ok())
                else {
                    debug!("Payment intent {} carries no payment id, ignoring", intent.id);
                    return Ok(WebhookOutcome::Ignored {
                        event_type: "payment_intent.payment_failed".to_string(),
                    });
                };

                let reason = intent
                    .last_payment_error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "payment failed".to_string());
                let changed = self.reconciliation.record_declined_attempt(payment_id, &reason).await?;
                Ok(WebhookOutcome::FailureRecorded { changed })
            }
            _ => {
                debug!("Ignoring webhook event type {}", event.event_type);
                Ok(WebhookOutcome::Ignored {
                    event_type: event.event_type,
                })
            }
        }
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(event: WebhookEvent) -> Result<T, PaymentError> {
    serde_json::from_value(event.data.object)
        .map_err(|e| PaymentError::MalformedPayload(format!("{} object: {}", event.event_type, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_utils::test_utils::WebhookTestUtils;

    const SECRET: &str = "whsec_unit_test";
    const NOW: i64 = 1_741_615_200;

    #[test]
    fn test_accepts_valid_signature() {
        let payload = r#"{"type":"checkout.session.completed"}"#;
        let header = WebhookTestUtils::signature_header(payload, SECRET, NOW);

        WebhookVerifier::new(SECRET)
            .verify(payload.as_bytes(), &header, NOW + 5)
            .unwrap();
    }

    #[test]
    fn test_rejects_wrong_secret_and_modified_payload() {
        let payload = r#"{"type":"checkout.session.completed"}"#;
        let verifier = WebhookVerifier::new(SECRET);

        let header = WebhookTestUtils::signature_header(payload, "whsec_other", NOW);
        assert_matches!(
            verifier.verify(payload.as_bytes(), &header, NOW),
            Err(PaymentError::InvalidSignature(_))
        );

        let header = WebhookTestUtils::signature_header(payload, SECRET, NOW);
        assert_matches!(
            verifier.verify(br#"{"type":"checkout.session.expired"}"#, &header, NOW),
            Err(PaymentError::InvalidSignature(_))
        );
    }

    #[test]
    fn test_rejects_stale_timestamps() {
        let payload = "{}";
        let header = WebhookTestUtils::signature_header(payload, SECRET, NOW - 600);

        assert_matches!(
            WebhookVerifier::new(SECRET).verify(payload.as_bytes(), &header, NOW),
            Err(PaymentError::InvalidSignature(msg)) if msg.contains("tolerance")
        );
    }

    #[test]
    fn test_rejects_malformed_headers() {
        let verifier = WebhookVerifier::new(SECRET);
        for header in ["", "garbage", "t=123", "v1=abcdef", "t=abc,v1=00"] {
            assert!(verifier.verify(b"{}", header, NOW).is_err(), "{}", header);
        }
    }

    #[test]
    fn test_any_matching_v1_signature_is_enough() {
        let payload = "{}";
        let valid = WebhookTestUtils::signature_header(payload, SECRET, NOW);
        let header = format!("t={},v1=deadbeef,{}", NOW, valid.split(',').nth(1).unwrap());

        WebhookVerifier::new(SECRET).verify(payload.as_bytes(), &header, NOW).unwrap();
    }
}
