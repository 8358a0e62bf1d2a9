// libs/payment-cell/src/services/gateway.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, instrument, warn};

use shared_config::AppConfig;

use crate::models::{CheckoutSession, CheckoutSessionRequest, PaymentError};

/// Hosted checkout provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError>;

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError>;

    /// Closes an open session so it can no longer be paid.
    async fn expire_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError>;
}

/// Stripe Checkout over its form-encoded REST API.
pub struct StripeCheckoutClient {
    client: Client,
    base_url: String,
    secret_key: String,
    success_url: String,
    cancel_url: String,
}

impl StripeCheckoutClient {
    pub fn new(config: &AppConfig) -> Self {
        let timeout = Duration::from_secs(config.payment_request_timeout_secs.max(1));
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            warn!("Failed to build payment HTTP client with timeout ({}), using defaults", e);
            Client::new()
        });

        Self {
            client,
            base_url: config.stripe_api_base_url.trim_end_matches('/').to_string(),
            secret_key: config.stripe_secret_key.clone(),
            success_url: config.checkout_success_url.clone(),
            cancel_url: config.checkout_cancel_url.clone(),
        }
    }

    fn session_form(&self, request: &CheckoutSessionRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            ("client_reference_id".to_string(), request.payment_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("line_items[0][price_data][currency]".to_string(), request.currency.clone()),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                request.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.description.clone(),
            ),
        ];

        for (key, value) in request.metadata() {
            form.push((format!("metadata[{}]", key), value.clone()));
            form.push((format!("payment_intent_data[metadata][{}]", key), value));
        }

        form
    }

    async fn parse_session(response: reqwest::Response) -> Result<CheckoutSession, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Payment processor error ({}): {}", status, body);
            return Err(PaymentError::ExternalService(format!(
                "processor responded with {}",
                status
            )));
        }

        response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| PaymentError::ExternalService(format!("unreadable processor response: {}", e)))
    }
}

fn transport_error(e: reqwest::Error) -> PaymentError {
    if e.is_timeout() {
        PaymentError::ExternalService("payment processor timed out".to_string())
    } else {
        PaymentError::ExternalService(format!("payment processor unreachable: {}", e))
    }
}

#[async_trait]
impl PaymentGateway for StripeCheckoutClient {
    #[instrument(skip(self, request), fields(payment_id = %request.payment_id))]
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError> {
        let url = format!("{}/checkout/sessions", self.base_url);
        debug!("Creating checkout session for {} {}", request.amount_cents, request.currency);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&self.session_form(request))
            .send()
            .await
            .map_err(transport_error)?;

        Self::parse_session(response).await
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError> {
        let url = format!("{}/checkout/sessions/{}", self.base_url, session_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PaymentError::UnknownPaymentReference(session_id.to_string()));
        }

        Self::parse_session(response).await
    }

    #[instrument(skip(self))]
    async fn expire_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, PaymentError> {
        let url = format!("{}/checkout/sessions/{}/expire", self.base_url, session_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PaymentError::UnknownPaymentReference(session_id.to_string()));
        }

        Self::parse_session(response).await
    }
}
