// libs/payment-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use appointment_cell::models::{BookingSettings, ConflictScope};
use appointment_cell::services::StoreProvider;
use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::{
    PaymentGateway, PaymentReconciliationService, PaymentSessionManager, PaymentWebhookService,
    WebhookVerifier,
};

#[derive(Clone)]
pub struct PaymentState {
    pub config: Arc<AppConfig>,
    pub stores: Arc<dyn StoreProvider>,
    pub notifier: NotificationDispatcher,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl PaymentState {
    pub fn new(
        config: Arc<AppConfig>,
        stores: Arc<dyn StoreProvider>,
        notifier: NotificationDispatcher,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            config,
            stores,
            notifier,
            gateway,
        }
    }

    fn settings(&self) -> BookingSettings {
        BookingSettings {
            currency: self.config.payment_currency.clone(),
            conflict_scope: ConflictScope::parse(&self.config.conflict_scope),
        }
    }

    /// Payment rows are written with the service role; ownership is checked
    /// against the caller by the manager itself.
    pub fn session_manager(&self) -> PaymentSessionManager {
        PaymentSessionManager::new(
            self.stores.service(),
            Arc::clone(&self.gateway),
            &self.config.payment_currency,
        )
    }

    pub fn reconciliation_service(&self) -> PaymentReconciliationService {
        PaymentReconciliationService::new(
            self.stores.service(),
            Arc::clone(&self.gateway),
            self.notifier.clone(),
            self.settings(),
        )
    }

    pub fn webhook_service(&self) -> PaymentWebhookService {
        let verifier = if self.config.skip_webhook_verification() {
            None
        } else {
            Some(WebhookVerifier::new(&self.config.stripe_webhook_secret))
        };

        PaymentWebhookService::new(verifier, self.reconciliation_service())
    }
}

pub fn payment_routes(state: PaymentState) -> Router {
    // Checkout and verify act on behalf of an authenticated client
    let protected_routes = Router::new()
        .route("/checkout", post(handlers::create_checkout_session))
        .route("/verify", post(handlers::verify_payment))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    // The processor authenticates with its signature instead of a JWT
    let public_routes = Router::new().route("/webhook", post(handlers::handle_webhook));

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .with_state(state)
}
