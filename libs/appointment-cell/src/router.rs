// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::models::{BookingSettings, ConflictScope};
use crate::services::booking::AppointmentBookingService;
use crate::services::store::StoreProvider;

#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub stores: Arc<dyn StoreProvider>,
    pub notifier: NotificationDispatcher,
}

impl AppointmentState {
    pub fn new(config: Arc<AppConfig>, stores: Arc<dyn StoreProvider>, notifier: NotificationDispatcher) -> Self {
        Self {
            config,
            stores,
            notifier,
        }
    }

    pub fn settings(&self) -> BookingSettings {
        BookingSettings {
            currency: self.config.payment_currency.clone(),
            conflict_scope: ConflictScope::parse(&self.config.conflict_scope),
        }
    }

    /// A state machine bound to the caller's credentials.
    pub fn booking_service(&self, auth_token: &str) -> AppointmentBookingService {
        AppointmentBookingService::new(
            self.stores.for_user(auth_token),
            self.notifier.clone(),
            self.settings(),
        )
    }
}

pub fn appointment_routes(state: AppointmentState) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::request_appointment))
        .route("/conflicts/check", get(handlers::check_appointment_conflicts))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/accept", post(handlers::accept_appointment))
        .route("/{appointment_id}/reject", post(handlers::reject_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
