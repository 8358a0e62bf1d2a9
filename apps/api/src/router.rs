use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::services::StoreProvider;
use appointment_cell::{appointment_routes, AppointmentState};
use notification_cell::NotificationDispatcher;
use payment_cell::services::PaymentGateway;
use payment_cell::{payment_routes, PaymentState};
use shared_config::AppConfig;

pub fn create_router(
    config: Arc<AppConfig>,
    stores: Arc<dyn StoreProvider>,
    notifier: NotificationDispatcher,
    gateway: Arc<dyn PaymentGateway>,
) -> Router {
    let appointments = AppointmentState::new(config.clone(), stores.clone(), notifier.clone());
    let payments = PaymentState::new(config, stores, notifier, gateway);

    Router::new()
        .route("/", get(|| async { "LawConnect API is running!" }))
        .nest("/appointments", appointment_routes(appointments))
        .nest("/payments", payment_routes(payments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use appointment_cell::services::InMemoryConsultationStore;
    use payment_cell::services::StripeCheckoutClient;
    use shared_utils::test_utils::TestConfig;

    fn app() -> Router {
        let config = TestConfig::default().to_arc();
        let gateway = Arc::new(StripeCheckoutClient::new(&config));
        let (notifier, _outbox) = NotificationDispatcher::channel();
        create_router(config, Arc::new(InMemoryConsultationStore::new()), notifier, gateway)
    }

    async fn status_of(method: &str, uri: &str) -> StatusCode {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        app().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_liveness_and_nested_routes() {
        assert_eq!(status_of("GET", "/").await, StatusCode::OK);
        assert_eq!(
            status_of("GET", "/appointments/00000000-0000-0000-0000-000000000001").await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of("POST", "/payments/verify").await, StatusCode::UNAUTHORIZED);
        // No signature header
        assert_eq!(status_of("POST", "/payments/webhook").await, StatusCode::UNAUTHORIZED);
    }
}
