use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::{InMemoryConsultationStore, StoreProvider, SupabaseStoreProvider};
use notification_cell::{
    LogNotificationSink, NotificationDispatcher, NotificationSink, NotificationWorker,
    SupabaseNotificationSink,
};
use payment_cell::services::{PaymentGateway, StripeCheckoutClient};
use shared_config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting LawConnect API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    // Storage and notification delivery
    let stores: Arc<dyn StoreProvider>;
    let sink: Arc<dyn NotificationSink>;
    if config.is_configured() {
        stores = Arc::new(SupabaseStoreProvider::new(&config));
        sink = Arc::new(SupabaseNotificationSink::new(&config));
    } else {
        warn!("Supabase is not configured, using the in-memory store");
        stores = Arc::new(InMemoryConsultationStore::new());
        sink = Arc::new(LogNotificationSink);
    }

    let (notifier, outbox) = NotificationDispatcher::channel();
    tokio::spawn(NotificationWorker::new(outbox, sink).run());

    if !config.is_payments_configured() {
        warn!("Payment processor is not configured, checkout requests will fail");
    }
    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeCheckoutClient::new(&config));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(config.clone(), stores, notifier, gateway)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
