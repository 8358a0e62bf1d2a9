pub mod checkout;
pub mod gateway;
pub mod reconciliation;
pub mod webhook;

pub use checkout::PaymentSessionManager;
pub use gateway::{PaymentGateway, StripeCheckoutClient};
pub use reconciliation::PaymentReconciliationService;
pub use webhook::{PaymentWebhookService, WebhookVerifier, SIGNATURE_TOLERANCE_SECS};
