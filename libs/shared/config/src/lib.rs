use std::env;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub port: u16,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base_url: String,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub payment_currency: String,
    pub payment_request_timeout_secs: u64,
    /// `scheduled_only` or `include_awaiting_payment`
    pub conflict_scope: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using default", name);
        default.to_string()
    })
}

fn var_or_empty(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using empty value", name);
        String::new()
    })
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            environment: Environment::parse(&var_or("APP_ENV", "development")),
            port: var_or("PORT", "3000").parse().unwrap_or_else(|_| {
                warn!("PORT is not a valid port number, using 3000");
                3000
            }),
            supabase_url: var_or_empty("SUPABASE_URL"),
            supabase_anon_key: var_or_empty("SUPABASE_ANON_PUBLIC_KEY"),
            supabase_service_role_key: var_or_empty("SUPABASE_SERVICE_ROLE_KEY"),
            supabase_jwt_secret: var_or_empty("SUPABASE_JWT_SECRET"),
            stripe_secret_key: var_or_empty("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: var_or_empty("STRIPE_WEBHOOK_SECRET"),
            stripe_api_base_url: var_or("STRIPE_API_BASE_URL", "https://api.stripe.com/v1"),
            checkout_success_url: var_or(
                "CHECKOUT_SUCCESS_URL",
                "http://localhost:5173/payment/success?session_id={CHECKOUT_SESSION_ID}",
            ),
            checkout_cancel_url: var_or(
                "CHECKOUT_CANCEL_URL",
                "http://localhost:5173/payment/cancelled",
            ),
            payment_currency: var_or("PAYMENT_CURRENCY", "usd").to_ascii_lowercase(),
            payment_request_timeout_secs: var_or("PAYMENT_REQUEST_TIMEOUT_SECS", "10")
                .parse()
                .unwrap_or_else(|_| {
                    warn!("PAYMENT_REQUEST_TIMEOUT_SECS is not a number, using 10");
                    10
                }),
            conflict_scope: var_or("CONFLICT_SCOPE", "scheduled_only"),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        if config.is_production() && config.stripe_webhook_secret.is_empty() {
            warn!("STRIPE_WEBHOOK_SECRET is empty in production - all webhooks will be refused");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_payments_configured(&self) -> bool {
        !self.stripe_secret_key.is_empty() && !self.stripe_api_base_url.is_empty()
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Webhook signatures may only be skipped in development with no secret configured.
    pub fn skip_webhook_verification(&self) -> bool {
        !self.is_production() && self.stripe_webhook_secret.is_empty()
    }
}
