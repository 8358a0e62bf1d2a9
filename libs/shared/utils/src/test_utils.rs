use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::{AppConfig, Environment};
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub stripe_api_base_url: String,
    pub stripe_webhook_secret: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            stripe_api_base_url: "http://localhost:12111/v1".to_string(),
            stripe_webhook_secret: "whsec_test_secret".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            environment: Environment::Development,
            port: 3000,
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            stripe_secret_key: "sk_test_123".to_string(),
            stripe_webhook_secret: self.stripe_webhook_secret.clone(),
            stripe_api_base_url: self.stripe_api_base_url.clone(),
            checkout_success_url: "http://localhost:5173/payment/success?session_id={CHECKOUT_SESSION_ID}".to_string(),
            checkout_cancel_url: "http://localhost:5173/payment/cancelled".to_string(),
            payment_currency: "usd".to_string(),
            payment_request_timeout_secs: 5,
            conflict_scope: "scheduled_only".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "client".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn client(email: &str) -> Self {
        Self::new(email, "client")
    }

    pub fn lawyer(email: &str) -> Self {
        Self::new(email, "lawyer")
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).unwrap_or_default()
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some("authenticated".to_string()),
            metadata: Some(json!({ "role": self.role })),
            created_at: Some(Utc::now()),
        }
    }
}

type HmacSha256 = Hmac<Sha256>;

fn sign(secret: &str, message: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "user_metadata": { "role": user.role },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(sign(secret, &signing_input));

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }
}

pub struct WebhookTestUtils;

impl WebhookTestUtils {
    /// Builds a `Stripe-Signature` header value for `payload`.
    pub fn signature_header(payload: &str, secret: &str, timestamp: i64) -> String {
        let signature = hex::encode(sign(secret, &format!("{}.{}", timestamp, payload)));
        format!("t={},v1={}", timestamp, signature)
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn lawyer_response(lawyer_id: &str, hourly_rate_cents: i64) -> serde_json::Value {
        json!({
            "id": lawyer_id,
            "full_name": "Test Lawyer",
            "hourly_rate_cents": hourly_rate_cents,
            "is_available": true
        })
    }

    pub fn appointment_response(
        appointment_id: &str,
        client_id: &str,
        lawyer_id: &str,
        case_id: &str,
        start_time: DateTime<Utc>,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "client_id": client_id,
            "lawyer_id": lawyer_id,
            "case_id": case_id,
            "start_time": start_time.to_rfc3339(),
            "duration_minutes": 60,
            "status": status,
            "notes": null,
            "cancellation_reason": null,
            "cancelled_by": null,
            "created_at": "2024-01-01T00:00:00Z",
            "responded_at": null,
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn case_response(case_id: &str, client_id: &str, lawyer_id: &str, status: &str) -> serde_json::Value {
        json!({
            "id": case_id,
            "client_id": client_id,
            "lawyer_id": lawyer_id,
            "title": "Tenancy dispute",
            "description": "Landlord withholding deposit",
            "category": "housing",
            "status": status,
            "hourly_rate_cents": 12000,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
