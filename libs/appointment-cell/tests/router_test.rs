use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::models::LawyerProfile;
use appointment_cell::services::InMemoryConsultationStore;
use appointment_cell::{appointment_routes, AppointmentState};
use notification_cell::{Notification, NotificationDispatcher, NotificationKind};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    app: Router,
    outbox: UnboundedReceiver<Notification>,
    config: TestConfig,
    client: TestUser,
    lawyer: TestUser,
}

fn create_test_app() -> TestApp {
    let config = TestConfig::default();
    let store = InMemoryConsultationStore::new();
    let client = TestUser::client("client@example.com");
    let lawyer = TestUser::lawyer("lawyer@example.com");
    store.seed_lawyer(LawyerProfile {
        id: lawyer.uuid(),
        hourly_rate_cents: 12_000,
        is_available: true,
    });

    let (notifier, outbox) = NotificationDispatcher::channel();
    let state = AppointmentState::new(config.to_arc(), Arc::new(store), notifier);

    TestApp {
        app: appointment_routes(state),
        outbox,
        config,
        client,
        lawyer,
    }
}

impl TestApp {
    fn token(&self, user: &TestUser) -> String {
        JwtTestUtils::create_test_token(user, &self.config.jwt_secret, None)
    }

    async fn send(&self, method: &str, uri: &str, user: &TestUser, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", self.token(user)));

        let body = match body {
            Some(value) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn request_consultation(&self, hours_from_now: i64) -> String {
        let start = Utc::now() + Duration::hours(hours_from_now);
        let (status, body) = self
            .send(
                "POST",
                "/",
                &self.client,
                Some(json!({
                    "lawyer_id": self.lawyer.id,
                    "case": { "title": "Employment contract review", "description": null, "category": "employment" },
                    "start_time": start,
                    "duration_minutes": 60,
                    "notes": "Please review clause 7"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["appointment"]["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let test = create_test_app();

    let request = Request::builder()
        .method("GET")
        .uri(format!("/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let response = test.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let test = create_test_app();
    let token = JwtTestUtils::create_expired_token(&test.client, &test.config.jwt_secret);

    let request = Request::builder()
        .method("GET")
        .uri(format!("/{}", Uuid::new_v4()))
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = test.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_then_accept_over_http() {
    let mut test = create_test_app();
    let appointment_id = test.request_consultation(48).await;

    let (status, body) = test
        .send("GET", &format!("/{}", appointment_id), &test.lawyer, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["notes"], "Please review clause 7");

    let (status, body) = test
        .send("POST", &format!("/{}/accept", appointment_id), &test.lawyer, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert_eq!(body["appointment"]["status"], "awaiting_payment");
    assert_eq!(body["payment"]["amount_cents"], 12_000);
    assert_eq!(body["payment"]["status"], "pending");

    let (status, body) = test
        .send("POST", &format!("/{}/accept", appointment_id), &test.lawyer, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], false);

    let mut kinds = Vec::new();
    while let Ok(notification) = test.outbox.try_recv() {
        kinds.push(notification.kind);
    }
    assert_eq!(
        kinds,
        vec![NotificationKind::AppointmentRequested, NotificationKind::AppointmentAccepted]
    );
}

#[tokio::test]
async fn test_client_cannot_accept_and_strangers_cannot_read() {
    let test = create_test_app();
    let appointment_id = test.request_consultation(24).await;

    let (status, _) = test
        .send("POST", &format!("/{}/accept", appointment_id), &test.client, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let stranger = TestUser::client("stranger@example.com");
    let (status, _) = test
        .send("GET", &format!("/{}", appointment_id), &stranger, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_reject_then_accept_conflicts() {
    let test = create_test_app();
    let appointment_id = test.request_consultation(30).await;

    let (status, body) = test
        .send("POST", &format!("/{}/reject", appointment_id), &test.lawyer, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "rejected");

    let (status, body) = test
        .send("POST", &format!("/{}/accept", appointment_id), &test.lawyer, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_cancel_of_pending_request_conflicts_with_or_without_body() {
    let test = create_test_app();
    let appointment_id = test.request_consultation(30).await;

    let (status, _) = test
        .send("POST", &format!("/{}/cancel", appointment_id), &test.client, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = test
        .send(
            "POST",
            &format!("/{}/cancel", appointment_id),
            &test.client,
            Some(json!({ "reason": "Changed my mind" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_booking_is_a_bad_request() {
    let test = create_test_app();

    let (status, body) = test
        .send(
            "POST",
            "/",
            &test.client,
            Some(json!({
                "lawyer_id": test.lawyer.id,
                "case": { "title": "Late request", "description": null, "category": null },
                "start_time": Utc::now() - Duration::hours(2),
                "duration_minutes": 60,
                "notes": null
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("future"));
}

#[tokio::test]
async fn test_unknown_lawyer_is_not_found() {
    let test = create_test_app();

    let (status, _) = test
        .send(
            "POST",
            "/",
            &test.client,
            Some(json!({
                "lawyer_id": Uuid::new_v4(),
                "case": { "title": "Divorce", "description": null, "category": null },
                "start_time": Utc::now() + Duration::days(3),
                "duration_minutes": 45,
                "notes": null
            })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_conflict_check_reports_tentative_requests() {
    let test = create_test_app();
    let appointment_id = test.request_consultation(72).await;
    let (_, appointment) = test
        .send("GET", &format!("/{}", appointment_id), &test.client, None)
        .await;
    let start = appointment["start_time"].as_str().unwrap().to_string();

    let uri = format!(
        "/conflicts/check?lawyer_id={}&start_time={}&duration_minutes=30",
        test.lawyer.id,
        urlencoding::encode(&start)
    );
    let (status, body) = test.send("GET", &uri, &test.client, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_conflict"], false);
    assert_eq!(body["tentative_overlaps"].as_array().unwrap().len(), 1);
}
