//! Router tests over in-memory adapters

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use core_kernel::{Currency, Money, Timezone, UserId};
use domain_billing::ports::mock::{
    MockBillingStore, MockNotifier, MockPaymentGateway, MockStaffDirectory,
};
use domain_billing::{
    ChargeOutcome, Client, Invoice, InvoiceItem, Role, ServiceType, StaffUser,
};
use domain_care::ports::mock::MockVisitNoteStore;
use interface_api::auth::create_token;
use interface_api::config::ApiConfig;
use interface_api::{create_router, Adapters, AppState};

const SECRET: &str = "api-test-secret";

struct TestApp {
    router: Router,
    store: Arc<MockBillingStore>,
    gateway: Arc<MockPaymentGateway>,
    notifier: Arc<MockNotifier>,
    client: Client,
    invoice: Invoice,
}

async fn app() -> TestApp {
    let store = Arc::new(MockBillingStore::new());
    let gateway = Arc::new(MockPaymentGateway::new());
    let notifier = Arc::new(MockNotifier::new());
    let staff = Arc::new(MockStaffDirectory::with_users(vec![StaffUser {
        id: UserId::new(),
        full_name: "Dana Admin".to_string(),
        email: "dana@agency.example".to_string(),
        role: Role::Admin,
    }]));

    let client = Client::new("Walter Hughes").with_email("walter@example.com");
    let invoice = Invoice::new(
        client.id,
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
        Currency::USD,
    )
    .with_item(
        InvoiceItem::new(
            "Companionship visits",
            ServiceType::Companionship,
            Money::new(dec!(40.00), Currency::USD),
        )
        .with_quantity(dec!(5)),
    )
    .unwrap();
    store.insert_client(client.clone()).await;
    store.insert_invoice(invoice.clone()).await;

    let config = ApiConfig {
        jwt_secret: SECRET.to_string(),
        agency_name: "Sunrise Home Care".to_string(),
        agency_timezone: Timezone::default(),
        ..Default::default()
    };
    let adapters = Adapters {
        billing_store: store.clone(),
        gateway: gateway.clone(),
        notifier: notifier.clone(),
        staff,
        visit_notes: Arc::new(MockVisitNoteStore::with_clients([client.id])),
    };

    TestApp {
        router: create_router(AppState::new(config, adapters)),
        store,
        gateway,
        notifier,
        client,
        invoice,
    }
}

fn token(role: &str) -> String {
    create_token(&format!("USR-{}", Uuid::new_v4()), vec![role.to_string()], SECRET, 300).unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn decimal(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

fn payment_body(app: &TestApp, amount: &str) -> Value {
    json!({
        "client_id": app.client.id.to_string(),
        "invoice_id": app.invoice.id.to_string(),
        "amount": amount,
        "payment_method_id": "pm_card_visa",
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app().await;
    let (status, body) = send(&app.router, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app.router, request(Method::GET, "/health/ready", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_api_requires_token() {
    let app = app().await;
    let (status, body) = send(
        &app.router,
        request(Method::POST, "/api/v1/payments", None, Some(payment_body(&app, "50.00"))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(app.gateway.charge_count().await, 0);
}

#[tokio::test]
async fn test_successful_payment_returns_balance() {
    let app = app().await;
    let billing = token("billing");

    let (status, body) = send(
        &app.router,
        request(Method::POST, "/api/v1/payments", Some(&billing), Some(payment_body(&app, "50.00"))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(decimal(&body["amount_paid"]), dec!(50));
    assert_eq!(decimal(&body["balance_due"]), dec!(150));
    assert_eq!(body["invoice_status"], "draft");
    assert_eq!(body["attempt_number"], 1);

    // Receipt went to the client
    assert_eq!(app.notifier.sent_to("walter@example.com").await.len(), 1);
}

#[tokio::test]
async fn test_declined_payment_returns_402() {
    let app = app().await;
    app.gateway
        .push_response(Ok(ChargeOutcome::declined(
            Some("pi_declined".to_string()),
            "Your card was declined.",
        )))
        .await;

    let (status, body) = send(
        &app.router,
        request(
            Method::POST,
            "/api/v1/payments",
            Some(&token("billing")),
            Some(payment_body(&app, "200.00")),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["success"], false);
    assert_eq!(body["gateway_status"], "declined");
    assert!(body["payment_id"].is_string());

    // Admin was alerted; invoice untouched
    assert_eq!(app.notifier.sent_to("dana@agency.example").await.len(), 1);
    let (_, invoice) = send(
        &app.router,
        request(
            Method::GET,
            &format!("/api/v1/invoices/{}", app.invoice.id),
            Some(&token("billing")),
            None,
        ),
    )
    .await;
    assert_eq!(decimal(&invoice["amount_paid"]), Decimal::ZERO);
}

#[tokio::test]
async fn test_missing_field_is_bad_request() {
    let app = app().await;
    let mut body = payment_body(&app, "50.00");
    body.as_object_mut().unwrap().remove("payment_method_id");

    let (status, response) = send(
        &app.router,
        request(Method::POST, "/api/v1/payments", Some(&token("billing")), Some(body)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "bad_request");
    assert_eq!(app.gateway.charge_count().await, 0);
}

#[tokio::test]
async fn test_unknown_invoice_is_not_found() {
    let app = app().await;
    let body = json!({
        "client_id": app.client.id.to_string(),
        "invoice_id": Uuid::new_v4().to_string(),
        "amount": "10",
        "payment_method_id": "pm_card_visa",
    });
    let (status, _) = send(
        &app.router,
        request(Method::POST, "/api/v1/payments", Some(&token("billing")), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_caregiver_cannot_take_payments() {
    let app = app().await;
    let (status, _) = send(
        &app.router,
        request(
            Method::POST,
            "/api/v1/payments",
            Some(&token("caregiver")),
            Some(payment_body(&app, "50.00")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_payment_history_lists_attempts() {
    let app = app().await;
    let billing = token("billing");
    send(
        &app.router,
        request(Method::POST, "/api/v1/payments", Some(&billing), Some(payment_body(&app, "25"))),
    )
    .await;

    let (status, body) = send(
        &app.router,
        request(
            Method::GET,
            &format!("/api/v1/invoices/{}/payments", app.invoice.id),
            Some(&billing),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let payments = body.as_array().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["status"], "completed");
    assert_eq!(app.store.payments().await.len(), 1);
}

#[tokio::test]
async fn test_send_invoice_is_admin_only() {
    let app = app().await;
    let uri = format!("/api/v1/invoices/{}/send", app.invoice.id);

    let (status, _) = send(&app.router, request(Method::POST, &uri, Some(&token("billing")), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app.router, request(Method::POST, &uri, Some(&token("admin")), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recipient"], "walter@example.com");
    assert_eq!(body["status"], "sent");
    assert_eq!(app.notifier.sent_to("walter@example.com").await.len(), 1);
}

#[tokio::test]
async fn test_visit_note_submission_and_drafts() {
    let app = app().await;
    let caregiver = token("caregiver");
    let draft_uri = format!("/api/v1/visit-notes/draft?client_id={}", app.client.id.as_uuid());

    let (status, _) = send(
        &app.router,
        request(Method::PUT, &draft_uri, Some(&caregiver), Some(json!({"notes": "in progress"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, draft) = send(&app.router, request(Method::GET, &draft_uri, Some(&caregiver), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(draft["form"]["notes"], "in progress");

    let yesterday = Timezone::default().today() - Duration::days(1);
    let note = json!({
        "client_id": app.client.id.as_uuid(),
        "visit_date": yesterday,
        "start_time": "09:00:00",
        "end_time": "11:00:00",
        "tasks_performed": ["Meal preparation"],
        "vitals": { "pulse": 72 },
    });
    let (status, created) = send(
        &app.router,
        request(Method::POST, "/api/v1/visit-notes", Some(&caregiver), Some(note)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "submitted");

    // Submission discarded the draft
    let (status, _) = send(&app.router, request(Method::GET, &draft_uri, Some(&caregiver), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, fetched) = send(
        &app.router,
        request(
            Method::GET,
            &format!("/api/v1/visit-notes/{}", created["id"].as_str().unwrap()),
            Some(&caregiver),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["tasks_performed"][0], "Meal preparation");
}

#[tokio::test]
async fn test_invalid_visit_note_lists_field_errors() {
    let app = app().await;
    let note = json!({
        "client_id": app.client.id.as_uuid(),
        "visit_date": (Utc::now() - Duration::days(2)).date_naive(),
        "start_time": "09:00:00",
        "end_time": "10:00:00",
        "tasks_performed": [],
        "vitals": { "pulse": 400 },
    });

    let (status, body) = send(
        &app.router,
        request(Method::POST, "/api/v1/visit-notes", Some(&token("caregiver")), Some(note)),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    let details: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d.as_str().unwrap())
        .collect();
    assert!(details.iter().any(|d| d.starts_with("tasks_performed")));
    assert!(details.iter().any(|d| d.starts_with("vitals")));
}

#[tokio::test]
async fn test_discarding_missing_draft_is_not_found() {
    let app = app().await;
    let uri = format!("/api/v1/visit-notes/draft?client_id={}", Uuid::new_v4());
    let (status, _) = send(&app.router, request(Method::DELETE, &uri, Some(&token("caregiver")), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_visit_note_for_unknown_client_is_unprocessable() {
    let app = app().await;
    let note = json!({
        "client_id": Uuid::new_v4(),
        "visit_date": Timezone::default().today() - Duration::days(1),
        "start_time": "09:00:00",
        "end_time": "11:00:00",
        "tasks_performed": ["Meal preparation"],
    });

    let (status, body) = send(
        &app.router,
        request(Method::POST, "/api/v1/visit-notes", Some(&token("caregiver")), Some(note)),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}
