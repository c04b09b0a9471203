//! Router tests against in-memory connectors.

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::AUTHORIZATION},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;

use hirebill_connectors::WebhookVerifier;
use hirebill_core::auth::{
    AdminCredential, InMemoryAttemptStore, LoginRateLimiter, RateLimitPolicy, hash_password,
};
use hirebill_core::gateway::{
    Board, CapturedPayment, ChargeOutcome, CheckoutRequest, CheckoutSession, ExternalSystem,
    HirePlatform, NewDeposit, PaymentProcessor, RefundApplication, RefundReceipt,
    SavedCardCharge, StatusColumn, UpstreamError,
};
use hirebill_core::hold::{ExternalHold, HoldKind, HoldStatus};
use hirebill_core::orchestrator::{OrchestratorPolicy, PaymentOrchestrator};
use hirebill_core::sync_record::{BoardUpdate, SyncRecord};
use hirebill_shared::types::{BoardItemId, DepositId, HoldId, JobId, PaymentId};
use hirebill_shared::{SessionConfig, SessionTokenService};

use crate::routes::webhooks::SIGNATURE_HEADER;
use crate::{AppState, Connectors, create_router};

const PASSWORD: &str = "correct horse battery";
const WEBHOOK_SECRET: &str = "whsec_test";

// ============================================================================
// Mocks
// ============================================================================

#[derive(Default)]
struct MockHire {
    deposits: Mutex<Vec<NewDeposit>>,
    notes: Mutex<Vec<String>>,
}

impl HirePlatform for MockHire {
    async fn fetch_job(&self, job_id: &JobId) -> Result<Value, UpstreamError> {
        if job_id.as_str() != "1042" {
            return Ok(Value::Null);
        }
        Ok(json!({
            "job_id": "1042",
            "customer_name": "Acme Ltd",
            "email": "ops@acme.test",
            "job_start": "2025-06-10T08:00:00Z",
            "job_end": "2025-06-13T08:00:00Z",
            "status": 1,
            "items": [{ "category": "Van", "qty": 1 }]
        }))
    }

    async fn fetch_billing(&self, _job_id: &JobId) -> Result<Vec<Value>, UpstreamError> {
        let mut rows = vec![json!({ "kind": 0, "id": "1", "total_ex_tax": "1000.00" })];
        for (i, deposit) in self.deposits.lock().unwrap().iter().enumerate() {
            rows.push(json!({
                "kind": 6,
                "id": (100 + i).to_string(),
                "date": deposit.date.to_string(),
                "desc": deposit.description,
                "credit": deposit.amount.to_string(),
            }));
        }
        Ok(rows)
    }

    async fn create_deposit(&self, deposit: NewDeposit) -> Result<DepositId, UpstreamError> {
        let mut deposits = self.deposits.lock().unwrap();
        deposits.push(deposit);
        Ok(DepositId::new((99 + deposits.len()).to_string()))
    }

    async fn create_refund_application(
        &self,
        _application: RefundApplication,
    ) -> Result<String, UpstreamError> {
        Ok("app_1".to_string())
    }

    async fn append_note(&self, _job_id: &JobId, note: &str) -> Result<(), UpstreamError> {
        self.notes.lock().unwrap().push(note.to_string());
        Ok(())
    }

    async fn update_job_status(&self, _job_id: &JobId, _status: i64) -> Result<(), UpstreamError> {
        Ok(())
    }

    async fn trigger_accounting_sync(
        &self,
        _job_id: &JobId,
        _deposit_id: &DepositId,
    ) -> Result<(), UpstreamError> {
        Ok(())
    }
}

#[derive(Default)]
struct MockPayments {
    cancelled: Mutex<Vec<HoldId>>,
}

impl PaymentProcessor for MockPayments {
    async fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, UpstreamError> {
        Ok(CheckoutSession {
            id: format!("cs_{}", request.kind),
            url: "https://pay.example/cs_1".to_string(),
        })
    }

    async fn retrieve_hold(&self, hold_id: &HoldId) -> Result<Option<ExternalHold>, UpstreamError> {
        if hold_id.as_str() != "pi_hold" {
            return Ok(None);
        }
        Ok(Some(ExternalHold {
            id: hold_id.clone(),
            kind: HoldKind::ManualCapture,
            status: HoldStatus::Created,
            authorized_amount: dec!(1200),
            job_id: Some(JobId::new("1042")),
            customer_id: None,
            payment_method_id: None,
        }))
    }

    async fn capture_hold(
        &self,
        hold_id: &HoldId,
        amount: Decimal,
    ) -> Result<CapturedPayment, UpstreamError> {
        Ok(CapturedPayment {
            payment_id: PaymentId::new(hold_id.as_str()),
            amount,
        })
    }

    async fn charge_saved_card(
        &self,
        _charge: SavedCardCharge,
    ) -> Result<ChargeOutcome, UpstreamError> {
        Ok(ChargeOutcome::AuthenticationRequired)
    }

    async fn cancel_hold(&self, hold_id: &HoldId) -> Result<(), UpstreamError> {
        self.cancelled.lock().unwrap().push(hold_id.clone());
        Ok(())
    }

    async fn refund(
        &self,
        _payment_id: &PaymentId,
        _amount: Decimal,
        _reason: &str,
    ) -> Result<RefundReceipt, UpstreamError> {
        Err(UpstreamError::http(ExternalSystem::Payments, 500, "unavailable"))
    }
}

struct MockBoard;

impl Board for MockBoard {
    async fn find_item(&self, job_id: &JobId) -> Result<Option<SyncRecord>, UpstreamError> {
        Ok((job_id.as_str() == "1042").then(|| SyncRecord {
            item_id: BoardItemId::new("9001"),
            name: "Acme Ltd".to_string(),
            deposit_status: None,
            excess_status: None,
        }))
    }

    async fn set_status(
        &self,
        _item_id: &BoardItemId,
        _column: StatusColumn,
        _label: &str,
    ) -> Result<(), UpstreamError> {
        Ok(())
    }

    async fn post_update(&self, _item_id: &BoardItemId, _body: &str) -> Result<(), UpstreamError> {
        Ok(())
    }

    async fn list_updates(&self, _item_id: &BoardItemId) -> Result<Vec<BoardUpdate>, UpstreamError> {
        Ok(Vec::new())
    }
}

struct MockConnectors;

impl Connectors for MockConnectors {
    type Hire = MockHire;
    type Payments = MockPayments;
    type Board = MockBoard;
}

// ============================================================================
// Fixtures
// ============================================================================

struct TestApp {
    router: Router,
    state: AppState<MockConnectors>,
    hire: Arc<MockHire>,
    payments: Arc<MockPayments>,
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 9, 12, 0, 0).unwrap()
}

fn app() -> TestApp {
    let hire = Arc::new(MockHire::default());
    let payments = Arc::new(MockPayments::default());
    let orchestrator = PaymentOrchestrator::new(
        Arc::clone(&hire),
        Arc::clone(&payments),
        Arc::new(MockBoard),
        OrchestratorPolicy::default(),
    )
    .with_clock(now);

    let state = AppState {
        orchestrator,
        sessions: Arc::new(SessionTokenService::new(SessionConfig {
            secret: "test-session-secret".to_string(),
            ttl_secs: 3600,
        })),
        admin: Arc::new(AdminCredential::from_hash(hash_password(PASSWORD).unwrap()).unwrap()),
        login_limiter: LoginRateLimiter::new(
            Arc::new(InMemoryAttemptStore::default()),
            RateLimitPolicy {
                max_attempts: 2,
                window: Duration::minutes(15),
                lockout: Duration::minutes(15),
            },
        ),
        webhooks: Arc::new(WebhookVerifier::new(WEBHOOK_SECRET, 300)),
    };

    TestApp {
        router: create_router(state.clone()),
        state,
        hire,
        payments,
    }
}

impl TestApp {
    fn token(&self) -> String {
        self.state.sessions.issue().unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn post_authed(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {}", self.token()))
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn login(&self, password: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header("Content-Type", "application/json")
            .body(Body::from(json!({ "password": password }).to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn webhook(&self, event: &Value) -> (StatusCode, Value) {
        let body = event.to_string();
        let header = self
            .state
            .webhooks
            .signature_header(Utc::now().timestamp(), body.as_bytes());
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/payments")
            .header(SIGNATURE_HEADER, header)
            .header("Content-Type", "application/json")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }
}

fn checkout_completed(kind: &str, amount_minor: i64) -> Value {
    json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_live_1",
            "amount_total": amount_minor,
            "payment_status": "paid",
            "payment_intent": "pi_dep",
            "metadata": { "job_id": "1042", "kind": kind }
        }}
    })
}

// ============================================================================
// Public routes
// ============================================================================

#[tokio::test]
async fn test_health() {
    let app = app();
    let request = Request::builder()
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_login_issues_valid_token() {
    let app = app();
    let (status, body) = app.login(PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expires_in"], 3600);

    let token = body["token"].as_str().unwrap();
    assert!(app.state.sessions.validate(token).unwrap().is_admin());
}

#[tokio::test]
async fn test_login_locks_out_after_repeated_failures() {
    let app = app();
    let (status, body) = app.login("wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");

    app.login("wrong").await;
    let (status, body) = app.login(PASSWORD).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["retry_after_secs"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_wrong_method_is_rejected() {
    let app = app();
    let request = Request::builder()
        .uri("/api/v1/auth/login")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

// ============================================================================
// Protected routes
// ============================================================================

#[tokio::test]
async fn test_snapshot_requires_session() {
    let app = app();
    let request = Request::builder()
        .uri("/api/v1/jobs/1042/snapshot")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/v1/jobs/1042/snapshot")
        .header(AUTHORIZATION, "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_snapshot() {
    let app = app();
    let request = Request::builder()
        .uri("/api/v1/jobs/1042/snapshot")
        .header(AUTHORIZATION, format!("Bearer {}", app.token()))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job_id"], "1042");
    assert_eq!(body["customer_name"], "Acme Ltd");
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = app();
    let request = Request::builder()
        .uri("/api/v1/jobs/9999/snapshot")
        .header(AUTHORIZATION, format!("Bearer {}", app.token()))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_create_hold_returns_checkout() {
    let app = app();
    let (status, body) = app.post_authed("/api/v1/jobs/1042/holds", json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["checkout_url"], "https://pay.example/cs_1");
}

#[tokio::test]
async fn test_release_requires_reason() {
    let app = app();
    let (status, body) = app
        .post_authed("/api/v1/holds/pi_hold/release", json!({ "reason": "  " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert!(app.payments.cancelled.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_release_cancels_hold() {
    let app = app();
    let (status, _) = app
        .post_authed(
            "/api/v1/holds/pi_hold/release",
            json!({ "reason": "vehicle returned clean" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        *app.payments.cancelled.lock().unwrap(),
        vec![HoldId::new("pi_hold")]
    );
}

#[tokio::test]
async fn test_refund_over_deposit_is_business_rule() {
    let app = app();
    app.hire.deposits.lock().unwrap().push(NewDeposit {
        job_id: JobId::new("1042"),
        amount: dec!(300),
        description: "Hire deposit".to_string(),
        date: now().date_naive(),
        reference: None,
    });
    let (status, body) = app
        .post_authed(
            "/api/v1/jobs/1042/refunds",
            json!({ "deposit_id": "100", "amount": "500.00", "reason": "goodwill" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "BUSINESS_RULE_VIOLATION");
}

// ============================================================================
// Webhook
// ============================================================================

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/payments")
        .header(SIGNATURE_HEADER, "t=1,v1=deadbeef")
        .body(Body::from(checkout_completed("deposit", 25_000).to_string()))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_WEBHOOK_SIGNATURE");
    assert!(app.hire.deposits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_webhook_records_deposit_once() {
    let app = app();
    let event = checkout_completed("deposit", 25_000);

    let (status, body) = app.webhook(&event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    {
        let deposits = app.hire.deposits.lock().unwrap();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].amount, dec!(250));
        assert_eq!(deposits[0].reference.as_deref(), Some("pi_dep"));
    }

    let (status, _) = app.webhook(&event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.hire.deposits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_webhook_acknowledges_other_events() {
    let app = app();
    let (status, body) = app
        .webhook(&json!({ "type": "customer.created", "data": { "object": {} } }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert!(app.hire.notes.lock().unwrap().is_empty());
}
