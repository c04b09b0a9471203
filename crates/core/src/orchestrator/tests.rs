//! Orchestrator tests against in-memory vendor mocks.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};

use hirebill_shared::types::{BoardItemId, DepositId, HoldId, JobId, PaymentId};

use super::*;
use crate::gateway::{
    Board, CapturedPayment, ChargeOutcome, CheckoutRequest, CheckoutSession, CompletedCheckout,
    ExternalSystem, HirePlatform, NewDeposit, PaymentKind, PaymentProcessor, RefundApplication,
    RefundReceipt, SavedCardCharge, StatusColumn, UpstreamError, status_labels,
};
use crate::hold::{ExternalHold, HoldError, HoldKind, HoldStatus};
use crate::sync_record::{BoardUpdate, SyncRecord};
use crate::timing::TimingError;

// ============================================================================
// Mocks
// ============================================================================

#[derive(Default)]
struct HireState {
    job: Value,
    rows: Vec<Value>,
    notes: Vec<String>,
    statuses: Vec<i64>,
    synced: Vec<DepositId>,
    applications: Vec<RefundApplication>,
    fail_deposits: bool,
    reject_negative_deposits: bool,
    fail_applications: bool,
    next_id: u32,
}

struct MockHire {
    state: Mutex<HireState>,
}

impl MockHire {
    fn new(job: Value, rows: Vec<Value>) -> Self {
        Self {
            state: Mutex::new(HireState {
                job,
                rows,
                next_id: 100,
                ..HireState::default()
            }),
        }
    }

    fn notes(&self) -> Vec<String> {
        self.state.lock().unwrap().notes.clone()
    }

    fn row_count(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }
}

fn hire_error(status: u16) -> UpstreamError {
    UpstreamError::http(ExternalSystem::HirePlatform, status, "rejected")
}

impl HirePlatform for MockHire {
    async fn fetch_job(&self, _job_id: &JobId) -> Result<Value, UpstreamError> {
        Ok(self.state.lock().unwrap().job.clone())
    }

    async fn fetch_billing(&self, _job_id: &JobId) -> Result<Vec<Value>, UpstreamError> {
        Ok(self.state.lock().unwrap().rows.clone())
    }

    async fn create_deposit(&self, deposit: NewDeposit) -> Result<DepositId, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_deposits {
            return Err(hire_error(500));
        }
        if state.reject_negative_deposits && deposit.amount < Decimal::ZERO {
            return Err(hire_error(400));
        }
        state.next_id += 1;
        let id = state.next_id.to_string();
        let description = match &deposit.reference {
            Some(reference) if !deposit.description.contains(reference.as_str()) => {
                format!("{} ({reference})", deposit.description)
            }
            _ => deposit.description.clone(),
        };
        state.rows.push(json!({
            "kind": 6,
            "id": id,
            "date": deposit.date.to_string(),
            "desc": description,
            "credit": deposit.amount.to_string(),
        }));
        Ok(DepositId::new(id))
    }

    async fn create_refund_application(
        &self,
        application: RefundApplication,
    ) -> Result<String, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_applications {
            return Err(hire_error(500));
        }
        state.next_id += 1;
        let id = state.next_id.to_string();
        state.rows.push(json!({
            "kind": 3,
            "id": id,
            "desc": application.description,
            "amount": (-application.amount).to_string(),
            "owner": application.deposit_id.as_str(),
        }));
        state.applications.push(application);
        Ok(id)
    }

    async fn append_note(&self, _job_id: &JobId, note: &str) -> Result<(), UpstreamError> {
        self.state.lock().unwrap().notes.push(note.to_string());
        Ok(())
    }

    async fn update_job_status(&self, _job_id: &JobId, status: i64) -> Result<(), UpstreamError> {
        let mut state = self.state.lock().unwrap();
        state.statuses.push(status);
        state.job["status"] = json!(status);
        Ok(())
    }

    async fn trigger_accounting_sync(
        &self,
        _job_id: &JobId,
        deposit_id: &DepositId,
    ) -> Result<(), UpstreamError> {
        self.state.lock().unwrap().synced.push(deposit_id.clone());
        Ok(())
    }
}

#[derive(Default)]
struct PaymentsState {
    holds: Vec<ExternalHold>,
    checkouts: Vec<CheckoutRequest>,
    captures: Vec<(HoldId, Decimal)>,
    saved_card_charges: Vec<SavedCardCharge>,
    cancelled: Vec<HoldId>,
    refunds: Vec<(PaymentId, Decimal)>,
    require_authentication: bool,
    fail_refunds: bool,
}

#[derive(Default)]
struct MockPayments {
    state: Mutex<PaymentsState>,
}

impl MockPayments {
    fn with_hold(hold: ExternalHold) -> Self {
        let payments = Self::default();
        payments.state.lock().unwrap().holds.push(hold);
        payments
    }
}

impl PaymentProcessor for MockPayments {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        state.checkouts.push(request);
        let id = format!("cs_{}", state.checkouts.len());
        Ok(CheckoutSession {
            url: format!("https://pay.example/{id}"),
            id,
        })
    }

    async fn retrieve_hold(&self, hold_id: &HoldId) -> Result<Option<ExternalHold>, UpstreamError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .holds
            .iter()
            .find(|h| &h.id == hold_id)
            .cloned())
    }

    async fn capture_hold(&self, hold_id: &HoldId, amount: Decimal) -> Result<CapturedPayment, UpstreamError> {
        self.state
            .lock()
            .unwrap()
            .captures
            .push((hold_id.clone(), amount));
        Ok(CapturedPayment {
            payment_id: PaymentId::new(hold_id.as_str()),
            amount,
        })
    }

    async fn charge_saved_card(&self, charge: SavedCardCharge) -> Result<ChargeOutcome, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        if state.require_authentication {
            return Ok(ChargeOutcome::AuthenticationRequired);
        }
        state.saved_card_charges.push(charge);
        Ok(ChargeOutcome::Succeeded {
            payment_id: PaymentId::new("pi_offsession"),
        })
    }

    async fn cancel_hold(&self, hold_id: &HoldId) -> Result<(), UpstreamError> {
        self.state.lock().unwrap().cancelled.push(hold_id.clone());
        Ok(())
    }

    async fn refund(
        &self,
        payment_id: &PaymentId,
        amount: Decimal,
        _reason: &str,
    ) -> Result<RefundReceipt, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_refunds {
            return Err(UpstreamError::http(ExternalSystem::Payments, 402, "charge already refunded"));
        }
        state.refunds.push((payment_id.clone(), amount));
        Ok(RefundReceipt {
            id: format!("re_{}", state.refunds.len()),
            status: "succeeded".to_string(),
        })
    }
}

#[derive(Default)]
struct BoardState {
    item: Option<SyncRecord>,
    updates: Vec<BoardUpdate>,
    statuses: Vec<(StatusColumn, String)>,
    fail_posts: bool,
}

struct MockBoard {
    state: Mutex<BoardState>,
}

impl MockBoard {
    fn with_item() -> Self {
        Self {
            state: Mutex::new(BoardState {
                item: Some(SyncRecord {
                    item_id: BoardItemId::new("9001"),
                    name: "Acme Ltd".to_string(),
                    deposit_status: None,
                    excess_status: None,
                }),
                ..BoardState::default()
            }),
        }
    }

    fn post(&self, body: &str) {
        let mut state = self.state.lock().unwrap();
        let id = state.updates.len().to_string();
        state.updates.push(BoardUpdate {
            id,
            body: body.to_string(),
            created_at: None,
        });
    }

    fn bodies(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .updates
            .iter()
            .map(|u| u.body.clone())
            .collect()
    }

    fn last_status(&self) -> Option<(StatusColumn, String)> {
        self.state.lock().unwrap().statuses.last().cloned()
    }
}

impl Board for MockBoard {
    async fn find_item(&self, _job_id: &JobId) -> Result<Option<SyncRecord>, UpstreamError> {
        Ok(self.state.lock().unwrap().item.clone())
    }

    async fn set_status(
        &self,
        _item_id: &BoardItemId,
        column: StatusColumn,
        label: &str,
    ) -> Result<(), UpstreamError> {
        self.state
            .lock()
            .unwrap()
            .statuses
            .push((column, label.to_string()));
        Ok(())
    }

    async fn post_update(&self, _item_id: &BoardItemId, body: &str) -> Result<(), UpstreamError> {
        if self.state.lock().unwrap().fail_posts {
            return Err(UpstreamError::http(ExternalSystem::Board, 500, "internal error"));
        }
        self.post(body);
        Ok(())
    }

    async fn list_updates(&self, _item_id: &BoardItemId) -> Result<Vec<BoardUpdate>, UpstreamError> {
        Ok(self.state.lock().unwrap().updates.clone())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

type TestOrchestrator = PaymentOrchestrator<MockHire, MockPayments, MockBoard>;

fn job_json(status: i64) -> Value {
    json!({
        "job_id": "1042",
        "customer_name": "Acme Ltd",
        "email": "ops@acme.test",
        "job_start": "2025-06-10T08:00:00Z",
        "job_end": "2025-06-13T08:00:00Z",
        "status": status,
        "items": [{ "category": "Van", "qty": 1 }]
    })
}

fn base_rows() -> Vec<Value> {
    vec![
        json!({ "kind": 0, "id": "1", "total_ex_tax": "1000.00" }),
        json!({ "kind": 6, "id": "10", "date": "2025-06-01", "desc": "Hire deposit", "credit": "300.00" }),
    ]
}

fn excess_rows() -> Vec<Value> {
    let mut rows = base_rows();
    rows.push(json!({
        "kind": 6,
        "id": "e20",
        "date": "2025-06-10",
        "desc": "Excess pre-auth captured pi_old: damage",
        "credit": "1200.00"
    }));
    rows
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
}

struct Harness {
    hire: Arc<MockHire>,
    payments: Arc<MockPayments>,
    board: Arc<MockBoard>,
    orchestrator: TestOrchestrator,
}

fn harness(hire: MockHire, payments: MockPayments, board: MockBoard, now: DateTime<Utc>) -> Harness {
    let hire = Arc::new(hire);
    let payments = Arc::new(payments);
    let board = Arc::new(board);
    let orchestrator = PaymentOrchestrator::new(
        Arc::clone(&hire),
        Arc::clone(&payments),
        Arc::clone(&board),
        OrchestratorPolicy::default(),
    )
    .with_clock(move || now);
    Harness {
        hire,
        payments,
        board,
        orchestrator,
    }
}

fn hold(id: &str, kind: HoldKind, status: HoldStatus, amount: Decimal) -> ExternalHold {
    ExternalHold {
        id: HoldId::new(id),
        kind,
        status,
        authorized_amount: amount,
        job_id: Some(JobId::new("1042")),
        customer_id: Some("cus_1".to_string()),
        payment_method_id: Some("pm_1".to_string()),
    }
}

// ============================================================================
// Holds
// ============================================================================

#[tokio::test]
async fn test_create_hold_in_window() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::default(),
        MockBoard::with_item(),
        at(9, 12),
    );

    let report = h
        .orchestrator
        .create_hold(HoldRequest {
            job_id: JobId::new("1042"),
            amount: None,
        })
        .await
        .unwrap();

    assert_eq!(report.checkout_url.as_deref(), Some("https://pay.example/cs_1"));
    let checkouts = &h.payments.state.lock().unwrap().checkouts;
    assert_eq!(checkouts[0].kind, PaymentKind::ExcessHold);
    assert_eq!(checkouts[0].amount, dec!(1200.00));
    assert_eq!(checkouts[0].customer_email.as_deref(), Some("ops@acme.test"));
    assert_eq!(h.board.bodies(), vec!["PRE-AUTH REQUESTED: cs_1 £1,200.00".to_string()]);
    assert_eq!(
        h.board.last_status(),
        Some((StatusColumn::Excess, status_labels::PRE_AUTH_REQUESTED.to_string()))
    );
}

#[tokio::test]
async fn test_create_hold_too_early_rejected() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::default(),
        MockBoard::with_item(),
        at(1, 12),
    );

    let err = h
        .orchestrator
        .create_hold(HoldRequest {
            job_id: JobId::new("1042"),
            amount: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentActionError::Timing(TimingError::CollectionNotAllowed { .. })));
    assert!(h.payments.state.lock().unwrap().checkouts.is_empty());
}

#[tokio::test]
async fn test_create_hold_rejected_while_one_is_open() {
    let board = MockBoard::with_item();
    board.post("PRE-AUTH COMPLETED: pi_1 £1,200.00");
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::default(),
        board,
        at(10, 9),
    );

    let err = h
        .orchestrator
        .create_hold(HoldRequest {
            job_id: JobId::new("1042"),
            amount: Some(dec!(500)),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentActionError::BusinessRule(_)));
}

#[tokio::test]
async fn test_create_hold_board_failure_is_partial() {
    let board = MockBoard::with_item();
    board.state.lock().unwrap().fail_posts = true;
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::default(),
        board,
        at(9, 12),
    );

    let err = h
        .orchestrator
        .create_hold(HoldRequest {
            job_id: JobId::new("1042"),
            amount: None,
        })
        .await
        .unwrap_err();

    match err {
        PaymentActionError::PartialFailure {
            failed_step,
            completed,
            ..
        } => {
            assert_eq!(failed_step, "record_hold_on_board");
            assert_eq!(completed[0].step, "create_hold_checkout");
            assert_eq!(completed[0].external_id.as_deref(), Some("cs_1"));
        }
        other => panic!("expected partial failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_hold_without_board_item_rejected() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::default(),
        MockBoard {
            state: Mutex::new(BoardState::default()),
        },
        at(9, 12),
    );

    let err = h
        .orchestrator
        .create_hold(HoldRequest {
            job_id: JobId::new("1042"),
            amount: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentActionError::BusinessRule(_)));
    assert!(h.payments.state.lock().unwrap().checkouts.is_empty());
}

#[tokio::test]
async fn test_hold_completion_recorded_once() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::default(),
        MockBoard::with_item(),
        at(9, 12),
    );
    let checkout = CompletedCheckout {
        session_id: "cs_1".to_string(),
        job_id: JobId::new("1042"),
        kind: PaymentKind::ExcessHold,
        amount: dec!(1200),
        payment_id: Some(PaymentId::new("pi_1")),
    };

    h.orchestrator.record_payment(checkout.clone()).await.unwrap();
    let again = h.orchestrator.record_payment(checkout).await.unwrap();

    assert_eq!(h.board.bodies(), vec!["PRE-AUTH COMPLETED: pi_1 £1,200.00".to_string()]);
    assert_eq!(
        again.step("record_hold_completion").map(|s| s.status),
        Some(StepStatus::Skipped)
    );
    let snapshot = h.orchestrator.load_snapshot(&JobId::new("1042")).await.unwrap();
    assert_eq!(snapshot.open_holds.len(), 1);
    assert_eq!(h.hire.row_count(), 2);
}

#[tokio::test]
async fn test_capture_over_authorization_rejected() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::with_hold(hold("pi_1", HoldKind::ManualCapture, HoldStatus::Created, dec!(1200))),
        MockBoard::with_item(),
        at(14, 12),
    );

    let err = h
        .orchestrator
        .capture_hold(CaptureRequest {
            hold_id: HoldId::new("pi_1"),
            amount: dec!(1200.01),
            reason: "damage".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentActionError::Hold(HoldError::ExceedsAuthorized { .. })));
    assert!(h.payments.state.lock().unwrap().captures.is_empty());
}

#[tokio::test]
async fn test_capture_requires_created_hold() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::with_hold(hold("pi_1", HoldKind::ManualCapture, HoldStatus::Pending, dec!(1200))),
        MockBoard::with_item(),
        at(14, 12),
    );

    let err = h
        .orchestrator
        .capture_hold(CaptureRequest {
            hold_id: HoldId::new("pi_1"),
            amount: dec!(300),
            reason: "damage".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentActionError::Hold(HoldError::NotCapturable { .. })));
}

#[tokio::test]
async fn test_capture_writes_excess_deposit() {
    let board = MockBoard::with_item();
    board.post("PRE-AUTH COMPLETED: pi_1 £1,200.00");
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::with_hold(hold("pi_1", HoldKind::ManualCapture, HoldStatus::Created, dec!(1200))),
        board,
        at(14, 12),
    );

    let report = h
        .orchestrator
        .capture_hold(CaptureRequest {
            hold_id: HoldId::new("pi_1"),
            amount: dec!(300),
            reason: "scratched door".to_string(),
        })
        .await
        .unwrap();

    assert!(report.warnings.is_empty());
    assert_eq!(h.payments.state.lock().unwrap().captures, vec![(HoldId::new("pi_1"), dec!(300))]);
    let snapshot = h.orchestrator.load_snapshot(&JobId::new("1042")).await.unwrap();
    assert_eq!(snapshot.excess.net_excess_paid, dec!(300.00));
    assert!(snapshot.open_holds.is_empty());
    assert!(h.board.bodies().contains(&"PRE-AUTH CAPTURED: pi_1 £300.00".to_string()));
    let notes = h.hire.notes();
    assert!(notes[0].contains("£900.00 released"));
    assert!(notes[0].contains("scratched door"));
}

#[tokio::test]
async fn test_capture_ledger_failure_triggers_compensating_refund() {
    let hire = MockHire::new(job_json(1), base_rows());
    hire.state.lock().unwrap().fail_deposits = true;
    let h = harness(
        hire,
        MockPayments::with_hold(hold("pi_1", HoldKind::ManualCapture, HoldStatus::Created, dec!(1200))),
        MockBoard::with_item(),
        at(14, 12),
    );

    let err = h
        .orchestrator
        .capture_hold(CaptureRequest {
            hold_id: HoldId::new("pi_1"),
            amount: dec!(400),
            reason: "fuel".to_string(),
        })
        .await
        .unwrap_err();

    match err {
        PaymentActionError::PartialFailure {
            failed_step,
            completed,
            ..
        } => {
            assert_eq!(failed_step, "record_deposit");
            let steps: Vec<_> = completed.iter().map(|s| s.step.as_str()).collect();
            assert_eq!(steps, vec!["capture_hold", "compensating_refund"]);
        }
        other => panic!("expected partial failure, got {other:?}"),
    }
    assert_eq!(
        h.payments.state.lock().unwrap().refunds,
        vec![(PaymentId::new("pi_1"), dec!(400))]
    );
}

#[tokio::test]
async fn test_legacy_capture_authentication_required() {
    let payments = MockPayments::with_hold(hold("seti_1", HoldKind::Legacy, HoldStatus::Created, dec!(1200)));
    payments.state.lock().unwrap().require_authentication = true;
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        payments,
        MockBoard::with_item(),
        at(14, 12),
    );

    let err = h
        .orchestrator
        .capture_hold(CaptureRequest {
            hold_id: HoldId::new("seti_1"),
            amount: dec!(200),
            reason: "damage".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PaymentActionError::Hold(HoldError::AuthenticationRequired { .. })
    ));
    assert_eq!(h.hire.row_count(), 2);
}

#[tokio::test]
async fn test_legacy_capture_charges_saved_card() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::with_hold(hold("seti_1", HoldKind::Legacy, HoldStatus::Created, dec!(1200))),
        MockBoard::with_item(),
        at(14, 12),
    );

    let report = h
        .orchestrator
        .capture_hold(CaptureRequest {
            hold_id: HoldId::new("seti_1"),
            amount: dec!(200),
            reason: "damage".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(
        report.step("capture_hold").and_then(|s| s.external_id.clone()),
        Some("pi_offsession".to_string())
    );
    assert_eq!(h.payments.state.lock().unwrap().saved_card_charges[0].payment_method_id, "pm_1");
}

#[tokio::test]
async fn test_legacy_hold_cannot_be_captured_twice() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::with_hold(hold("seti_1", HoldKind::Legacy, HoldStatus::Created, dec!(1200))),
        MockBoard::with_item(),
        at(14, 12),
    );
    let capture = || CaptureRequest {
        hold_id: HoldId::new("seti_1"),
        amount: dec!(1200),
        reason: "damage".to_string(),
    };

    h.orchestrator.capture_hold(capture()).await.unwrap();
    let err = h.orchestrator.capture_hold(capture()).await.unwrap_err();
    assert!(matches!(
        err,
        PaymentActionError::Hold(HoldError::NotCapturable {
            status: HoldStatus::Captured,
            ..
        })
    ));

    let released = h
        .orchestrator
        .release_hold(ReleaseRequest {
            hold_id: HoldId::new("seti_1"),
            reason: "returned clean".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(released, PaymentActionError::Hold(HoldError::NotReleasable { .. })));

    let payments = h.payments.state.lock().unwrap();
    assert_eq!(payments.saved_card_charges.len(), 1);
    assert!(payments.cancelled.is_empty());
    drop(payments);
    let snapshot = h.orchestrator.load_snapshot(&JobId::new("1042")).await.unwrap();
    assert_eq!(snapshot.excess.net_excess_paid, dec!(1200.00));
}

#[tokio::test]
async fn test_release_hold() {
    let board = MockBoard::with_item();
    board.post("PRE-AUTH COMPLETED: pi_1 £1,200.00");
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::with_hold(hold("pi_1", HoldKind::ManualCapture, HoldStatus::Created, dec!(1200))),
        board,
        at(14, 12),
    );

    h.orchestrator
        .release_hold(ReleaseRequest {
            hold_id: HoldId::new("pi_1"),
            reason: "vehicle returned clean".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(h.payments.state.lock().unwrap().cancelled, vec![HoldId::new("pi_1")]);
    let snapshot = h.orchestrator.load_snapshot(&JobId::new("1042")).await.unwrap();
    assert!(snapshot.open_holds.is_empty());
    assert_eq!(
        h.board.last_status(),
        Some((StatusColumn::Excess, status_labels::PRE_AUTH_RELEASED.to_string()))
    );
    assert!(h.hire.notes()[0].contains("released"));
}

#[tokio::test]
async fn test_release_of_captured_hold_rejected() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::with_hold(hold("pi_1", HoldKind::ManualCapture, HoldStatus::Captured, dec!(1200))),
        MockBoard::with_item(),
        at(14, 12),
    );

    let err = h
        .orchestrator
        .release_hold(ReleaseRequest {
            hold_id: HoldId::new("pi_1"),
            reason: "x".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentActionError::Hold(HoldError::NotReleasable { .. })));
}

#[tokio::test]
async fn test_release_requires_reason() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::default(),
        MockBoard::with_item(),
        at(14, 12),
    );
    let err = h
        .orchestrator
        .release_hold(ReleaseRequest {
            hold_id: HoldId::new("pi_1"),
            reason: "   ".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentActionError::Validation(_)));
}

// ============================================================================
// Charges and payments
// ============================================================================

#[tokio::test]
async fn test_create_charge_uses_outstanding_balance() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::default(),
        MockBoard::with_item(),
        at(5, 12),
    );

    let report = h
        .orchestrator
        .create_charge(ChargeRequest {
            job_id: JobId::new("1042"),
            kind: PaymentKind::Balance,
            amount: None,
        })
        .await
        .unwrap();

    assert!(report.checkout_url.is_some());
    assert_eq!(h.payments.state.lock().unwrap().checkouts[0].amount, dec!(900.00));
}

#[tokio::test]
async fn test_upfront_excess_charge_blocked_in_hold_window() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::default(),
        MockBoard::with_item(),
        at(9, 12),
    );

    let err = h
        .orchestrator
        .create_charge(ChargeRequest {
            job_id: JobId::new("1042"),
            kind: PaymentKind::Excess,
            amount: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentActionError::Timing(_)));
}

#[tokio::test]
async fn test_record_payment_is_idempotent_and_promotes_job() {
    let rows = vec![json!({ "kind": 0, "id": "1", "total_ex_tax": "1000.00" })];
    let h = harness(
        MockHire::new(job_json(1), rows),
        MockPayments::default(),
        MockBoard::with_item(),
        at(5, 12),
    );
    let checkout = CompletedCheckout {
        session_id: "cs_7".to_string(),
        job_id: JobId::new("1042"),
        kind: PaymentKind::Deposit,
        amount: dec!(300),
        payment_id: Some(PaymentId::new("pi_7")),
    };

    let report = h.orchestrator.record_payment(checkout.clone()).await.unwrap();
    assert_eq!(
        report.step("promote_job_status").map(|s| s.status),
        Some(StepStatus::Completed)
    );
    assert_eq!(h.hire.state.lock().unwrap().statuses, vec![2]);
    assert_eq!(h.hire.state.lock().unwrap().synced.len(), 1);
    assert_eq!(
        h.board.last_status(),
        Some((StatusColumn::Deposit, status_labels::DEPOSIT_PAID.to_string()))
    );

    let again = h.orchestrator.record_payment(checkout).await.unwrap();
    assert_eq!(again.step("record_deposit").map(|s| s.status), Some(StepStatus::Skipped));
    assert_eq!(h.hire.row_count(), 2);
}

#[tokio::test]
async fn test_record_payment_ledger_failure_is_partial() {
    let hire = MockHire::new(job_json(1), base_rows());
    hire.state.lock().unwrap().fail_deposits = true;
    let h = harness(hire, MockPayments::default(), MockBoard::with_item(), at(5, 12));

    let err = h
        .orchestrator
        .record_payment(CompletedCheckout {
            session_id: "cs_8".to_string(),
            job_id: JobId::new("1042"),
            kind: PaymentKind::Balance,
            amount: dec!(900),
            payment_id: Some(PaymentId::new("pi_8")),
        })
        .await
        .unwrap_err();

    match err {
        PaymentActionError::PartialFailure {
            failed_step,
            completed,
            ..
        } => {
            assert_eq!(failed_step, "record_deposit");
            assert_eq!(completed[0].external_id.as_deref(), Some("pi_8"));
        }
        other => panic!("expected partial failure, got {other:?}"),
    }
}

// ============================================================================
// Refunds
// ============================================================================

fn refund(deposit: &str, amount: Decimal, payment: Option<&str>) -> RefundRequest {
    RefundRequest {
        job_id: JobId::new("1042"),
        deposit_id: DepositId::new(deposit),
        amount,
        reason: "hire completed without damage".to_string(),
        payment_id: payment.map(PaymentId::new),
    }
}

#[tokio::test]
async fn test_manual_excess_refund_zeroes_net_excess() {
    let h = harness(
        MockHire::new(job_json(1), excess_rows()),
        MockPayments::default(),
        MockBoard::with_item(),
        at(14, 12),
    );

    let report = h
        .orchestrator
        .refund_deposit(refund("e20", dec!(1200), None))
        .await
        .unwrap();

    assert_eq!(report.step("processor_refund").map(|s| s.status), Some(StepStatus::Skipped));
    let snapshot = h.orchestrator.load_snapshot(&JobId::new("1042")).await.unwrap();
    assert_eq!(snapshot.excess.net_excess_paid, Decimal::ZERO);
    assert_eq!(snapshot.hire.total_hire_paid, dec!(300.00));
    let notes = h.hire.notes();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].starts_with("REFUND: £1,200.00 against excess deposit 20"));
    assert!(notes[0].contains("manual refund"));
    assert_eq!(
        h.board.last_status(),
        Some((StatusColumn::Excess, status_labels::EXCESS_REFUNDED.to_string()))
    );
}

#[tokio::test]
async fn test_processor_refund_then_ledger() {
    let h = harness(
        MockHire::new(job_json(1), excess_rows()),
        MockPayments::default(),
        MockBoard::with_item(),
        at(14, 12),
    );

    let report = h
        .orchestrator
        .refund_deposit(refund("20", dec!(1200), Some("pi_old")))
        .await
        .unwrap();

    assert_eq!(
        report.step("processor_refund").and_then(|s| s.external_id.clone()),
        Some("re_1".to_string())
    );
    let snapshot = h.orchestrator.load_snapshot(&JobId::new("1042")).await.unwrap();
    assert_eq!(snapshot.excess.net_excess_paid, Decimal::ZERO);
    assert!(h.hire.notes()[0].contains("refund re_1 on payment pi_old"));
}

#[tokio::test]
async fn test_processor_refund_failure_leaves_ledger_untouched() {
    let payments = MockPayments::default();
    payments.state.lock().unwrap().fail_refunds = true;
    let h = harness(
        MockHire::new(job_json(1), excess_rows()),
        payments,
        MockBoard::with_item(),
        at(14, 12),
    );

    let err = h
        .orchestrator
        .refund_deposit(refund("20", dec!(500), Some("pi_old")))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentActionError::Upstream(_)));
    assert_eq!(h.hire.row_count(), 3);
    let notes = h.hire.notes();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].starts_with("REFUND FAILED"));
    assert!(notes[0].contains("No ledger change made"));
}

#[tokio::test]
async fn test_refund_fails_over_to_payment_application() {
    let hire = MockHire::new(job_json(1), excess_rows());
    hire.state.lock().unwrap().reject_negative_deposits = true;
    let h = harness(hire, MockPayments::default(), MockBoard::with_item(), at(14, 12));

    let report = h
        .orchestrator
        .refund_deposit(refund("20", dec!(200), None))
        .await
        .unwrap();

    assert_eq!(
        report.step("record_refund_negative_deposit").map(|s| s.status),
        Some(StepStatus::Failed)
    );
    assert_eq!(
        report.step("record_refund_application").map(|s| s.status),
        Some(StepStatus::Completed)
    );
    assert_eq!(h.hire.state.lock().unwrap().applications[0].deposit_id, DepositId::new("20"));
    let snapshot = h.orchestrator.load_snapshot(&JobId::new("1042")).await.unwrap();
    assert_eq!(snapshot.excess.net_excess_paid, dec!(1000.00));
}

#[tokio::test]
async fn test_refund_not_recorded_after_processor_refund_is_partial() {
    let hire = MockHire::new(job_json(1), excess_rows());
    {
        let mut state = hire.state.lock().unwrap();
        state.reject_negative_deposits = true;
        state.fail_applications = true;
    }
    let h = harness(hire, MockPayments::default(), MockBoard::with_item(), at(14, 12));

    let err = h
        .orchestrator
        .refund_deposit(refund("20", dec!(200), Some("pi_old")))
        .await
        .unwrap_err();

    match err {
        PaymentActionError::PartialFailure {
            failed_step,
            completed,
            ..
        } => {
            assert_eq!(failed_step, "record_refund");
            assert_eq!(completed[0].step, "processor_refund");
        }
        other => panic!("expected partial failure, got {other:?}"),
    }
    assert!(h.hire.notes()[0].contains("NOT recorded"));
}

#[tokio::test]
async fn test_refund_rules() {
    let h = harness(
        MockHire::new(job_json(1), excess_rows()),
        MockPayments::default(),
        MockBoard::with_item(),
        at(14, 12),
    );

    let over = h
        .orchestrator
        .refund_deposit(refund("20", dec!(1500), None))
        .await
        .unwrap_err();
    assert!(matches!(over, PaymentActionError::BusinessRule(_)));

    let missing = h
        .orchestrator
        .refund_deposit(refund("99", dec!(10), None))
        .await
        .unwrap_err();
    assert!(matches!(missing, PaymentActionError::NotFound(_)));

    let zero = h
        .orchestrator
        .refund_deposit(refund("20", Decimal::ZERO, None))
        .await
        .unwrap_err();
    assert!(matches!(zero, PaymentActionError::Validation(_)));

    assert_eq!(h.hire.row_count(), 3);
}

#[tokio::test]
async fn test_hire_deposit_refunds_capped_at_remaining() {
    let h = harness(
        MockHire::new(job_json(1), base_rows()),
        MockPayments::default(),
        MockBoard::with_item(),
        at(14, 12),
    );

    h.orchestrator
        .refund_deposit(refund("10", dec!(200), Some("pi_dep")))
        .await
        .unwrap();
    let over = h
        .orchestrator
        .refund_deposit(refund("10", dec!(150), Some("pi_dep")))
        .await
        .unwrap_err();
    assert!(matches!(over, PaymentActionError::BusinessRule(_)));

    h.orchestrator
        .refund_deposit(refund("10", dec!(100), Some("pi_dep")))
        .await
        .unwrap();
    let again = h
        .orchestrator
        .refund_deposit(refund("10", dec!(0.01), Some("pi_dep")))
        .await
        .unwrap_err();
    assert!(matches!(again, PaymentActionError::BusinessRule(_)));

    let refunds = h.payments.state.lock().unwrap().refunds.clone();
    assert_eq!(
        refunds,
        vec![
            (PaymentId::new("pi_dep"), dec!(200)),
            (PaymentId::new("pi_dep"), dec!(100)),
        ]
    );
    let snapshot = h.orchestrator.load_snapshot(&JobId::new("1042")).await.unwrap();
    assert_eq!(snapshot.hire.total_hire_paid, Decimal::ZERO);
}
