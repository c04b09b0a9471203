//! Payment orchestrator implementation.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use hirebill_shared::config::{BillingConfig, HirePlatformConfig};
use hirebill_shared::types::{DepositId, HoldId, JobId, format_gbp, round_money};

use super::error::PaymentActionError;
use super::report::ActionReport;
use super::types::{CaptureRequest, ChargeRequest, HoldRequest, RefundRequest, ReleaseRequest};
use crate::gateway::{
    Board, ChargeOutcome, CheckoutRequest, CompletedCheckout, HirePlatform, NewDeposit,
    PaymentKind, PaymentProcessor, RefundApplication, SavedCardCharge, StatusColumn,
    UpstreamError, status_labels,
};
use crate::hold::{HoldError, HoldKind, HoldStatus};
use crate::job::{JobDecoder, JobRecord};
use crate::ledger::{BillingRow, parse_rows};
use crate::policy::BillingPolicy;
use crate::snapshot::{JobFinancialSnapshot, SnapshotInput, capture_tag, refund_tag};
use crate::sync_record::{PreAuthEvent, PreAuthMarker, SyncRecord, open_holds};
use crate::timing::{CollectionMethod, TimingPolicy};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Business parameters for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorPolicy {
    /// Deposit and excess rules.
    pub billing: BillingPolicy,
    /// Excess timing window.
    pub timing: TimingPolicy,
    /// Job decoder (timezone, vehicle keywords).
    pub decoder: JobDecoder,
    /// Hire platform status code meaning "booked".
    pub booked_status: i64,
}

impl Default for OrchestratorPolicy {
    fn default() -> Self {
        Self {
            billing: BillingPolicy::default(),
            timing: TimingPolicy::default(),
            decoder: JobDecoder::default(),
            booked_status: 2,
        }
    }
}

impl OrchestratorPolicy {
    /// Builds the policy from configuration.
    ///
    /// # Errors
    ///
    /// Returns `PaymentActionError::Validation` for an unknown timezone.
    pub fn from_config(
        hire: &HirePlatformConfig,
        billing: &BillingConfig,
    ) -> Result<Self, PaymentActionError> {
        let timezone: Tz = hire.timezone.parse().map_err(|_| {
            PaymentActionError::validation(format!("Unknown timezone {}", hire.timezone))
        })?;
        Ok(Self {
            billing: BillingPolicy::from(billing),
            timing: TimingPolicy::from(billing),
            decoder: JobDecoder::new(timezone, billing.vehicle_keywords.clone()),
            booked_status: hire.booked_status,
        })
    }
}

/// Sequences payment actions across the hire platform, the payments
/// processor and the board.
pub struct PaymentOrchestrator<H, P, B>
where
    H: HirePlatform,
    P: PaymentProcessor,
    B: Board,
{
    hire: Arc<H>,
    payments: Arc<P>,
    board: Arc<B>,
    policy: OrchestratorPolicy,
    clock: Clock,
}

impl<H, P, B> Clone for PaymentOrchestrator<H, P, B>
where
    H: HirePlatform,
    P: PaymentProcessor,
    B: Board,
{
    fn clone(&self) -> Self {
        Self {
            hire: Arc::clone(&self.hire),
            payments: Arc::clone(&self.payments),
            board: Arc::clone(&self.board),
            policy: self.policy.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<H, P, B> PaymentOrchestrator<H, P, B>
where
    H: HirePlatform,
    P: PaymentProcessor,
    B: Board,
{
    /// Creates an orchestrator using the system clock.
    #[must_use]
    pub fn new(hire: Arc<H>, payments: Arc<P>, board: Arc<B>, policy: OrchestratorPolicy) -> Self {
        Self {
            hire,
            payments,
            board,
            policy,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Business parameters in use.
    #[must_use]
    pub fn policy(&self) -> &OrchestratorPolicy {
        &self.policy
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn today(&self) -> NaiveDate {
        self.now()
            .with_timezone(&self.policy.decoder.timezone())
            .date_naive()
    }

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------

    /// Loads a fresh financial snapshot of a job.
    ///
    /// Board failures only degrade the open-hold list; they are reported as
    /// snapshot warnings.
    pub async fn load_snapshot(
        &self,
        job_id: &JobId,
    ) -> Result<JobFinancialSnapshot, PaymentActionError> {
        let job = self.fetch_job(job_id).await?;
        let rows = self.fetch_rows(job_id).await?;
        let (holds, board_warning) = self.board_holds(job_id).await;

        let mut snapshot = JobFinancialSnapshot::build(
            SnapshotInput {
                job: &job,
                rows: &rows,
                open_holds: holds,
                now: self.now(),
            },
            &self.policy.billing,
            &self.policy.timing,
        );
        snapshot.warnings.extend(board_warning);

        debug!(
            job_id = %job_id,
            net_excess_paid = %snapshot.excess.net_excess_paid,
            remaining = %snapshot.hire.remaining_hire_balance,
            "snapshot computed"
        );
        Ok(snapshot)
    }

    async fn fetch_job(&self, job_id: &JobId) -> Result<JobRecord, PaymentActionError> {
        let raw = self.hire.fetch_job(job_id).await?;
        if raw.is_null() {
            return Err(PaymentActionError::NotFound(format!("Job {job_id}")));
        }
        Ok(self.policy.decoder.decode(&raw)?)
    }

    async fn fetch_rows(&self, job_id: &JobId) -> Result<Vec<BillingRow>, PaymentActionError> {
        let raw = self.hire.fetch_billing(job_id).await?;
        Ok(parse_rows(&raw)?)
    }

    async fn board_holds(&self, job_id: &JobId) -> (Vec<PreAuthMarker>, Option<String>) {
        let item = match self.board.find_item(job_id).await {
            Ok(Some(item)) => item,
            Ok(None) => return (Vec::new(), None),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "board lookup failed; open holds unknown");
                return (Vec::new(), Some(format!("Open holds unavailable: {e}")));
            }
        };
        match self.board.list_updates(&item.item_id).await {
            Ok(updates) => (open_holds(&updates), None),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "board feed read failed; open holds unknown");
                (Vec::new(), Some(format!("Open holds unavailable: {e}")))
            }
        }
    }

    // ------------------------------------------------------------------
    // CreateHold / CreateCharge
    // ------------------------------------------------------------------

    /// Sends the customer a manual-capture hold checkout and records the
    /// session on the board.
    ///
    /// Requires the excess timing state to be `HOLD_AVAILABLE`.
    pub async fn create_hold(
        &self,
        request: HoldRequest,
    ) -> Result<ActionReport, PaymentActionError> {
        let job_id = request.job_id;
        info!(job_id = %job_id, "creating excess hold");

        let snapshot = self.load_snapshot(&job_id).await?;
        snapshot
            .require_timing()?
            .ensure_allows(CollectionMethod::Hold)?;
        if let Some(open) = snapshot.open_holds.first() {
            return Err(PaymentActionError::business_rule(format!(
                "Job {job_id} already has an open excess hold {}",
                open.hold_id
            )));
        }
        let amount = resolve_amount(
            request.amount,
            snapshot.excess.excess_outstanding,
            "excess",
        )?;

        // The board feed is the only record of a hold checkout.
        let item = self.board.find_item(&job_id).await?.ok_or_else(|| {
            PaymentActionError::business_rule(format!(
                "Job {job_id} has no board item to track an excess hold on"
            ))
        })?;

        let session = self
            .payments
            .create_checkout(CheckoutRequest {
                job_id: job_id.clone(),
                kind: PaymentKind::ExcessHold,
                amount,
                customer_email: snapshot.customer_email.clone(),
                description: format!("{} - job {job_id}", PaymentKind::ExcessHold.label()),
            })
            .await?;

        let mut report = ActionReport {
            checkout_url: Some(session.url.clone()),
            ..ActionReport::default()
        };
        report.completed("create_hold_checkout", Some(session.id.clone()));
        info!(job_id = %job_id, session_id = %session.id, amount = %amount, "hold checkout created");

        let marker = format!(
            "PRE-AUTH REQUESTED: {} {}",
            session.id,
            format_gbp(amount)
        );
        if let Err(e) = self.board.post_update(&item.item_id, &marker).await {
            error!(job_id = %job_id, session_id = %session.id, error = %e, "hold checkout created but board update failed");
            return Err(partial_failure("record_hold_on_board", &e, &report));
        }
        report.completed("record_hold_on_board", Some(item.item_id.to_string()));

        self.set_board_status(
            &mut report,
            &item,
            StatusColumn::Excess,
            status_labels::PRE_AUTH_REQUESTED,
        )
        .await;
        Ok(report)
    }

    /// Creates an immediate-charge checkout.
    ///
    /// The ledger write happens when the processor reports the checkout
    /// completed; see [`Self::record_payment`]. Upfront excess charges
    /// require the timing state to allow them.
    pub async fn create_charge(
        &self,
        request: ChargeRequest,
    ) -> Result<ActionReport, PaymentActionError> {
        let ChargeRequest {
            job_id,
            kind,
            amount,
        } = request;
        if kind == PaymentKind::ExcessHold {
            return Err(PaymentActionError::validation(
                "Excess holds are created through the hold endpoint",
            ));
        }
        info!(job_id = %job_id, kind = %kind, "creating charge");

        let snapshot = self.load_snapshot(&job_id).await?;
        if kind == PaymentKind::Excess {
            snapshot
                .require_timing()?
                .ensure_allows(CollectionMethod::Upfront)?;
        }
        let amount = resolve_amount(amount, snapshot.default_charge_amount(kind), kind.as_str())?;

        let session = self
            .payments
            .create_checkout(CheckoutRequest {
                job_id: job_id.clone(),
                kind,
                amount,
                customer_email: snapshot.customer_email.clone(),
                description: format!("{} - job {job_id}", kind.label()),
            })
            .await?;
        info!(job_id = %job_id, session_id = %session.id, amount = %amount, "charge checkout created");

        let mut report = ActionReport {
            checkout_url: Some(session.url.clone()),
            ..ActionReport::default()
        };
        report.completed("create_checkout", Some(session.id));
        Ok(report)
    }

    // ------------------------------------------------------------------
    // RecordPayment (checkout completion)
    // ------------------------------------------------------------------

    /// Records a completed checkout.
    ///
    /// Hold sessions add a completion marker to the board. Charges write a
    /// deposit to the ledger, trigger the accounting sync and, for hire
    /// payments, promote the job to booked once the deposit is covered.
    /// Repeated deliveries of the same payment are skipped.
    pub async fn record_payment(
        &self,
        checkout: CompletedCheckout,
    ) -> Result<ActionReport, PaymentActionError> {
        info!(
            job_id = %checkout.job_id,
            session_id = %checkout.session_id,
            kind = %checkout.kind,
            amount = %checkout.amount,
            "recording completed checkout"
        );
        if checkout.amount <= Decimal::ZERO {
            return Err(PaymentActionError::validation(
                "Completed checkout has no positive amount",
            ));
        }
        match checkout.kind {
            PaymentKind::ExcessHold => self.record_hold_completion(checkout).await,
            _ => self.record_charge(checkout).await,
        }
    }

    async fn record_hold_completion(
        &self,
        checkout: CompletedCheckout,
    ) -> Result<ActionReport, PaymentActionError> {
        let hold_id = checkout
            .payment_id
            .as_ref()
            .map(|p| HoldId::new(p.as_str()))
            .ok_or_else(|| {
                PaymentActionError::validation("Completed hold checkout has no payment intent")
            })?;
        let job_id = &checkout.job_id;
        let mut report = ActionReport::default();

        let snapshot_holds = self.board_holds(job_id).await.0;
        if snapshot_holds.iter().any(|m| m.hold_id == hold_id) {
            report.skipped("record_hold_completion", "hold already recorded");
            return Ok(report);
        }

        match self.board.find_item(job_id).await? {
            Some(item) => {
                let marker = PreAuthEvent::Completed {
                    hold_id: hold_id.clone(),
                    amount: checkout.amount,
                }
                .marker();
                self.board.post_update(&item.item_id, &marker).await?;
                report.completed("record_hold_completion", Some(hold_id.to_string()));
                self.set_board_status(
                    &mut report,
                    &item,
                    StatusColumn::Excess,
                    status_labels::PRE_AUTH_TAKEN,
                )
                .await;
            }
            None => report.failed_non_fatal(
                "record_hold_completion",
                format!("no board item for job {job_id}; hold {hold_id} is not tracked"),
            ),
        }

        let note = format!(
            "Excess pre-auth of {} taken (hold {hold_id}).",
            format_gbp(checkout.amount)
        );
        self.append_note(&mut report, job_id, &note).await;
        Ok(report)
    }

    async fn record_charge(
        &self,
        checkout: CompletedCheckout,
    ) -> Result<ActionReport, PaymentActionError> {
        let job_id = &checkout.job_id;
        let reference = checkout
            .payment_id
            .as_ref()
            .map_or_else(|| checkout.session_id.clone(), ToString::to_string);
        let mut report = ActionReport::default();

        let before = self.load_snapshot(job_id).await?;
        if before.has_payment_reference(&reference) {
            info!(job_id = %job_id, reference = %reference, "payment already in ledger; skipping");
            report.skipped("record_deposit", format!("payment {reference} already recorded"));
            return Ok(report);
        }

        let description = match checkout.kind {
            PaymentKind::Deposit => format!("Hire deposit - card payment {reference}"),
            PaymentKind::Balance => format!("Hire balance - card payment {reference}"),
            PaymentKind::Excess | PaymentKind::ExcessHold => {
                format!("Excess payment - card payment {reference}")
            }
        };
        let deposit = NewDeposit {
            job_id: job_id.clone(),
            amount: checkout.amount,
            description,
            date: self.today(),
            reference: Some(reference.clone()),
        };
        let deposit_id = match self.hire.create_deposit(deposit).await {
            Ok(id) => id,
            Err(e) => {
                error!(job_id = %job_id, reference = %reference, error = %e, "payment taken but ledger write failed");
                report.completed("payment", Some(reference));
                return Err(partial_failure("record_deposit", &e, &report));
            }
        };
        report.completed("record_deposit", Some(deposit_id.to_string()));
        self.accounting_sync(&mut report, job_id, &deposit_id).await;

        let note = format!(
            "Card payment of {} received ({}), ref {reference}.",
            format_gbp(checkout.amount),
            checkout.kind.label()
        );
        self.append_note(&mut report, job_id, &note).await;

        if checkout.kind.is_excess() {
            self.update_board(
                &mut report,
                job_id,
                None,
                Some((StatusColumn::Excess, status_labels::EXCESS_PAID)),
            )
            .await;
            return Ok(report);
        }

        self.promote_if_booked(&mut report, job_id).await;
        Ok(report)
    }

    async fn promote_if_booked(&self, report: &mut ActionReport, job_id: &JobId) {
        let after = match self.load_snapshot(job_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "snapshot reload after payment failed");
                report.failed_non_fatal("promote_job_status", e.to_string());
                return;
            }
        };

        let label = if after.hire.fully_paid {
            status_labels::PAID_IN_FULL
        } else {
            status_labels::DEPOSIT_PAID
        };
        if after.hire.deposit_paid {
            self.update_board(report, job_id, None, Some((StatusColumn::Deposit, label)))
                .await;
        }

        if !after.hire.deposit_paid || after.job_status >= self.policy.booked_status {
            report.skipped("promote_job_status", "no status change needed");
            return;
        }
        match self
            .hire
            .update_job_status(job_id, self.policy.booked_status)
            .await
        {
            Ok(()) => {
                info!(job_id = %job_id, status = self.policy.booked_status, "job promoted to booked");
                report.completed(
                    "promote_job_status",
                    Some(self.policy.booked_status.to_string()),
                );
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "job status promotion failed");
                report.failed_non_fatal("promote_job_status", e.to_string());
            }
        }
    }

    // ------------------------------------------------------------------
    // CaptureHold / ReleaseHold
    // ------------------------------------------------------------------

    /// Captures part or all of a hold and records it as an excess deposit.
    ///
    /// If the ledger write fails after the capture, the captured amount is
    /// refunded as a best-effort compensation.
    pub async fn capture_hold(
        &self,
        request: CaptureRequest,
    ) -> Result<ActionReport, PaymentActionError> {
        let CaptureRequest {
            hold_id,
            amount,
            reason,
        } = request;
        let reason = require_reason(&reason)?;
        let amount = round_money(amount);
        info!(hold_id = %hold_id, amount = %amount, "capturing hold");

        let hold = self
            .payments
            .retrieve_hold(&hold_id)
            .await?
            .ok_or_else(|| PaymentActionError::NotFound(format!("Hold {hold_id}")))?;
        hold.validate_capture(amount)?;
        let job_id = hold.job_id.clone().ok_or_else(|| {
            PaymentActionError::business_rule(format!("Hold {hold_id} has no job reference"))
        })?;
        if self.captured_in_ledger(&job_id, &hold_id).await? {
            return Err(HoldError::NotCapturable {
                hold_id,
                status: HoldStatus::Captured,
            }
            .into());
        }

        let payment_id = match hold.kind {
            HoldKind::ManualCapture => {
                self.payments
                    .capture_hold(&hold_id, amount)
                    .await?
                    .payment_id
            }
            HoldKind::Legacy => {
                let (Some(customer_id), Some(payment_method_id)) =
                    (hold.customer_id.clone(), hold.payment_method_id.clone())
                else {
                    return Err(PaymentActionError::business_rule(format!(
                        "Legacy hold {hold_id} has no saved card"
                    )));
                };
                let outcome = self
                    .payments
                    .charge_saved_card(SavedCardCharge {
                        hold_id: hold_id.clone(),
                        customer_id,
                        payment_method_id,
                        amount,
                        job_id: job_id.clone(),
                        description: format!("Excess charge - job {job_id}"),
                    })
                    .await?;
                match outcome {
                    ChargeOutcome::Succeeded { payment_id } => payment_id,
                    ChargeOutcome::AuthenticationRequired => {
                        warn!(hold_id = %hold_id, "saved card requires authentication");
                        return Err(HoldError::AuthenticationRequired { hold_id }.into());
                    }
                }
            }
        };

        let mut report = ActionReport::default();
        report.completed("capture_hold", Some(payment_id.to_string()));
        info!(hold_id = %hold_id, payment_id = %payment_id, "hold captured");

        let deposit = NewDeposit {
            job_id: job_id.clone(),
            amount,
            description: format!("{} {reason}", capture_tag(&hold_id)),
            date: self.today(),
            reference: Some(payment_id.to_string()),
        };
        let deposit_id = match self.hire.create_deposit(deposit).await {
            Ok(id) => id,
            Err(e) => {
                error!(hold_id = %hold_id, payment_id = %payment_id, error = %e, "capture succeeded but ledger write failed; refunding");
                let message = match self
                    .payments
                    .refund(&payment_id, amount, "ledger write failed after capture")
                    .await
                {
                    Ok(receipt) => {
                        report.completed("compensating_refund", Some(receipt.id));
                        e.to_string()
                    }
                    Err(refund_err) => {
                        error!(payment_id = %payment_id, error = %refund_err, "compensating refund failed; manual reconciliation needed");
                        format!("{e}; compensating refund failed: {refund_err}")
                    }
                };
                return Err(PaymentActionError::PartialFailure {
                    failed_step: "record_deposit".to_string(),
                    message,
                    completed: report.completed_steps(),
                });
            }
        };
        report.completed("record_deposit", Some(deposit_id.to_string()));
        self.accounting_sync(&mut report, &job_id, &deposit_id).await;

        let event = PreAuthEvent::Captured {
            hold_id: hold_id.clone(),
            amount: Some(amount),
        };
        self.update_board(
            &mut report,
            &job_id,
            Some(event),
            Some((StatusColumn::Excess, status_labels::EXCESS_CAPTURED)),
        )
        .await;

        let note = format!(
            "Excess pre-auth {hold_id} captured: {} of {}. Reason: {reason}. Remaining {} released.",
            format_gbp(amount),
            format_gbp(hold.authorized_amount),
            format_gbp(hold.released_remainder(amount))
        );
        self.append_note(&mut report, &job_id, &note).await;
        Ok(report)
    }

    /// Returns true if the hold's capture is already in the ledger.
    async fn captured_in_ledger(&self, job_id: &JobId, hold_id: &HoldId) -> Result<bool, PaymentActionError> {
        let captured = self.load_snapshot(job_id).await?.hold_captured(hold_id);
        if captured {
            warn!(job_id = %job_id, hold_id = %hold_id, "hold already captured in ledger");
        }
        Ok(captured)
    }

    /// Releases a hold without taking any money.
    pub async fn release_hold(
        &self,
        request: ReleaseRequest,
    ) -> Result<ActionReport, PaymentActionError> {
        let ReleaseRequest { hold_id, reason } = request;
        let reason = require_reason(&reason)?;
        info!(hold_id = %hold_id, "releasing hold");

        let hold = self
            .payments
            .retrieve_hold(&hold_id)
            .await?
            .ok_or_else(|| PaymentActionError::NotFound(format!("Hold {hold_id}")))?;
        hold.validate_release()?;
        if let Some(job_id) = &hold.job_id
            && self.captured_in_ledger(job_id, &hold_id).await?
        {
            return Err(HoldError::NotReleasable {
                hold_id,
                status: HoldStatus::Captured,
            }
            .into());
        }

        self.payments.cancel_hold(&hold_id).await?;
        let mut report = ActionReport::default();
        report.completed("cancel_hold", Some(hold_id.to_string()));

        let Some(job_id) = hold.job_id.clone() else {
            report.failed_non_fatal("update_board", "hold has no job reference");
            return Ok(report);
        };
        self.update_board(
            &mut report,
            &job_id,
            Some(PreAuthEvent::Released {
                hold_id: hold_id.clone(),
            }),
            Some((StatusColumn::Excess, status_labels::PRE_AUTH_RELEASED)),
        )
        .await;

        let note = format!(
            "Excess pre-auth {hold_id} of {} released. Reason: {reason}.",
            format_gbp(hold.authorized_amount)
        );
        self.append_note(&mut report, &job_id, &note).await;
        Ok(report)
    }

    // ------------------------------------------------------------------
    // RefundDeposit
    // ------------------------------------------------------------------

    /// Refunds (part of) a deposit.
    ///
    /// Issues the processor refund when a payment ID is given, then writes
    /// the refund to the ledger, trying a negative deposit first and a
    /// payment application second. An audit note is appended to the job in
    /// every outcome.
    pub async fn refund_deposit(
        &self,
        request: RefundRequest,
    ) -> Result<ActionReport, PaymentActionError> {
        let RefundRequest {
            job_id,
            deposit_id,
            amount,
            reason,
            payment_id,
        } = request;
        let reason = require_reason(&reason)?;
        if amount <= Decimal::ZERO {
            return Err(PaymentActionError::validation(
                "Refund amount must be greater than zero",
            ));
        }
        let amount = round_money(amount);
        let deposit_id = DepositId::normalize(deposit_id.as_str());
        info!(job_id = %job_id, deposit_id = %deposit_id, amount = %amount, "refunding deposit");

        let snapshot = self.load_snapshot(&job_id).await?;
        let deposit = snapshot.deposit(&deposit_id).ok_or_else(|| {
            PaymentActionError::NotFound(format!("Deposit {deposit_id} on job {job_id}"))
        })?;
        if deposit.amount <= Decimal::ZERO {
            return Err(PaymentActionError::business_rule(format!(
                "Deposit {deposit_id} is itself a refund"
            )));
        }
        let refundable = deposit.amount - snapshot.refunded_against(&deposit_id);
        if amount > refundable {
            return Err(PaymentActionError::business_rule(format!(
                "Refund {} exceeds {} still refundable on deposit {deposit_id} of {}",
                format_gbp(amount),
                format_gbp(refundable.max(Decimal::ZERO)),
                format_gbp(deposit.amount)
            )));
        }
        let is_excess = deposit.is_excess;
        if is_excess && amount > snapshot.excess.net_excess_paid {
            return Err(PaymentActionError::business_rule(format!(
                "Refund {} exceeds net excess retained {}",
                format_gbp(amount),
                format_gbp(snapshot.excess.net_excess_paid)
            )));
        }

        let mut report = ActionReport::default();
        let category = if is_excess { "excess" } else { "hire" };

        let processor_ref = match &payment_id {
            Some(payment_id) => match self.payments.refund(payment_id, amount, reason).await {
                Ok(receipt) => {
                    info!(payment_id = %payment_id, refund_id = %receipt.id, "processor refund issued");
                    report.completed("processor_refund", Some(receipt.id.clone()));
                    Some(receipt.id)
                }
                Err(e) => {
                    error!(payment_id = %payment_id, error = %e, "processor refund failed");
                    let note = format!(
                        "REFUND FAILED: {} against {category} deposit {deposit_id}. Reason: {reason}. Processor error: {e}. No ledger change made.",
                        format_gbp(amount)
                    );
                    self.append_note(&mut report, &job_id, &note).await;
                    return Err(e.into());
                }
            },
            None => {
                report.skipped("processor_refund", "no payment ID; manual refund");
                None
            }
        };

        let tag = refund_tag(&deposit_id);
        let description = if is_excess {
            format!("Excess refund {tag}: {reason}")
        } else {
            format!("Hire refund {tag}: {reason}")
        };
        let ledger = self
            .write_refund(&mut report, &job_id, &deposit_id, amount, &description, processor_ref.clone())
            .await;

        let processor_text = match (&payment_id, &processor_ref) {
            (Some(p), Some(r)) => format!("refund {r} on payment {p}"),
            _ => "manual refund (no processor payment)".to_string(),
        };
        let ledger_text = match &ledger {
            Ok(id) => format!("recorded as {id}"),
            Err(e) => format!("NOT recorded ({e})"),
        };
        let note = format!(
            "REFUND: {} against {category} deposit {deposit_id}. Reason: {reason}. Processor: {processor_text}. Ledger: {ledger_text}.",
            format_gbp(amount)
        );
        self.append_note(&mut report, &job_id, &note).await;

        match ledger {
            Ok(_) => {
                if is_excess {
                    self.update_board(
                        &mut report,
                        &job_id,
                        None,
                        Some((StatusColumn::Excess, status_labels::EXCESS_REFUNDED)),
                    )
                    .await;
                }
                Ok(report)
            }
            Err(e) if processor_ref.is_some() => {
                error!(job_id = %job_id, deposit_id = %deposit_id, error = %e, "refund issued but not recorded in ledger");
                Err(partial_failure("record_refund", &e, &report))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Tries each ledger representation of a refund in turn.
    async fn write_refund(
        &self,
        report: &mut ActionReport,
        job_id: &JobId,
        deposit_id: &DepositId,
        amount: Decimal,
        description: &str,
        reference: Option<String>,
    ) -> Result<String, UpstreamError> {
        let negative = NewDeposit {
            job_id: job_id.clone(),
            amount: -amount,
            description: description.to_string(),
            date: self.today(),
            reference,
        };
        let first_err = match self.hire.create_deposit(negative).await {
            Ok(id) => {
                report.completed("record_refund_negative_deposit", Some(id.to_string()));
                self.accounting_sync(report, job_id, &id).await;
                return Ok(id.to_string());
            }
            Err(e) => e,
        };
        warn!(job_id = %job_id, error = %first_err, "negative deposit rejected; trying payment application");
        report.failed_non_fatal("record_refund_negative_deposit", first_err.to_string());

        let application = RefundApplication {
            job_id: job_id.clone(),
            deposit_id: deposit_id.clone(),
            amount,
            description: description.to_string(),
            date: self.today(),
        };
        match self.hire.create_refund_application(application).await {
            Ok(id) => {
                report.completed("record_refund_application", Some(id.clone()));
                Ok(id)
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "no refund representation accepted by hire platform");
                report.failed_non_fatal("record_refund_application", e.to_string());
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Non-fatal side effects
    // ------------------------------------------------------------------

    async fn accounting_sync(&self, report: &mut ActionReport, job_id: &JobId, deposit_id: &DepositId) {
        match self.hire.trigger_accounting_sync(job_id, deposit_id).await {
            Ok(()) => report.completed("accounting_sync", Some(deposit_id.to_string())),
            Err(e) => {
                warn!(job_id = %job_id, deposit_id = %deposit_id, error = %e, "accounting sync failed; deposit not exported");
                report.failed_non_fatal("accounting_sync", e.to_string());
            }
        }
    }

    async fn append_note(&self, report: &mut ActionReport, job_id: &JobId, note: &str) {
        match self.hire.append_note(job_id, note).await {
            Ok(()) => report.completed("append_note", None),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "job note append failed");
                report.failed_non_fatal("append_note", e.to_string());
            }
        }
    }

    async fn update_board(
        &self,
        report: &mut ActionReport,
        job_id: &JobId,
        event: Option<PreAuthEvent>,
        status: Option<(StatusColumn, &str)>,
    ) {
        let item = match self.board.find_item(job_id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                report.failed_non_fatal("update_board", format!("no board item for job {job_id}"));
                return;
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "board lookup failed");
                report.failed_non_fatal("update_board", e.to_string());
                return;
            }
        };
        if let Some(event) = event {
            match self.board.post_update(&item.item_id, &event.marker()).await {
                Ok(()) => report.completed("post_board_update", Some(event.hold_id().to_string())),
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "board update failed");
                    report.failed_non_fatal("post_board_update", e.to_string());
                }
            }
        }
        if let Some((column, label)) = status {
            self.set_board_status(report, &item, column, label).await;
        }
    }

    async fn set_board_status(
        &self,
        report: &mut ActionReport,
        item: &SyncRecord,
        column: StatusColumn,
        label: &str,
    ) {
        match self.board.set_status(&item.item_id, column, label).await {
            Ok(()) => report.completed("set_board_status", Some(label.to_string())),
            Err(e) => {
                warn!(item_id = %item.item_id, error = %e, "board status update failed");
                report.failed_non_fatal("set_board_status", e.to_string());
            }
        }
    }
}

fn resolve_amount(
    requested: Option<Decimal>,
    outstanding: Decimal,
    what: &str,
) -> Result<Decimal, PaymentActionError> {
    match requested {
        Some(amount) if amount <= Decimal::ZERO => Err(PaymentActionError::validation(
            "Amount must be greater than zero",
        )),
        Some(amount) => Ok(round_money(amount)),
        None if outstanding <= Decimal::ZERO => Err(PaymentActionError::business_rule(format!(
            "Nothing outstanding for {what}"
        ))),
        None => Ok(round_money(outstanding)),
    }
}

fn require_reason(reason: &str) -> Result<&str, PaymentActionError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(PaymentActionError::validation("A reason is required"));
    }
    Ok(trimmed)
}

fn partial_failure(step: &str, err: &UpstreamError, report: &ActionReport) -> PaymentActionError {
    PaymentActionError::PartialFailure {
        failed_step: step.to_string(),
        message: err.to_string(),
        completed: report.completed_steps(),
    }
}
