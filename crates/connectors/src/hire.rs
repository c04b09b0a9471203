//! Hire platform HTTP client.
//!
//! Every call carries the shared token as a query parameter. The platform
//! reports most failures as `{"error": ...}` with a 200 status, so bodies
//! are checked for an error field even on success.

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info};

use hirebill_core::gateway::{
    ExternalSystem, HirePlatform, NewDeposit, RefundApplication, UpstreamError,
};
use hirebill_shared::FieldAliases;
use hirebill_shared::config::HirePlatformConfig;
use hirebill_shared::types::{DepositId, JobId};

use crate::http::{build_client, error_text, read_json, send_error};

const SYSTEM: ExternalSystem = ExternalSystem::HirePlatform;

const JOB_PATH: &str = "/api/job_data.php";
const BILLING_PATH: &str = "/php_functions/billing_list.php";
const DEPOSIT_SAVE_PATH: &str = "/php_functions/billing_deposit_save.php";
const PAYMENT_SAVE_PATH: &str = "/php_functions/billing_payment_save.php";
const NOTE_PATH: &str = "/api/job_note_add.php";
const STATUS_PATH: &str = "/frames/status_save.php";
const ACCOUNTING_TASK_PATH: &str = "/php_functions/accounting/tasks.php";

const SAVED_ID: FieldAliases = FieldAliases::new("id", &["hh_id", "ID", "id", "deposit_id"]);
const BILLING_ROWS: FieldAliases = FieldAliases::new("rows", &["rows", "items", "data"]);

/// Token-authenticated hire platform client.
#[derive(Debug, Clone)]
pub struct HirePlatformClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    bank_account_id: String,
    accounting_package_id: String,
}

impl HirePlatformClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` if the HTTP client cannot be built.
    pub fn new(config: &HirePlatformConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: build_client(SYSTEM, config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            bank_account_id: config.bank_account_id.clone(),
            accounting_package_id: config.accounting_package_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .get(self.url(path))
            .query(&[("token", self.token.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| send_error(SYSTEM, &e))?;
        let (status, body) = read_json(SYSTEM, response).await?;
        check_body(status, body)
    }

    async fn post(&self, path: &str, form: &[(&str, String)]) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .post(self.url(path))
            .query(&[("token", self.token.as_str())])
            .form(form)
            .send()
            .await
            .map_err(|e| send_error(SYSTEM, &e))?;
        let (status, body) = read_json(SYSTEM, response).await?;
        check_body(status, body)
    }
}

/// Rejects a success-status body that carries an error field.
fn check_body(status: u16, body: Value) -> Result<Value, UpstreamError> {
    if body.get("error").is_some_and(|e| !e.is_null() && e != &Value::Bool(false)) {
        let message = error_text(&body).unwrap_or_else(|| "unspecified error".to_string());
        // The platform answers 200 for rejected writes; treat them as client errors.
        let status = if status < 300 { 400 } else { status };
        return Err(UpstreamError::http(SYSTEM, status, message));
    }
    Ok(body)
}

fn saved_id(body: &Value) -> Result<String, UpstreamError> {
    SAVED_ID
        .string(body)
        .filter(|id| id != "0")
        .ok_or_else(|| UpstreamError::http(SYSTEM, 200, "save response carried no ID"))
}

/// Extracts the row list from the billing response.
fn billing_rows(body: Value) -> Result<Vec<Value>, UpstreamError> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(_) => match BILLING_ROWS.resolve(&body) {
            Some(Value::Array(rows)) => Ok(rows.clone()),
            _ => Err(UpstreamError::http(SYSTEM, 200, "billing response has no row list")),
        },
        Value::Null => Ok(Vec::new()),
        _ => Err(UpstreamError::http(SYSTEM, 200, "billing response is not a list")),
    }
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

impl HirePlatform for HirePlatformClient {
    async fn fetch_job(&self, job_id: &JobId) -> Result<Value, UpstreamError> {
        debug!(job_id = %job_id, "fetching job");
        match self.get(JOB_PATH, &[("job", job_id.as_str())]).await {
            Err(UpstreamError {
                status: Some(404), ..
            }) => Ok(Value::Null),
            other => other,
        }
    }

    async fn fetch_billing(&self, job_id: &JobId) -> Result<Vec<Value>, UpstreamError> {
        debug!(job_id = %job_id, "fetching billing list");
        let body = self
            .get(BILLING_PATH, &[("main_id", job_id.as_str()), ("type", "1")])
            .await?;
        billing_rows(body)
    }

    async fn create_deposit(&self, deposit: NewDeposit) -> Result<DepositId, UpstreamError> {
        let memo = deposit.reference.clone().unwrap_or_default();
        let form = [
            ("ID", "0".to_string()),
            ("JOB", deposit.job_id.to_string()),
            ("DATE", deposit.date.format("%Y-%m-%d").to_string()),
            ("DESCRIPTION", deposit.description.clone()),
            ("AMOUNT", money(deposit.amount)),
            ("MEMO", memo),
            ("ACC_ACCOUNT_ID", self.bank_account_id.clone()),
            ("ACC_PACKAGE_ID", self.accounting_package_id.clone()),
            ("local", deposit.date.format("%Y-%m-%d").to_string()),
        ];
        let body = self.post(DEPOSIT_SAVE_PATH, &form).await?;
        let id = DepositId::normalize(&saved_id(&body)?);
        info!(job_id = %deposit.job_id, deposit_id = %id, amount = %deposit.amount, "deposit created");
        Ok(id)
    }

    async fn create_refund_application(
        &self,
        application: RefundApplication,
    ) -> Result<String, UpstreamError> {
        let form = [
            ("ID", "0".to_string()),
            ("JOB", application.job_id.to_string()),
            ("OWNER", application.deposit_id.to_string()),
            ("DATE", application.date.format("%Y-%m-%d").to_string()),
            ("DESCRIPTION", application.description.clone()),
            ("AMOUNT", money(-application.amount)),
            ("ACC_ACCOUNT_ID", self.bank_account_id.clone()),
        ];
        let body = self.post(PAYMENT_SAVE_PATH, &form).await?;
        let id = saved_id(&body)?;
        info!(job_id = %application.job_id, deposit_id = %application.deposit_id, application_id = %id, "refund application created");
        Ok(id)
    }

    async fn append_note(&self, job_id: &JobId, note: &str) -> Result<(), UpstreamError> {
        let form = [("job", job_id.to_string()), ("note", note.to_string())];
        self.post(NOTE_PATH, &form).await?;
        debug!(job_id = %job_id, "job note appended");
        Ok(())
    }

    async fn update_job_status(&self, job_id: &JobId, status: i64) -> Result<(), UpstreamError> {
        let form = [("job", job_id.to_string()), ("status", status.to_string())];
        self.post(STATUS_PATH, &form).await?;
        Ok(())
    }

    async fn trigger_accounting_sync(
        &self,
        job_id: &JobId,
        deposit_id: &DepositId,
    ) -> Result<(), UpstreamError> {
        let form = [
            ("hh_package_type", "1".to_string()),
            ("hh_acc_package_id", self.accounting_package_id.clone()),
            ("hh_task", "post_deposit".to_string()),
            ("hh_id", deposit_id.to_string()),
            ("hh_acc_id", self.bank_account_id.clone()),
            ("job", job_id.to_string()),
        ];
        self.post(ACCOUNTING_TASK_PATH, &form).await?;
        debug!(job_id = %job_id, deposit_id = %deposit_id, "accounting sync triggered");
        Ok(())
    }
}
