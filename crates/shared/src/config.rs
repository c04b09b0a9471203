//! Application configuration management.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Admin authentication configuration.
    pub auth: AuthConfig,
    /// Hire platform connection.
    pub hire_platform: HirePlatformConfig,
    /// Payments processor connection.
    pub payments: PaymentsConfig,
    /// Board system connection.
    pub board: BoardConfig,
    /// Billing business rules.
    #[serde(default)]
    pub billing: BillingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Admin authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret key for signing session tokens.
    pub session_secret: String,
    /// Argon2 PHC string of the admin password.
    pub admin_password_hash: String,
    /// Session token lifetime in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// Failed login attempts allowed per window before lockout.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Sliding window for counting failed attempts, in seconds.
    #[serde(default = "default_attempt_window")]
    pub attempt_window_secs: u64,
    /// Lockout duration once the limit is hit, in seconds.
    #[serde(default = "default_lockout")]
    pub lockout_secs: u64,
}

fn default_session_ttl() -> u64 {
    43_200 // 12 hours
}

fn default_max_attempts() -> u32 {
    5
}

fn default_attempt_window() -> u64 {
    900
}

fn default_lockout() -> u64 {
    900
}

/// Hire platform connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HirePlatformConfig {
    /// Base URL of the hire platform.
    pub base_url: String,
    /// Shared secret token passed as a query parameter.
    pub token: String,
    /// Bank account that deposits are recorded against.
    pub bank_account_id: String,
    /// Accounting package that deposits are exported to.
    pub accounting_package_id: String,
    /// Job status code meaning "booked".
    #[serde(default = "default_booked_status")]
    pub booked_status: i64,
    /// IANA timezone used by the hire platform for wall-clock dates.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_booked_status() -> i64 {
    2
}

fn default_timezone() -> String {
    "Europe/London".to_string()
}

fn default_timeout() -> u64 {
    20
}

/// Payments processor connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    /// Base URL of the processor API.
    #[serde(default = "default_payments_url")]
    pub base_url: String,
    /// Secret API key.
    pub secret_key: String,
    /// Shared secret for webhook signatures.
    pub webhook_secret: String,
    /// Three-letter currency code, lowercase.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Where the customer lands after a completed checkout.
    pub success_url: String,
    /// Where the customer lands after abandoning checkout.
    pub cancel_url: String,
    /// Maximum accepted webhook timestamp skew, in seconds.
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_payments_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_currency() -> String {
    "gbp".to_string()
}

fn default_webhook_tolerance() -> i64 {
    300
}

/// Board system connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    /// GraphQL endpoint.
    #[serde(default = "default_board_url")]
    pub api_url: String,
    /// API key.
    pub api_key: String,
    /// Board holding one item per job.
    pub board_id: String,
    /// Column holding the hire platform job number.
    pub job_column_id: String,
    /// Status column for hire deposit/balance state.
    pub deposit_status_column: String,
    /// Status column for excess state.
    pub excess_status_column: String,
    /// Attempts per board call, including the first.
    #[serde(default = "default_board_attempts")]
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds; doubles per retry.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Upper bound of random jitter added to each delay.
    #[serde(default = "default_jitter")]
    pub max_jitter_ms: u64,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_board_url() -> String {
    "https://api.monday.com/v2".to_string()
}

fn default_board_attempts() -> u32 {
    4
}

fn default_base_delay() -> u64 {
    250
}

fn default_jitter() -> u64 {
    100
}

/// Billing business rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Tax rate applied multiplicatively to the ex-tax job value.
    pub tax_rate: Decimal,
    /// Share of the gross job value required as a deposit.
    pub deposit_rate: Decimal,
    /// Minimum deposit for jobs above the small-job threshold.
    pub minimum_deposit: Decimal,
    /// Jobs at or below this gross value must be paid in full up front.
    pub small_job_threshold: Decimal,
    /// Balances at or below this are treated as settled.
    pub paid_epsilon: Decimal,
    /// Excess collected per on-hire vehicle.
    pub excess_per_vehicle: Decimal,
    /// Category-name keywords that mark a line item as a vehicle.
    pub vehicle_keywords: Vec<String>,
    /// Longest hire, in days, that can be covered by a hold.
    pub max_hold_hire_days: i64,
    /// Hours before hire start that the hold window opens.
    pub hold_window_open_hours: i64,
    /// Hours after hire end that the hold window closes.
    pub hold_window_close_hours: i64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(20, 2),
            deposit_rate: Decimal::new(25, 2),
            minimum_deposit: Decimal::new(100, 0),
            small_job_threshold: Decimal::new(300, 0),
            paid_epsilon: Decimal::new(1, 2),
            excess_per_vehicle: Decimal::new(1200, 0),
            vehicle_keywords: vec![
                "vehicle".to_string(),
                "van".to_string(),
                "car".to_string(),
                "minibus".to_string(),
                "truck".to_string(),
            ],
            max_hold_hire_days: 4,
            hold_window_open_hours: 48,
            hold_window_close_hours: 24,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("HIREBILL").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const REQUIRED_VARS: [(&str, Option<&str>); 14] = [
        ("HIREBILL__SERVER__PORT", Some("9090")),
        ("HIREBILL__AUTH__SESSION_SECRET", Some("s3cret")),
        ("HIREBILL__AUTH__ADMIN_PASSWORD_HASH", Some("$argon2id$v=19$m=19456,t=2,p=1$abc$def")),
        ("HIREBILL__HIRE_PLATFORM__BASE_URL", Some("https://hire.example.test")),
        ("HIREBILL__HIRE_PLATFORM__TOKEN", Some("tok")),
        ("HIREBILL__HIRE_PLATFORM__BANK_ACCOUNT_ID", Some("12")),
        ("HIREBILL__HIRE_PLATFORM__ACCOUNTING_PACKAGE_ID", Some("3")),
        ("HIREBILL__PAYMENTS__SECRET_KEY", Some("sk_test")),
        ("HIREBILL__PAYMENTS__WEBHOOK_SECRET", Some("whsec")),
        ("HIREBILL__PAYMENTS__SUCCESS_URL", Some("https://pay.example.test/ok")),
        ("HIREBILL__PAYMENTS__CANCEL_URL", Some("https://pay.example.test/cancel")),
        ("HIREBILL__BOARD__API_KEY", Some("board-key")),
        ("HIREBILL__BOARD__BOARD_ID", Some("42")),
        ("HIREBILL__BOARD__JOB_COLUMN_ID", Some("text_job")),
    ];

    #[test]
    fn test_load_from_environment() {
        let mut vars = REQUIRED_VARS.to_vec();
        vars.push(("HIREBILL__BOARD__DEPOSIT_STATUS_COLUMN", Some("status_dep")));
        vars.push(("HIREBILL__BOARD__EXCESS_STATUS_COLUMN", Some("status_xs")));
        vars.push(("RUN_MODE", Some("test-nonexistent")));

        temp_env::with_vars(vars, || {
            let config = AppConfig::load().unwrap();
            assert_eq!(config.server.port, 9090);
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.auth.session_ttl_secs, 43_200);
            assert_eq!(config.auth.max_attempts, 5);
            assert_eq!(config.hire_platform.booked_status, 2);
            assert_eq!(config.hire_platform.timezone, "Europe/London");
            assert_eq!(config.payments.currency, "gbp");
            assert_eq!(config.board.max_attempts, 4);
            assert_eq!(config.billing.excess_per_vehicle, dec!(1200));
        });
    }

    #[test]
    fn test_billing_defaults() {
        let billing = BillingConfig::default();
        assert_eq!(billing.tax_rate, dec!(0.20));
        assert_eq!(billing.deposit_rate, dec!(0.25));
        assert_eq!(billing.minimum_deposit, dec!(100));
        assert_eq!(billing.small_job_threshold, dec!(300));
        assert_eq!(billing.paid_epsilon, dec!(0.01));
        assert_eq!(billing.max_hold_hire_days, 4);
    }
}
