//! Billing policy constants.
//!
//! Mirrors the `billing` configuration section in domain form so the
//! calculators stay independent of the config loader.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use hirebill_shared::config::BillingConfig;

/// Tiered deposit and excess rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingPolicy {
    /// Tax rate applied multiplicatively to the ex-tax job value.
    pub tax_rate: Decimal,
    /// Share of the amount owed required as a deposit.
    pub deposit_rate: Decimal,
    /// Minimum deposit for jobs above the small-job threshold.
    pub minimum_deposit: Decimal,
    /// Jobs owing this much or less must pay in full up front.
    pub small_job_threshold: Decimal,
    /// Remaining balance at or below this is considered paid.
    pub paid_epsilon: Decimal,
    /// Flat excess per on-hire vehicle.
    pub excess_per_vehicle: Decimal,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self::from(&BillingConfig::default())
    }
}

impl From<&BillingConfig> for BillingPolicy {
    fn from(config: &BillingConfig) -> Self {
        Self {
            tax_rate: config.tax_rate,
            deposit_rate: config.deposit_rate,
            minimum_deposit: config.minimum_deposit,
            small_job_threshold: config.small_job_threshold,
            paid_epsilon: config.paid_epsilon,
            excess_per_vehicle: config.excess_per_vehicle,
        }
    }
}

impl BillingPolicy {
    /// Excess required for a number of on-hire vehicles.
    #[must_use]
    pub fn excess_required(&self, vehicle_count: u32) -> Decimal {
        self.excess_per_vehicle * Decimal::from_u32(vehicle_count).unwrap_or_default()
    }
}
