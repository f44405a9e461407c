//! Credit module
//!
//! Origination with an annuity schedule, per-installment payment processing
//! and the late-payment penalty.

pub mod amortization;
mod engine;
mod payment;

use rust_decimal::Decimal;
use std::time::Duration;

pub use amortization::{build_schedule, level_payment, AmortizationPlan, Installment, MAX_TERM_MONTHS};
pub use engine::CreditEngine;
pub use payment::{PaymentProcessor, PaymentReceipt};

/// Pricing and penalty parameters shared by origination and collection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreditPolicy {
    /// Percentage points added to the base rate
    pub rate_spread: Decimal,
    /// Fraction of the scheduled amount added once when collection fails
    pub penalty_rate: Decimal,
    /// Longest wait for the base rate at origination
    pub rate_lookup_timeout: Duration,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            rate_spread: Decimal::from(5),
            penalty_rate: Decimal::new(10, 2),
            rate_lookup_timeout: Duration::from_secs(10),
        }
    }
}
