//! Annuity amortization
//!
//! Pure schedule construction: no storage, no clock. The level payment is
//! rounded to cents, each installment's interest is rounded on the remaining
//! principal, and the last installment absorbs the rounding drift so the
//! principal portions add up to the original principal exactly.

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;

use crate::domain::{round_cents, DomainError, DomainResult};

/// Longest supported credit term
pub const MAX_TERM_MONTHS: i32 = 600;

const MONTHS_PER_YEAR: Decimal = Decimal::from_parts(12, 0, 0, false, 0);
const PERCENT: Decimal = Decimal::ONE_HUNDRED;

/// One row of an amortization plan
#[derive(Debug, Clone, PartialEq)]
pub struct Installment {
    pub payment_number: i32,
    pub due_date: DateTime<Utc>,
    pub principal: Decimal,
    pub interest: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmortizationPlan {
    pub monthly_payment: Decimal,
    pub end_date: DateTime<Utc>,
    pub installments: Vec<Installment>,
}

impl AmortizationPlan {
    pub fn total_interest(&self) -> Decimal {
        self.installments.iter().map(|i| i.interest).sum()
    }

    pub fn total_principal(&self) -> Decimal {
        self.installments.iter().map(|i| i.principal).sum()
    }

    pub fn total_due(&self) -> Decimal {
        self.installments.iter().map(|i| i.total).sum()
    }
}

pub fn validate_term(term_months: i32) -> DomainResult<()> {
    if term_months <= 0 || term_months > MAX_TERM_MONTHS {
        return Err(DomainError::InvalidTerm(term_months));
    }
    Ok(())
}

/// Monthly rate as a fraction from an annual rate in percent
pub fn monthly_rate(annual_rate: Decimal) -> Decimal {
    annual_rate / MONTHS_PER_YEAR / PERCENT
}

/// Level monthly payment `P * r * (1+r)^n / ((1+r)^n - 1)`, or `P / n` at
/// zero interest, rounded to cents.
pub fn level_payment(
    principal: Decimal,
    annual_rate: Decimal,
    term_months: i32,
) -> DomainResult<Decimal> {
    validate_term(term_months)?;
    let n = Decimal::from(term_months);
    let r = monthly_rate(annual_rate);

    if r.is_zero() {
        return Ok(round_cents(principal / n));
    }

    let overflow = || DomainError::InvalidAmount("payment calculation overflow".to_string());

    let base = Decimal::ONE + r;
    let mut factor = Decimal::ONE;
    for _ in 0..term_months {
        factor = factor.checked_mul(base).ok_or_else(overflow)?;
    }

    let denominator = factor - Decimal::ONE;
    if denominator.is_zero() {
        return Ok(round_cents(principal / n));
    }

    let numerator = principal
        .checked_mul(r)
        .and_then(|v| v.checked_mul(factor))
        .ok_or_else(overflow)?;
    Ok(round_cents(numerator / denominator))
}

/// Build the full schedule for a credit starting at `start`.
///
/// Installment `i` is due `start + i` calendar months; chrono clamps to the
/// last day of shorter months.
pub fn build_schedule(
    principal: Decimal,
    annual_rate: Decimal,
    term_months: i32,
    start: DateTime<Utc>,
) -> DomainResult<AmortizationPlan> {
    if principal <= Decimal::ZERO {
        return Err(DomainError::InvalidAmount(format!(
            "principal must be positive (got {})",
            principal
        )));
    }
    let payment = level_payment(principal, annual_rate, term_months)?;
    if payment <= Decimal::ZERO {
        return Err(DomainError::InvalidAmount(format!(
            "principal {} is too small for a {} month term",
            principal, term_months
        )));
    }

    let r = monthly_rate(annual_rate);
    let mut remaining = principal;
    let mut installments = Vec::with_capacity(term_months as usize);

    for number in 1..=term_months {
        let due_date = add_months(start, number, term_months)?;
        let interest = round_cents(remaining * r);
        let principal_part = if number == term_months {
            remaining
        } else {
            (payment - interest).max(Decimal::ZERO).min(remaining)
        };
        remaining -= principal_part;

        installments.push(Installment {
            payment_number: number,
            due_date,
            principal: principal_part,
            interest,
            total: principal_part + interest,
        });
    }

    Ok(AmortizationPlan {
        monthly_payment: payment,
        end_date: add_months(start, term_months, term_months)?,
        installments,
    })
}

fn add_months(start: DateTime<Utc>, months: i32, term_months: i32) -> DomainResult<DateTime<Utc>> {
    start
        .checked_add_months(Months::new(months as u32))
        .ok_or(DomainError::InvalidTerm(term_months))
}
