//! Credit and payment schedule records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    Active,
    Paid,
    Overdue,
    Cancelled,
}

impl CreditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditStatus::Active => "active",
            CreditStatus::Paid => "paid",
            CreditStatus::Overdue => "overdue",
            CreditStatus::Cancelled => "cancelled",
        }
    }

    /// Credits whose schedule is still being collected
    pub fn is_open(&self) -> bool {
        matches!(self, CreditStatus::Active | CreditStatus::Overdue)
    }
}

impl FromStr for CreditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown credit status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Overdue,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Overdue => "overdue",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// An installment credit.
///
/// `interest_rate` is the annual rate in percent, captured once at
/// origination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub principal: Decimal,
    pub interest_rate: Decimal,
    pub term_months: i32,
    pub monthly_payment: Decimal,
    pub status: CreditStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One scheduled installment of a credit.
///
/// `scheduled_amount` never changes after origination; `total_amount` is
/// what is currently owed and grows by the penalty at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentScheduleEntry {
    pub id: Uuid,
    pub credit_id: Uuid,
    pub payment_number: i32,
    pub due_date: DateTime<Utc>,
    pub principal_amount: Decimal,
    pub interest_amount: Decimal,
    pub scheduled_amount: Decimal,
    pub total_amount: Decimal,
    pub penalty_applied: bool,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentScheduleEntry {
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }

    /// Pending or overdue entries can still be collected
    pub fn is_payable(&self) -> bool {
        !self.is_paid()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_payable() && self.due_date < now
    }

    /// Add the late penalty once and mark the entry overdue.
    ///
    /// Returns `false` when a penalty was already applied; the owed amount is
    /// left untouched in that case.
    pub fn apply_penalty(&mut self, penalty_rate: Decimal, now: DateTime<Utc>) -> bool {
        self.status = PaymentStatus::Overdue;
        if self.penalty_applied {
            return false;
        }
        self.total_amount = self.scheduled_amount + self.scheduled_amount * penalty_rate;
        self.penalty_applied = true;
        self.updated_at = now;
        true
    }

    pub fn mark_paid(&mut self, now: DateTime<Utc>) {
        self.status = PaymentStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;
    }
}

/// Status a credit should carry given its schedule.
pub fn settle_status(schedule: &[PaymentScheduleEntry]) -> CreditStatus {
    if schedule.iter().all(PaymentScheduleEntry::is_paid) {
        CreditStatus::Paid
    } else if schedule.iter().any(|e| e.status == PaymentStatus::Overdue) {
        CreditStatus::Overdue
    } else {
        CreditStatus::Active
    }
}
