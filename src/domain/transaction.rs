//! Transaction log records
//!
//! One record is written per balance-affecting event. Records are never
//! updated once completed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
    CreditDisbursement,
    CreditPayment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
            TransactionKind::CreditDisbursement => "credit_disbursement",
            TransactionKind::CreditPayment => "credit_payment",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "transfer" => Ok(Self::Transfer),
            "credit_disbursement" => Ok(Self::CreditDisbursement),
            "credit_payment" => Ok(Self::CreditPayment),
            other => Err(format!("unknown transaction kind '{}'", other)),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// A balance-affecting event.
///
/// `from_account_id` is the debited side and `to_account_id` the credited
/// side; a transfer fills both, a deposit only the destination, a withdrawal
/// only the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub amount: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_number: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A completed record for a movement that has just been applied
    pub fn completed(
        kind: TransactionKind,
        from_account_id: Option<Uuid>,
        to_account_id: Option<Uuid>,
        amount: &Amount,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            from_account_id,
            to_account_id,
            amount: amount.value(),
            description: description.into(),
            status: TransactionStatus::Completed,
            credit_id: None,
            payment_number: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Tag the record with the credit (and optionally the installment) it settles
    pub fn for_credit(mut self, credit_id: Uuid, payment_number: Option<i32>) -> Self {
        self.credit_id = Some(credit_id);
        self.payment_number = payment_number;
        self
    }

    /// Whether this record debits or credits `account_id`
    pub fn touches(&self, account_id: Uuid) -> bool {
        self.from_account_id == Some(account_id) || self.to_account_id == Some(account_id)
    }
}
