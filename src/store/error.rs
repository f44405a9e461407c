//! Store Errors
//!
//! Error types for the persistence boundary.

use rust_decimal::Decimal;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// Conditional balance update refused because the result would be negative
    #[error("Insufficient funds on account {account_id}: required {required}, available {available}")]
    InsufficientFunds {
        account_id: Uuid,
        required: Decimal,
        available: Decimal,
    },

    #[error("Credit not found: {0}")]
    CreditNotFound(Uuid),

    #[error("Schedule entry {payment_number} not found for credit {credit_id}")]
    EntryNotFound { credit_id: Uuid, payment_number: i32 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend refused the operation (connection lost, injected failure, ...)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped back to a domain record
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Check if retrying the whole unit of work may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Unavailable(_))
    }
}
