//! Domain Error Types
//!
//! Errors returned by the ledger, credit engine and payment processor.
//! The calling layer maps these onto its own status codes.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::AmountError;
use crate::store::StoreError;

/// Result alias for ledger and credit operations
pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Amount is zero, negative, or otherwise malformed
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Credit term outside the supported range
    #[error("Invalid term: {0} months")]
    InvalidTerm(i32),

    /// Transfer source and destination are the same account
    #[error("Cannot transfer to the same account")]
    SameAccount,

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Credit not found: {0}")]
    CreditNotFound(Uuid),

    #[error("Payment {payment_number} not found for credit {credit_id}")]
    PaymentNotFound { credit_id: Uuid, payment_number: i32 },

    /// Caller does not own the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Payment was already settled
    #[error("Payment {payment_number} of credit {credit_id} already processed")]
    AlreadyProcessed { credit_id: Uuid, payment_number: i32 },

    /// Interest rate could not be obtained in time
    #[error("Interest rate unavailable: {0}")]
    RateUnavailable(String),

    /// Storage failed; the current unit of work was rolled back
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl DomainError {
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    /// Check if this is a client error (caller's fault, terminal)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_)
                | Self::InvalidTerm(_)
                | Self::SameAccount
                | Self::Forbidden(_)
                | Self::InsufficientFunds { .. }
                | Self::AlreadyProcessed { .. }
        )
    }

    /// Check if the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateUnavailable(_) | Self::PersistenceFailure(_)
        )
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => Self::AccountNotFound(id),
            StoreError::CreditNotFound(id) => Self::CreditNotFound(id),
            StoreError::EntryNotFound {
                credit_id,
                payment_number,
            } => Self::PaymentNotFound {
                credit_id,
                payment_number,
            },
            StoreError::InsufficientFunds {
                required,
                available,
                ..
            } => Self::InsufficientFunds {
                required,
                available,
            },
            other => Self::PersistenceFailure(other.to_string()),
        }
    }
}
