//! Domain module
//!
//! Core records, money primitives and the error taxonomy.

pub mod account;
pub mod amount;
pub mod credit;
pub mod error;
pub mod transaction;

pub use account::Account;
pub use amount::{round_cents, Amount, AmountError, Balance};
pub use credit::{settle_status, Credit, CreditStatus, PaymentScheduleEntry, PaymentStatus};
pub use error::{DomainError, DomainResult};
pub use transaction::{Transaction, TransactionKind, TransactionStatus};
