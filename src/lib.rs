//! bank_ledger Library
//!
//! Account ledger, credit origination with annuity schedules, installment
//! collection and the periodic overdue sweep.

pub mod config;
pub mod credit;
pub mod db;
pub mod domain;
mod error;
pub mod jobs;
pub mod ledger;
pub mod rates;
pub mod store;

pub use config::Config;
pub use credit::{CreditEngine, CreditPolicy, PaymentProcessor, PaymentReceipt};
pub use domain::{Amount, AmountError, Balance, DomainError, DomainResult};
pub use error::{AppError, AppResult};
pub use jobs::{OverdueScheduler, SweepReport};
pub use ledger::LedgerService;
