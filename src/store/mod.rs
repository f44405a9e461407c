//! Store module
//!
//! Persistence boundary for accounts, the transaction log, credits and
//! payment schedules. Every write happens inside a [`UnitOfWork`]: changes
//! become visible on `commit` and are discarded if the unit is dropped.

mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Account, Credit, PaymentScheduleEntry, Transaction};

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait AccountRepository: Send {
    async fn get_account(&mut self, account_id: Uuid) -> StoreResult<Option<Account>>;

    /// Read an account and hold it against concurrent writers until the unit ends
    async fn lock_account(&mut self, account_id: Uuid) -> StoreResult<Option<Account>>;

    /// Add `delta` to the balance, refusing with `InsufficientFunds` if the
    /// result would be negative. Returns the updated account.
    async fn adjust_balance(&mut self, account_id: Uuid, delta: Decimal) -> StoreResult<Account>;

    async fn save_account(&mut self, account: &Account) -> StoreResult<()>;
}

#[async_trait]
pub trait TransactionRepository: Send {
    async fn append_transaction(&mut self, transaction: &Transaction) -> StoreResult<()>;

    /// Records touching `account_id` created at or after `since`, newest first
    async fn list_transactions(
        &mut self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>>;
}

#[async_trait]
pub trait CreditRepository: Send {
    async fn insert_credit(&mut self, credit: &Credit) -> StoreResult<()>;

    async fn get_credit(&mut self, credit_id: Uuid) -> StoreResult<Option<Credit>>;

    async fn update_credit(&mut self, credit: &Credit) -> StoreResult<()>;

    async fn list_user_credits(&mut self, user_id: Uuid) -> StoreResult<Vec<Credit>>;

    /// Full schedule ordered by payment number
    async fn get_schedule(&mut self, credit_id: Uuid) -> StoreResult<Vec<PaymentScheduleEntry>>;

    /// One entry, held against concurrent writers until the unit ends
    async fn get_schedule_entry(
        &mut self,
        credit_id: Uuid,
        payment_number: i32,
    ) -> StoreResult<Option<PaymentScheduleEntry>>;

    async fn insert_schedule_entry(&mut self, entry: &PaymentScheduleEntry) -> StoreResult<()>;

    async fn update_schedule_entry(&mut self, entry: &PaymentScheduleEntry) -> StoreResult<()>;

    /// Unpaid entries due before `now` on active or overdue credits,
    /// ordered by credit then payment number
    async fn list_due_entries(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<PaymentScheduleEntry>>;
}

/// One atomic storage transaction
#[async_trait]
pub trait UnitOfWork: AccountRepository + TransactionRepository + CreditRepository {
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Source of units of work
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;
}
