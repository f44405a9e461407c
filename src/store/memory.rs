//! In-memory store
//!
//! A thread-safe store backed by `Arc<Mutex<..>>`. A unit of work holds the
//! mutex for its whole lifetime and edits a staged copy of the state, so
//! units are serialized and an uncommitted unit leaves nothing behind.
//! Used by the test suites and for local runs without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{Account, Credit, PaymentScheduleEntry, Transaction};

use super::{
    AccountRepository, CreditRepository, Store, StoreError, StoreResult, TransactionRepository,
    UnitOfWork,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<Transaction>,
    credits: HashMap<Uuid, Credit>,
    schedules: HashMap<Uuid, Vec<PaymentScheduleEntry>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_append: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next transaction-log append fail with `StoreError::Unavailable`
    pub fn fail_next_append(&self) {
        self.fail_next_append.store(true, Ordering::SeqCst);
    }

    /// Committed transaction log, oldest first
    pub async fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().await.transactions.clone()
    }

    /// Committed account snapshot
    pub async fn account(&self, account_id: Uuid) -> Option<Account> {
        self.state.lock().await.accounts.get(&account_id).cloned()
    }

    /// Committed credit snapshot
    pub async fn credit(&self, credit_id: Uuid) -> Option<Credit> {
        self.state.lock().await.credits.get(&credit_id).cloned()
    }

    /// Committed schedule for a credit
    pub async fn schedule(&self, credit_id: Uuid) -> Vec<PaymentScheduleEntry> {
        self.state
            .lock()
            .await
            .schedules
            .get(&credit_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn credit_count(&self) -> usize {
        self.state.lock().await.credits.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            staged,
            fail_next_append: Arc::clone(&self.fail_next_append),
        }))
    }
}

/// Unit of work over [`InMemoryStore`]
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    fail_next_append: Arc<AtomicBool>,
}

#[async_trait]
impl AccountRepository for MemoryUnitOfWork {
    async fn get_account(&mut self, account_id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self.staged.accounts.get(&account_id).cloned())
    }

    async fn lock_account(&mut self, account_id: Uuid) -> StoreResult<Option<Account>> {
        // the unit already holds the store mutex
        self.get_account(account_id).await
    }

    async fn adjust_balance(&mut self, account_id: Uuid, delta: Decimal) -> StoreResult<Account> {
        let account = self
            .staged
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::AccountNotFound(account_id))?;

        let available = account.balance.value();
        account.balance = account
            .balance
            .adjust(delta)
            .map_err(|_| StoreError::InsufficientFunds {
                account_id,
                required: -delta,
                available,
            })?;
        account.updated_at = Utc::now();

        Ok(account.clone())
    }

    async fn save_account(&mut self, account: &Account) -> StoreResult<()> {
        self.staged.accounts.insert(account.id, account.clone());
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for MemoryUnitOfWork {
    async fn append_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("transaction log write failed".to_string()));
        }
        self.staged.transactions.push(transaction.clone());
        Ok(())
    }

    async fn list_transactions(
        &mut self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>> {
        let mut found: Vec<Transaction> = self
            .staged
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.touches(account_id) && tx.created_at >= since)
            .cloned()
            .collect();
        // stable: equal timestamps keep newest-appended first
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[async_trait]
impl CreditRepository for MemoryUnitOfWork {
    async fn insert_credit(&mut self, credit: &Credit) -> StoreResult<()> {
        self.staged.credits.insert(credit.id, credit.clone());
        Ok(())
    }

    async fn get_credit(&mut self, credit_id: Uuid) -> StoreResult<Option<Credit>> {
        Ok(self.staged.credits.get(&credit_id).cloned())
    }

    async fn update_credit(&mut self, credit: &Credit) -> StoreResult<()> {
        match self.staged.credits.get_mut(&credit.id) {
            Some(existing) => {
                *existing = credit.clone();
                Ok(())
            }
            None => Err(StoreError::CreditNotFound(credit.id)),
        }
    }

    async fn list_user_credits(&mut self, user_id: Uuid) -> StoreResult<Vec<Credit>> {
        let mut credits: Vec<Credit> = self
            .staged
            .credits
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        credits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(credits)
    }

    async fn get_schedule(&mut self, credit_id: Uuid) -> StoreResult<Vec<PaymentScheduleEntry>> {
        let mut schedule = self.staged.schedules.get(&credit_id).cloned().unwrap_or_default();
        schedule.sort_by_key(|e| e.payment_number);
        Ok(schedule)
    }

    async fn get_schedule_entry(
        &mut self,
        credit_id: Uuid,
        payment_number: i32,
    ) -> StoreResult<Option<PaymentScheduleEntry>> {
        Ok(self
            .staged
            .schedules
            .get(&credit_id)
            .and_then(|entries| entries.iter().find(|e| e.payment_number == payment_number))
            .cloned())
    }

    async fn insert_schedule_entry(&mut self, entry: &PaymentScheduleEntry) -> StoreResult<()> {
        if !self.staged.credits.contains_key(&entry.credit_id) {
            return Err(StoreError::CreditNotFound(entry.credit_id));
        }
        self.staged
            .schedules
            .entry(entry.credit_id)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn update_schedule_entry(&mut self, entry: &PaymentScheduleEntry) -> StoreResult<()> {
        let existing = self
            .staged
            .schedules
            .get_mut(&entry.credit_id)
            .and_then(|entries| {
                entries
                    .iter_mut()
                    .find(|e| e.payment_number == entry.payment_number)
            })
            .ok_or(StoreError::EntryNotFound {
                credit_id: entry.credit_id,
                payment_number: entry.payment_number,
            })?;
        *existing = entry.clone();
        Ok(())
    }

    async fn list_due_entries(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<PaymentScheduleEntry>> {
        let mut due: Vec<PaymentScheduleEntry> = self
            .staged
            .schedules
            .iter()
            .filter(|(credit_id, _)| {
                self.staged
                    .credits
                    .get(credit_id)
                    .map(|c| c.status.is_open())
                    .unwrap_or(false)
            })
            .flat_map(|(_, entries)| entries.iter().filter(|e| e.is_due(now)).cloned())
            .collect();
        due.sort_by_key(|e| (e.credit_id, e.payment_number));
        Ok(due)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}
