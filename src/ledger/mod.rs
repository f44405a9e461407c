//! Ledger Service
//!
//! Deposits, withdrawals and transfers. Each movement is one unit of work:
//! the conditional balance adjustment and its transaction record commit
//! together or not at all.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Account, Amount, DomainError, DomainResult, Transaction, TransactionKind};
use crate::store::{AccountRepository, Store, TransactionRepository, UnitOfWork};

/// Default trailing window for transaction history
pub const DEFAULT_HISTORY_DAYS: i64 = 30;

/// Ledger Service - the only writer of account balances
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn Store>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Open a zero-balance account for `user_id`
    pub async fn open_account(&self, user_id: Uuid, name: &str) -> DomainResult<Account> {
        let account = Account::open(user_id, name);

        let mut uow = self.store.begin().await?;
        uow.save_account(&account).await?;
        uow.commit().await?;

        tracing::info!(account_id = %account.id, user_id = %user_id, "Account opened");
        Ok(account)
    }

    pub async fn get_account(&self, account_id: Uuid) -> DomainResult<Account> {
        let mut uow = self.store.begin().await?;
        let account = uow
            .get_account(account_id)
            .await?
            .ok_or(DomainError::AccountNotFound(account_id))?;
        uow.commit().await?;
        Ok(account)
    }

    pub async fn deposit(
        &self,
        account_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> DomainResult<Transaction> {
        let amount = Amount::new(amount)?;

        let mut uow = self.store.begin().await?;
        let account = uow.adjust_balance(account_id, amount.as_credit()).await?;
        let tx = Transaction::completed(
            TransactionKind::Deposit,
            None,
            Some(account_id),
            &amount,
            description,
        );
        uow.append_transaction(&tx).await?;
        uow.commit().await?;

        tracing::info!(
            account_id = %account_id,
            amount = %amount,
            balance = %account.balance,
            transaction_id = %tx.id,
            "Deposit completed"
        );
        Ok(tx)
    }

    pub async fn withdraw(
        &self,
        account_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> DomainResult<Transaction> {
        let amount = Amount::new(amount)?;

        let mut uow = self.store.begin().await?;
        let account = match uow.adjust_balance(account_id, amount.as_debit()).await {
            Ok(account) => account,
            Err(e) => {
                let err = DomainError::from(e);
                tracing::warn!(account_id = %account_id, amount = %amount, error = %err, "Withdrawal refused");
                return Err(err);
            }
        };
        let tx = Transaction::completed(
            TransactionKind::Withdrawal,
            Some(account_id),
            None,
            &amount,
            description,
        );
        uow.append_transaction(&tx).await?;
        uow.commit().await?;

        tracing::info!(
            account_id = %account_id,
            amount = %amount,
            balance = %account.balance,
            transaction_id = %tx.id,
            "Withdrawal completed"
        );
        Ok(tx)
    }

    /// Move `amount` from one account to another as a single record
    pub async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> DomainResult<Transaction> {
        let amount = Amount::new(amount)?;
        if from_account_id == to_account_id {
            return Err(DomainError::SameAccount);
        }

        let mut uow = self.store.begin().await?;

        // Lock in ascending id order so opposite transfers cannot deadlock
        let (first, second) = if from_account_id < to_account_id {
            (from_account_id, to_account_id)
        } else {
            (to_account_id, from_account_id)
        };
        for id in [first, second] {
            uow.lock_account(id)
                .await?
                .ok_or(DomainError::AccountNotFound(id))?;
        }

        if let Err(e) = uow.adjust_balance(from_account_id, amount.as_debit()).await {
            let err = DomainError::from(e);
            tracing::warn!(
                from_account_id = %from_account_id,
                to_account_id = %to_account_id,
                amount = %amount,
                error = %err,
                "Transfer refused"
            );
            return Err(err);
        }
        uow.adjust_balance(to_account_id, amount.as_credit()).await?;

        let tx = Transaction::completed(
            TransactionKind::Transfer,
            Some(from_account_id),
            Some(to_account_id),
            &amount,
            description,
        );
        uow.append_transaction(&tx).await?;
        uow.commit().await?;

        tracing::info!(
            from_account_id = %from_account_id,
            to_account_id = %to_account_id,
            amount = %amount,
            transaction_id = %tx.id,
            "Transfer completed"
        );
        Ok(tx)
    }

    /// Records touching the account within the trailing `window`
    /// (30 days when `None`), newest first
    pub async fn get_transactions(
        &self,
        account_id: Uuid,
        window: Option<Duration>,
    ) -> DomainResult<Vec<Transaction>> {
        let window = window.unwrap_or_else(|| Duration::days(DEFAULT_HISTORY_DAYS));
        let since = Utc::now() - window;

        let mut uow = self.store.begin().await?;
        if uow.get_account(account_id).await?.is_none() {
            return Err(DomainError::AccountNotFound(account_id));
        }
        let transactions = uow.list_transactions(account_id, since).await?;
        uow.commit().await?;

        Ok(transactions)
    }

    /// Pay a credit's principal into its account inside the caller's unit
    pub(crate) async fn disburse(
        uow: &mut dyn UnitOfWork,
        account_id: Uuid,
        credit_id: Uuid,
        amount: &Amount,
        description: &str,
    ) -> DomainResult<Transaction> {
        uow.adjust_balance(account_id, amount.as_credit()).await?;
        let tx = Transaction::completed(
            TransactionKind::CreditDisbursement,
            None,
            Some(account_id),
            amount,
            description,
        )
        .for_credit(credit_id, None);
        uow.append_transaction(&tx).await?;
        Ok(tx)
    }

    /// Debit one installment from the credit's account inside the caller's unit
    pub(crate) async fn collect(
        uow: &mut dyn UnitOfWork,
        account_id: Uuid,
        credit_id: Uuid,
        payment_number: i32,
        amount: &Amount,
        description: &str,
    ) -> DomainResult<Transaction> {
        uow.adjust_balance(account_id, amount.as_debit()).await?;
        let tx = Transaction::completed(
            TransactionKind::CreditPayment,
            Some(account_id),
            None,
            amount,
            description,
        )
        .for_credit(credit_id, Some(payment_number));
        uow.append_transaction(&tx).await?;
        Ok(tx)
    }
}
