//! PostgreSQL store
//!
//! Each unit of work is one database transaction. Balance changes are a
//! single conditional `UPDATE` so the sufficiency check and the write cannot
//! be separated by a concurrent writer; rows that a decision depends on are
//! read with `FOR UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction as PgTransaction};
use uuid::Uuid;

use crate::domain::{Account, Balance, Credit, PaymentScheduleEntry, Transaction};

use super::{
    AccountRepository, CreditRepository, Store, StoreError, StoreResult, TransactionRepository,
    UnitOfWork,
};

type AccountRow = (Uuid, Uuid, String, Decimal, DateTime<Utc>, DateTime<Utc>);

type TransactionRow = (
    Uuid,
    String,
    Option<Uuid>,
    Option<Uuid>,
    Decimal,
    String,
    String,
    Option<Uuid>,
    Option<i32>,
    DateTime<Utc>,
    DateTime<Utc>,
);

type CreditRow = (
    Uuid,
    Uuid,
    Uuid,
    Decimal,
    Decimal,
    i32,
    Decimal,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

type EntryRow = (
    Uuid,
    Uuid,
    i32,
    DateTime<Utc>,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    bool,
    String,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const ACCOUNT_COLUMNS: &str = "id, user_id, name, balance, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, kind, from_account_id, to_account_id, amount, description, \
     status, credit_id, payment_number, created_at, updated_at";

const CREDIT_COLUMNS: &str = "id, user_id, account_id, principal, interest_rate, term_months, \
     monthly_payment, status, start_date, end_date, description, created_at, updated_at";

const ENTRY_COLUMNS: &str = "ps.id, ps.credit_id, ps.payment_number, ps.due_date, \
     ps.principal_amount, ps.interest_amount, ps.scheduled_amount, ps.total_amount, \
     ps.penalty_applied, ps.status, ps.paid_at, ps.created_at, ps.updated_at";

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// Unit of work over one PostgreSQL transaction
pub struct PgUnitOfWork {
    tx: PgTransaction<'static, Postgres>,
}

fn account_from_row(row: AccountRow) -> StoreResult<Account> {
    let (id, user_id, name, balance, created_at, updated_at) = row;
    let balance = Balance::new(balance)
        .map_err(|e| StoreError::Corrupt(format!("account {}: {}", id, e)))?;
    Ok(Account {
        id,
        user_id,
        name,
        balance,
        created_at,
        updated_at,
    })
}

fn transaction_from_row(row: TransactionRow) -> StoreResult<Transaction> {
    let (
        id,
        kind,
        from_account_id,
        to_account_id,
        amount,
        description,
        status,
        credit_id,
        payment_number,
        created_at,
        updated_at,
    ) = row;
    Ok(Transaction {
        id,
        kind: kind.parse().map_err(StoreError::Corrupt)?,
        from_account_id,
        to_account_id,
        amount,
        description,
        status: status.parse().map_err(StoreError::Corrupt)?,
        credit_id,
        payment_number,
        created_at,
        updated_at,
    })
}

fn credit_from_row(row: CreditRow) -> StoreResult<Credit> {
    let (
        id,
        user_id,
        account_id,
        principal,
        interest_rate,
        term_months,
        monthly_payment,
        status,
        start_date,
        end_date,
        description,
        created_at,
        updated_at,
    ) = row;
    Ok(Credit {
        id,
        user_id,
        account_id,
        principal,
        interest_rate,
        term_months,
        monthly_payment,
        status: status.parse().map_err(StoreError::Corrupt)?,
        start_date,
        end_date,
        description,
        created_at,
        updated_at,
    })
}

fn entry_from_row(row: EntryRow) -> StoreResult<PaymentScheduleEntry> {
    let (
        id,
        credit_id,
        payment_number,
        due_date,
        principal_amount,
        interest_amount,
        scheduled_amount,
        total_amount,
        penalty_applied,
        status,
        paid_at,
        created_at,
        updated_at,
    ) = row;
    Ok(PaymentScheduleEntry {
        id,
        credit_id,
        payment_number,
        due_date,
        principal_amount,
        interest_amount,
        scheduled_amount,
        total_amount,
        penalty_applied,
        status: status.parse().map_err(StoreError::Corrupt)?,
        paid_at,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl AccountRepository for PgUnitOfWork {
    async fn get_account(&mut self, account_id: Uuid) -> StoreResult<Option<Account>> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(account_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(account_from_row).transpose()
    }

    async fn lock_account(&mut self, account_id: Uuid) -> StoreResult<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        );
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(account_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(account_from_row).transpose()
    }

    async fn adjust_balance(&mut self, account_id: Uuid, delta: Decimal) -> StoreResult<Account> {
        let sql = format!(
            r#"
            UPDATE accounts
            SET balance = balance + $2, updated_at = NOW()
            WHERE id = $1 AND balance + $2 >= 0
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(account_id)
            .bind(delta)
            .fetch_optional(&mut *self.tx)
            .await?;

        if let Some(row) = row {
            return account_from_row(row);
        }

        // Either the account is missing or the guard refused the update
        let available: Option<Decimal> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
                .bind(account_id)
                .fetch_optional(&mut *self.tx)
                .await?;

        match available {
            None => Err(StoreError::AccountNotFound(account_id)),
            Some(available) => Err(StoreError::InsufficientFunds {
                account_id,
                required: -delta,
                available,
            }),
        }
    }

    async fn save_account(&mut self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, user_id, name, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET name = $3, updated_at = $6
            "#,
        )
        .bind(account.id)
        .bind(account.user_id)
        .bind(&account.name)
        .bind(account.balance.value())
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for PgUnitOfWork {
    async fn append_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, kind, from_account_id, to_account_id, amount, description,
                status, credit_id, payment_number, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.kind.as_str())
        .bind(transaction.from_account_id)
        .bind(transaction.to_account_id)
        .bind(transaction.amount)
        .bind(&transaction.description)
        .bind(transaction.status.as_str())
        .bind(transaction.credit_id)
        .bind(transaction.payment_number)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn list_transactions(
        &mut self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE (from_account_id = $1 OR to_account_id = $1) AND created_at >= $2
            ORDER BY created_at DESC, seq DESC
            "#,
            TRANSACTION_COLUMNS
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(account_id)
            .bind(since)
            .fetch_all(&mut *self.tx)
            .await?;

        rows.into_iter().map(transaction_from_row).collect()
    }
}

#[async_trait]
impl CreditRepository for PgUnitOfWork {
    async fn insert_credit(&mut self, credit: &Credit) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO credits (
                id, user_id, account_id, principal, interest_rate, term_months,
                monthly_payment, status, start_date, end_date, description,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(credit.id)
        .bind(credit.user_id)
        .bind(credit.account_id)
        .bind(credit.principal)
        .bind(credit.interest_rate)
        .bind(credit.term_months)
        .bind(credit.monthly_payment)
        .bind(credit.status.as_str())
        .bind(credit.start_date)
        .bind(credit.end_date)
        .bind(&credit.description)
        .bind(credit.created_at)
        .bind(credit.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_credit(&mut self, credit_id: Uuid) -> StoreResult<Option<Credit>> {
        let sql = format!("SELECT {} FROM credits WHERE id = $1", CREDIT_COLUMNS);
        let row: Option<CreditRow> = sqlx::query_as(&sql)
            .bind(credit_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(credit_from_row).transpose()
    }

    async fn update_credit(&mut self, credit: &Credit) -> StoreResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE credits
            SET status = $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(credit.id)
        .bind(credit.status.as_str())
        .bind(credit.updated_at)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::CreditNotFound(credit.id));
        }
        Ok(())
    }

    async fn list_user_credits(&mut self, user_id: Uuid) -> StoreResult<Vec<Credit>> {
        let sql = format!(
            "SELECT {} FROM credits WHERE user_id = $1 ORDER BY created_at DESC",
            CREDIT_COLUMNS
        );
        let rows: Vec<CreditRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(credit_from_row).collect()
    }

    async fn get_schedule(&mut self, credit_id: Uuid) -> StoreResult<Vec<PaymentScheduleEntry>> {
        let sql = format!(
            "SELECT {} FROM payment_schedules ps WHERE ps.credit_id = $1 ORDER BY ps.payment_number",
            ENTRY_COLUMNS
        );
        let rows: Vec<EntryRow> = sqlx::query_as(&sql)
            .bind(credit_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(entry_from_row).collect()
    }

    async fn get_schedule_entry(
        &mut self,
        credit_id: Uuid,
        payment_number: i32,
    ) -> StoreResult<Option<PaymentScheduleEntry>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM payment_schedules ps
            WHERE ps.credit_id = $1 AND ps.payment_number = $2
            FOR UPDATE
            "#,
            ENTRY_COLUMNS
        );
        let row: Option<EntryRow> = sqlx::query_as(&sql)
            .bind(credit_id)
            .bind(payment_number)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(entry_from_row).transpose()
    }

    async fn insert_schedule_entry(&mut self, entry: &PaymentScheduleEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_schedules (
                id, credit_id, payment_number, due_date, principal_amount,
                interest_amount, scheduled_amount, total_amount, penalty_applied,
                status, paid_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.id)
        .bind(entry.credit_id)
        .bind(entry.payment_number)
        .bind(entry.due_date)
        .bind(entry.principal_amount)
        .bind(entry.interest_amount)
        .bind(entry.scheduled_amount)
        .bind(entry.total_amount)
        .bind(entry.penalty_applied)
        .bind(entry.status.as_str())
        .bind(entry.paid_at)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_schedule_entry(&mut self, entry: &PaymentScheduleEntry) -> StoreResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE payment_schedules
            SET total_amount = $3,
                penalty_applied = $4,
                status = $5,
                paid_at = $6,
                updated_at = $7
            WHERE credit_id = $1 AND payment_number = $2
            "#,
        )
        .bind(entry.credit_id)
        .bind(entry.payment_number)
        .bind(entry.total_amount)
        .bind(entry.penalty_applied)
        .bind(entry.status.as_str())
        .bind(entry.paid_at)
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::EntryNotFound {
                credit_id: entry.credit_id,
                payment_number: entry.payment_number,
            });
        }
        Ok(())
    }

    async fn list_due_entries(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<PaymentScheduleEntry>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM payment_schedules ps
            JOIN credits c ON c.id = ps.credit_id
            WHERE ps.status IN ('pending', 'overdue')
              AND ps.due_date < $1
              AND c.status IN ('active', 'overdue')
            ORDER BY ps.credit_id, ps.payment_number
            "#,
            ENTRY_COLUMNS
        );
        let rows: Vec<EntryRow> = sqlx::query_as(&sql)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(entry_from_row).collect()
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
