//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bank_ledger::rates::{FixedRateProvider, RateError, RateProvider};
use bank_ledger::store::{InMemoryStore, Store};
use bank_ledger::{CreditEngine, CreditPolicy, LedgerService, OverdueScheduler, PaymentProcessor};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use uuid::Uuid;

/// Every service wired to one in-memory store
pub struct TestBank {
    pub store: InMemoryStore,
    pub ledger: LedgerService,
    pub credits: CreditEngine,
    pub payments: PaymentProcessor,
    pub scheduler: OverdueScheduler,
}

impl TestBank {
    /// Base rate 16%, default spread and penalty
    pub fn new() -> Self {
        Self::with_rates(Arc::new(FixedRateProvider::new(dec!(16))), CreditPolicy::default())
    }

    pub fn with_rates(rates: Arc<dyn RateProvider>, policy: CreditPolicy) -> Self {
        let store = InMemoryStore::new();
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let payments = PaymentProcessor::new(Arc::clone(&shared), policy);
        Self {
            ledger: LedgerService::new(Arc::clone(&shared)),
            credits: CreditEngine::new(Arc::clone(&shared), rates, policy),
            scheduler: OverdueScheduler::new(Arc::clone(&shared), payments.clone()),
            payments,
            store,
        }
    }

    /// Open an account for a fresh user and deposit `balance` into it
    pub async fn funded_account(&self, balance: Decimal) -> (Uuid, Uuid) {
        let user_id = Uuid::new_v4();
        let account = self.ledger.open_account(user_id, "Main").await.unwrap();
        if balance > Decimal::ZERO {
            self.ledger.deposit(account.id, balance, "initial").await.unwrap();
        }
        (user_id, account.id)
    }

    pub async fn balance(&self, account_id: Uuid) -> Decimal {
        self.ledger.get_account(account_id).await.unwrap().balance.value()
    }
}

/// Zero spread, zero base rate: installments are exact fractions of the principal
pub fn interest_free() -> TestBank {
    TestBank::with_rates(
        Arc::new(FixedRateProvider::new(dec!(0))),
        CreditPolicy {
            rate_spread: dec!(0),
            penalty_rate: dec!(0.10),
            ..CreditPolicy::default()
        },
    )
}

/// Rate provider that answers only after `delay`
pub struct SlowRateProvider {
    pub delay: Duration,
}

#[async_trait]
impl RateProvider for SlowRateProvider {
    async fn current_base_rate(&self) -> Result<Decimal, RateError> {
        tokio::time::sleep(self.delay).await;
        Ok(dec!(16))
    }
}

/// Setup test database - apply schema and truncate tables
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    pool.execute(include_str!("../../migrations/001_ledger.sql"))
        .await
        .expect("Failed to apply schema");

    sqlx::query("TRUNCATE TABLE transactions, payment_schedules, credits, accounts, key_rates CASCADE")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    pool
}
