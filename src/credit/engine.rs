//! Credit origination and lookups

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    Amount, AmountError, Credit, CreditStatus, DomainError, DomainResult, PaymentScheduleEntry,
    PaymentStatus,
};
use crate::ledger::LedgerService;
use crate::rates::{RateProvider, TimeBoundedRateProvider};
use crate::store::{AccountRepository, CreditRepository, Store, UnitOfWork};

use super::amortization::{build_schedule, validate_term};
use super::CreditPolicy;

/// Credit Engine - creates credits and their schedules
#[derive(Clone)]
pub struct CreditEngine {
    store: Arc<dyn Store>,
    rates: TimeBoundedRateProvider<Arc<dyn RateProvider>>,
    policy: CreditPolicy,
}

impl CreditEngine {
    /// Lookups through `rates` are cut off after `policy.rate_lookup_timeout`.
    pub fn new(store: Arc<dyn Store>, rates: Arc<dyn RateProvider>, policy: CreditPolicy) -> Self {
        Self {
            store,
            rates: TimeBoundedRateProvider::new(rates, policy.rate_lookup_timeout),
            policy,
        }
    }

    /// Originate a credit and disburse its principal into `account_id`.
    ///
    /// The rate is looked up before any write; the credit, its schedule and
    /// the disbursement commit as one unit.
    pub async fn create_credit(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        principal: Decimal,
        term_months: i32,
        description: &str,
    ) -> DomainResult<Credit> {
        {
            let mut uow = self.store.begin().await?;
            let account = uow
                .get_account(account_id)
                .await?
                .ok_or(DomainError::AccountNotFound(account_id))?;
            if !account.is_owned_by(user_id) {
                return Err(DomainError::Forbidden(format!(
                    "account {} does not belong to user {}",
                    account_id, user_id
                )));
            }
            uow.commit().await?;
        }

        let amount = Amount::new(principal)?;
        validate_term(term_months)?;

        let interest_rate = self.effective_rate().await?;

        let start = Utc::now();
        let plan = build_schedule(amount.value(), interest_rate, term_months, start)?;

        // Every installment, penalty included, must stay collectable
        let penalty_factor = Decimal::ONE + self.policy.penalty_rate;
        if plan
            .installments
            .iter()
            .any(|i| i.total * penalty_factor > Amount::MAX)
        {
            return Err(AmountError::Overflow.into());
        }

        let credit = Credit {
            id: Uuid::new_v4(),
            user_id,
            account_id,
            principal: amount.value(),
            interest_rate,
            term_months,
            monthly_payment: plan.monthly_payment,
            status: CreditStatus::Active,
            start_date: start,
            end_date: plan.end_date,
            description: description.to_string(),
            created_at: start,
            updated_at: start,
        };

        let mut uow = self.store.begin().await?;
        uow.insert_credit(&credit).await?;
        for installment in &plan.installments {
            let entry = PaymentScheduleEntry {
                id: Uuid::new_v4(),
                credit_id: credit.id,
                payment_number: installment.payment_number,
                due_date: installment.due_date,
                principal_amount: installment.principal,
                interest_amount: installment.interest,
                scheduled_amount: installment.total,
                total_amount: installment.total,
                penalty_applied: false,
                status: PaymentStatus::Pending,
                paid_at: None,
                created_at: start,
                updated_at: start,
            };
            uow.insert_schedule_entry(&entry).await?;
        }
        let disbursement = LedgerService::disburse(
            &mut *uow,
            account_id,
            credit.id,
            &amount,
            &format!("Credit disbursement: {}", description),
        )
        .await?;
        uow.commit().await?;

        tracing::info!(
            credit_id = %credit.id,
            user_id = %user_id,
            account_id = %account_id,
            principal = %credit.principal,
            interest_rate = %interest_rate,
            term_months = term_months,
            monthly_payment = %credit.monthly_payment,
            transaction_id = %disbursement.id,
            "Credit originated"
        );
        Ok(credit)
    }

    pub async fn get_credit(&self, credit_id: Uuid) -> DomainResult<Credit> {
        let mut uow = self.store.begin().await?;
        let credit = uow
            .get_credit(credit_id)
            .await?
            .ok_or(DomainError::CreditNotFound(credit_id))?;
        uow.commit().await?;
        Ok(credit)
    }

    /// Credits of `user_id`, newest first
    pub async fn list_user_credits(&self, user_id: Uuid) -> DomainResult<Vec<Credit>> {
        let mut uow = self.store.begin().await?;
        let credits = uow.list_user_credits(user_id).await?;
        uow.commit().await?;
        Ok(credits)
    }

    /// Stored schedule ordered by payment number
    pub async fn payment_schedule(&self, credit_id: Uuid) -> DomainResult<Vec<PaymentScheduleEntry>> {
        let mut uow = self.store.begin().await?;
        if uow.get_credit(credit_id).await?.is_none() {
            return Err(DomainError::CreditNotFound(credit_id));
        }
        let schedule = uow.get_schedule(credit_id).await?;
        uow.commit().await?;
        Ok(schedule)
    }

    async fn effective_rate(&self) -> DomainResult<Decimal> {
        let base = self.rates.current_base_rate().await.map_err(|e| {
            tracing::warn!(error = %e, "Base rate lookup failed");
            DomainError::RateUnavailable(e.to_string())
        })?;

        let rate = base + self.policy.rate_spread;
        if rate < Decimal::ZERO {
            return Err(DomainError::RateUnavailable(format!(
                "effective rate {} is negative",
                rate
            )));
        }
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::{FixedRateProvider, RateError};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct FailingRateProvider;

    #[async_trait]
    impl RateProvider for FailingRateProvider {
        async fn current_base_rate(&self) -> Result<Decimal, RateError> {
            Err(RateError::Source("service down".into()))
        }
    }

    async fn setup(rates: Arc<dyn RateProvider>) -> (CreditEngine, LedgerService, InMemoryStore) {
        let store = InMemoryStore::new();
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        (
            CreditEngine::new(Arc::clone(&shared), rates, CreditPolicy::default()),
            LedgerService::new(shared),
            store,
        )
    }

    #[tokio::test]
    async fn test_rate_includes_spread() {
        let (engine, ledger, _) = setup(Arc::new(FixedRateProvider::new(dec!(16)))).await;
        let user_id = Uuid::new_v4();
        let account = ledger.open_account(user_id, "Main").await.unwrap();

        let credit = engine
            .create_credit(user_id, account.id, dec!(50000), 24, "car")
            .await
            .unwrap();

        assert_eq!(credit.interest_rate, dec!(21));
        assert_eq!(credit.status, CreditStatus::Active);
        assert_eq!(engine.payment_schedule(credit.id).await.unwrap().len(), 24);
        assert_eq!(
            ledger.get_account(account.id).await.unwrap().balance.value(),
            dec!(50000)
        );
    }

    #[tokio::test]
    async fn test_foreign_account_is_forbidden() {
        let (engine, ledger, store) = setup(Arc::new(FixedRateProvider::new(dec!(16)))).await;
        let account = ledger.open_account(Uuid::new_v4(), "Main").await.unwrap();

        let err = engine
            .create_credit(Uuid::new_v4(), account.id, dec!(1000), 12, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        assert_eq!(store.credit_count().await, 0);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (engine, ledger, _) = setup(Arc::new(FixedRateProvider::new(dec!(16)))).await;
        let user_id = Uuid::new_v4();
        let account = ledger.open_account(user_id, "Main").await.unwrap();

        assert!(matches!(
            engine.create_credit(user_id, account.id, dec!(0), 12, "x").await,
            Err(DomainError::InvalidAmount(_))
        ));
        assert_eq!(
            engine.create_credit(user_id, account.id, dec!(100), 0, "x").await.unwrap_err(),
            DomainError::InvalidTerm(0)
        );
        let missing = Uuid::new_v4();
        assert_eq!(
            engine.create_credit(user_id, missing, dec!(100), 12, "x").await.unwrap_err(),
            DomainError::AccountNotFound(missing)
        );
    }

    #[tokio::test]
    async fn test_rate_failure_writes_nothing() {
        let (engine, ledger, store) = setup(Arc::new(FailingRateProvider)).await;
        let user_id = Uuid::new_v4();
        let account = ledger.open_account(user_id, "Main").await.unwrap();

        let err = engine
            .create_credit(user_id, account.id, dec!(1000), 12, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::RateUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(store.credit_count().await, 0);
        assert!(store.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_negative_effective_rate() {
        let (engine, ledger, _) = setup(Arc::new(FixedRateProvider::new(dec!(-6)))).await;
        let user_id = Uuid::new_v4();
        let account = ledger.open_account(user_id, "Main").await.unwrap();

        assert!(matches!(
            engine.create_credit(user_id, account.id, dec!(1000), 12, "x").await,
            Err(DomainError::RateUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_installment_over_limit_is_rejected() {
        let (engine, ledger, store) = setup(Arc::new(FixedRateProvider::new(dec!(16)))).await;
        let user_id = Uuid::new_v4();
        let account = ledger.open_account(user_id, "Main").await.unwrap();

        let err = engine
            .create_credit(user_id, account.id, Amount::MAX, 1, "x")
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::from(AmountError::Overflow));
        assert_eq!(store.credit_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_timeout_bounds_rate_lookup() {
        struct StalledRateProvider;

        #[async_trait]
        impl RateProvider for StalledRateProvider {
            async fn current_base_rate(&self) -> Result<Decimal, RateError> {
                std::future::pending().await
            }
        }

        let store = InMemoryStore::new();
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let policy = CreditPolicy {
            rate_lookup_timeout: std::time::Duration::from_secs(2),
            ..CreditPolicy::default()
        };
        let engine = CreditEngine::new(Arc::clone(&shared), Arc::new(StalledRateProvider), policy);
        let ledger = LedgerService::new(shared);
        let user_id = Uuid::new_v4();
        let account = ledger.open_account(user_id, "Main").await.unwrap();

        let err = engine
            .create_credit(user_id, account.id, dec!(1000), 12, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::RateUnavailable(_)));
        assert_eq!(store.credit_count().await, 0);
    }

    #[tokio::test]
    async fn test_lookups() {
        let (engine, ledger, _) = setup(Arc::new(FixedRateProvider::new(dec!(7)))).await;
        let user_id = Uuid::new_v4();
        let account = ledger.open_account(user_id, "Main").await.unwrap();
        let credit = engine
            .create_credit(user_id, account.id, dec!(1000), 6, "phone")
            .await
            .unwrap();

        assert_eq!(engine.get_credit(credit.id).await.unwrap(), credit);
        assert_eq!(engine.list_user_credits(user_id).await.unwrap(), vec![credit]);
        assert!(engine.list_user_credits(Uuid::new_v4()).await.unwrap().is_empty());

        let missing = Uuid::new_v4();
        assert_eq!(
            engine.payment_schedule(missing).await.unwrap_err(),
            DomainError::CreditNotFound(missing)
        );
    }
}
