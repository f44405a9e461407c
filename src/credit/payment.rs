//! Installment collection and late-payment penalty

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{settle_status, Amount, CreditStatus, DomainError, DomainResult};
use crate::ledger::LedgerService;
use crate::store::{AccountRepository, CreditRepository, Store, UnitOfWork};

use super::CreditPolicy;

/// Outcome of a successful installment payment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    pub credit_id: Uuid,
    pub payment_number: i32,
    pub amount: Decimal,
    pub transaction_id: Uuid,
    pub credit_status: CreditStatus,
}

/// Payment Processor - the only writer of schedule entries and credit status
#[derive(Clone)]
pub struct PaymentProcessor {
    store: Arc<dyn Store>,
    policy: CreditPolicy,
}

impl PaymentProcessor {
    pub fn new(store: Arc<dyn Store>, policy: CreditPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn process_payment(
        &self,
        credit_id: Uuid,
        payment_number: i32,
    ) -> DomainResult<PaymentReceipt> {
        self.process_payment_at(credit_id, payment_number, Utc::now())
            .await
    }

    /// Collect installment `payment_number`, stamping changes with `now`.
    ///
    /// When the account cannot cover the amount due, the first failure adds
    /// the penalty and marks the entry and the credit overdue; that change is
    /// committed before `InsufficientFunds` is returned.
    ///
    /// Paying installment number `term_months` marks the credit paid.
    pub async fn process_payment_at(
        &self,
        credit_id: Uuid,
        payment_number: i32,
        now: DateTime<Utc>,
    ) -> DomainResult<PaymentReceipt> {
        let mut uow = self.store.begin().await?;

        let mut credit = uow
            .get_credit(credit_id)
            .await?
            .ok_or(DomainError::CreditNotFound(credit_id))?;
        let mut entry = uow
            .get_schedule_entry(credit_id, payment_number)
            .await?
            .ok_or(DomainError::PaymentNotFound {
                credit_id,
                payment_number,
            })?;

        if entry.is_paid() {
            return Err(DomainError::AlreadyProcessed {
                credit_id,
                payment_number,
            });
        }

        let account = uow
            .lock_account(credit.account_id)
            .await?
            .ok_or(DomainError::AccountNotFound(credit.account_id))?;

        if !account.balance.is_sufficient_for(entry.total_amount) {
            let available = account.balance.value();
            if entry.apply_penalty(self.policy.penalty_rate, now) {
                uow.update_schedule_entry(&entry).await?;
                credit.status = CreditStatus::Overdue;
                credit.updated_at = now;
                uow.update_credit(&credit).await?;
                uow.commit().await?;

                tracing::warn!(
                    credit_id = %credit_id,
                    payment_number = payment_number,
                    scheduled_amount = %entry.scheduled_amount,
                    total_amount = %entry.total_amount,
                    "Late payment penalty applied"
                );
            }
            // A repeat failure changes nothing: the first one already left the
            // entry and the credit overdue, and only a payment clears that.
            return Err(DomainError::insufficient_funds(entry.total_amount, available));
        }

        let amount = Amount::new(entry.total_amount)?;
        let tx = LedgerService::collect(
            &mut *uow,
            credit.account_id,
            credit_id,
            payment_number,
            &amount,
            &format!("Credit payment #{}", payment_number),
        )
        .await?;

        entry.mark_paid(now);
        uow.update_schedule_entry(&entry).await?;

        // The final installment closes the credit even if earlier ones are open
        credit.status =
            if payment_number == credit.term_months || credit.status == CreditStatus::Paid {
                CreditStatus::Paid
            } else {
                settle_status(&uow.get_schedule(credit_id).await?)
            };
        credit.updated_at = now;
        uow.update_credit(&credit).await?;
        uow.commit().await?;

        tracing::info!(
            credit_id = %credit_id,
            payment_number = payment_number,
            amount = %amount,
            transaction_id = %tx.id,
            credit_status = credit.status.as_str(),
            "Credit payment collected"
        );

        Ok(PaymentReceipt {
            credit_id,
            payment_number,
            amount: amount.value(),
            transaction_id: tx.id,
            credit_status: credit.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit::CreditEngine;
    use crate::domain::{PaymentStatus, TransactionKind};
    use crate::rates::FixedRateProvider;
    use crate::store::InMemoryStore;
    use rust_decimal_macros::dec;

    struct Fixture {
        store: InMemoryStore,
        ledger: LedgerService,
        processor: PaymentProcessor,
        account_id: Uuid,
        credit_id: Uuid,
    }

    /// A zero-interest 3 x 100 credit; the account holds only the disbursement
    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let policy = CreditPolicy {
            rate_spread: dec!(0),
            penalty_rate: dec!(0.10),
            ..CreditPolicy::default()
        };
        let ledger = LedgerService::new(Arc::clone(&shared));
        let engine = CreditEngine::new(
            Arc::clone(&shared),
            Arc::new(FixedRateProvider::new(dec!(0))),
            policy,
        );
        let processor = PaymentProcessor::new(shared, policy);

        let user_id = Uuid::new_v4();
        let account = ledger.open_account(user_id, "Main").await.unwrap();
        let credit = engine
            .create_credit(user_id, account.id, dec!(300), 3, "test")
            .await
            .unwrap();

        Fixture {
            store,
            ledger,
            processor,
            account_id: account.id,
            credit_id: credit.id,
        }
    }

    #[tokio::test]
    async fn test_payment_debits_total() {
        let f = fixture().await;

        let receipt = f.processor.process_payment(f.credit_id, 1).await.unwrap();

        assert_eq!(receipt.amount, dec!(100));
        assert_eq!(receipt.credit_status, CreditStatus::Active);
        assert_eq!(f.ledger.get_account(f.account_id).await.unwrap().balance.value(), dec!(200));

        let tx = f
            .store
            .transactions()
            .await
            .into_iter()
            .find(|t| t.id == receipt.transaction_id)
            .unwrap();
        assert_eq!(tx.kind, TransactionKind::CreditPayment);
        assert_eq!(tx.credit_id, Some(f.credit_id));
        assert_eq!(tx.payment_number, Some(1));
    }

    #[tokio::test]
    async fn test_second_payment_is_rejected() {
        let f = fixture().await;
        f.processor.process_payment(f.credit_id, 1).await.unwrap();

        let err = f.processor.process_payment(f.credit_id, 1).await.unwrap_err();
        assert_eq!(
            err,
            DomainError::AlreadyProcessed {
                credit_id: f.credit_id,
                payment_number: 1
            }
        );
        assert_eq!(f.ledger.get_account(f.account_id).await.unwrap().balance.value(), dec!(200));
    }

    #[tokio::test]
    async fn test_unknown_credit_and_entry() {
        let f = fixture().await;
        let missing = Uuid::new_v4();

        assert_eq!(
            f.processor.process_payment(missing, 1).await.unwrap_err(),
            DomainError::CreditNotFound(missing)
        );
        assert_eq!(
            f.processor.process_payment(f.credit_id, 4).await.unwrap_err(),
            DomainError::PaymentNotFound {
                credit_id: f.credit_id,
                payment_number: 4
            }
        );
    }

    #[tokio::test]
    async fn test_penalty_is_committed_once() {
        let f = fixture().await;
        f.ledger.withdraw(f.account_id, dec!(250), "spent").await.unwrap();

        let err = f.processor.process_payment(f.credit_id, 1).await.unwrap_err();
        assert_eq!(err, DomainError::insufficient_funds(dec!(110), dec!(50)));

        let err = f.processor.process_payment(f.credit_id, 1).await.unwrap_err();
        assert_eq!(err, DomainError::insufficient_funds(dec!(110), dec!(50)));

        let entry = &f.store.schedule(f.credit_id).await[0];
        assert_eq!(entry.total_amount, dec!(110));
        assert_eq!(entry.scheduled_amount, dec!(100));
        assert!(entry.penalty_applied);
        assert_eq!(entry.status, PaymentStatus::Overdue);
        assert_eq!(f.store.credit(f.credit_id).await.unwrap().status, CreditStatus::Overdue);
        assert_eq!(f.ledger.get_account(f.account_id).await.unwrap().balance.value(), dec!(50));
    }

    #[tokio::test]
    async fn test_overdue_entry_can_be_paid_and_credit_recovers() {
        let f = fixture().await;
        f.ledger.withdraw(f.account_id, dec!(250), "spent").await.unwrap();
        f.processor.process_payment(f.credit_id, 1).await.unwrap_err();
        f.ledger.deposit(f.account_id, dec!(60), "top up").await.unwrap();

        let receipt = f.processor.process_payment(f.credit_id, 1).await.unwrap();

        assert_eq!(receipt.amount, dec!(110));
        assert_eq!(receipt.credit_status, CreditStatus::Active);
        assert_eq!(f.ledger.get_account(f.account_id).await.unwrap().balance.value(), dec!(0));
    }

    #[tokio::test]
    async fn test_last_payment_settles_credit() {
        let f = fixture().await;
        f.processor.process_payment(f.credit_id, 1).await.unwrap();
        f.processor.process_payment(f.credit_id, 2).await.unwrap();

        let receipt = f.processor.process_payment(f.credit_id, 3).await.unwrap();

        assert_eq!(receipt.credit_status, CreditStatus::Paid);
        assert_eq!(f.store.credit(f.credit_id).await.unwrap().status, CreditStatus::Paid);
        assert!(f.store.schedule(f.credit_id).await.iter().all(|e| e.is_paid()));
    }

    #[tokio::test]
    async fn test_final_installment_paid_first_settles_credit() {
        let f = fixture().await;

        let receipt = f.processor.process_payment(f.credit_id, 3).await.unwrap();

        assert_eq!(receipt.credit_status, CreditStatus::Paid);
        assert_eq!(f.store.credit(f.credit_id).await.unwrap().status, CreditStatus::Paid);

        // Earlier installments stay payable and the credit stays paid
        let receipt = f.processor.process_payment(f.credit_id, 1).await.unwrap();
        assert_eq!(receipt.credit_status, CreditStatus::Paid);
        assert_eq!(f.ledger.get_account(f.account_id).await.unwrap().balance.value(), dec!(100));
    }

    #[tokio::test]
    async fn test_repeat_shortfall_keeps_credit_overdue() {
        let f = fixture().await;
        f.ledger.withdraw(f.account_id, dec!(300), "spent").await.unwrap();

        f.processor.process_payment(f.credit_id, 1).await.unwrap_err();
        let first = f.store.credit(f.credit_id).await.unwrap();
        f.processor.process_payment(f.credit_id, 1).await.unwrap_err();

        let credit = f.store.credit(f.credit_id).await.unwrap();
        assert_eq!(credit.status, CreditStatus::Overdue);
        assert_eq!(credit.updated_at, first.updated_at);
    }
}
