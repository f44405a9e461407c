//! Scheduled Jobs
//!
//! The overdue sweep: a background task that periodically collects schedule
//! entries whose due date has passed, going through the payment processor
//! like any other caller. Each outcome is reported to a [`PaymentNotifier`].

mod notifier;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::credit::PaymentProcessor;
use crate::domain::DomainError;
use crate::store::{CreditRepository, Store, StoreError, UnitOfWork};

pub use notifier::{NoticeKind, PaymentNotice, PaymentNotifier, TracingNotifier};

/// Configuration for the overdue scheduler
#[derive(Debug, Clone)]
pub struct OverdueSchedulerConfig {
    /// Time between sweeps (default: 12 hours)
    pub sweep_interval: Duration,
}

impl Default for OverdueSchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(12 * 60 * 60),
        }
    }
}

/// Overdue Scheduler - drives due installments through the payment processor
pub struct OverdueScheduler {
    store: Arc<dyn Store>,
    processor: PaymentProcessor,
    notifier: Arc<dyn PaymentNotifier>,
    config: OverdueSchedulerConfig,
}

impl OverdueScheduler {
    pub fn new(store: Arc<dyn Store>, processor: PaymentProcessor) -> Self {
        Self::with_config(store, processor, OverdueSchedulerConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(
        store: Arc<dyn Store>,
        processor: PaymentProcessor,
        config: OverdueSchedulerConfig,
    ) -> Self {
        Self {
            store,
            processor,
            notifier: Arc::new(TracingNotifier),
            config,
        }
    }

    /// Replace the default log-only notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn PaymentNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Start sweeping in the background.
    /// The first sweep runs immediately.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });
        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            "Overdue scheduler started"
        );

        let mut sweep_interval = interval(self.config.sweep_interval);
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Overdue scheduler stopped");
    }

    /// Run one sweep now (for manual trigger or testing)
    pub async fn run_once(&self) -> SweepReport {
        self.run_once_at(Utc::now()).await
    }

    /// Run one sweep treating `now` as the current time
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let due = match self.due_payments(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(error = %e, "Overdue sweep could not list due payments");
                report.errors.push(format!("Listing due payments: {}", e));
                report.completed_at = Utc::now();
                return report;
            }
        };

        for (credit_id, payment_numbers) in due {
            report.credits_scanned += 1;
            self.sweep_credit(credit_id, &payment_numbers, now, &mut report)
                .await;
        }

        report.completed_at = Utc::now();
        tracing::info!(
            credits_scanned = report.credits_scanned,
            payments_collected = report.payments_collected,
            payments_failed = report.payments_failed,
            errors = report.errors.len(),
            "Overdue sweep completed"
        );
        report
    }

    /// Collect in payment order. A shortfall leaves that installment overdue
    /// and moves on; any other failure ends the pass for this credit.
    async fn sweep_credit(
        &self,
        credit_id: Uuid,
        payment_numbers: &[i32],
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        for &payment_number in payment_numbers {
            match self
                .processor
                .process_payment_at(credit_id, payment_number, now)
                .await
            {
                Ok(receipt) => {
                    report.payments_collected += 1;
                    self.notifier
                        .notify(PaymentNotice {
                            kind: NoticeKind::Collected,
                            credit_id,
                            payment_number,
                            amount: receipt.amount,
                        })
                        .await;
                }
                Err(DomainError::AlreadyProcessed { .. }) => continue,
                Err(DomainError::InsufficientFunds { required, .. }) => {
                    report.payments_failed += 1;
                    self.notifier
                        .notify(PaymentNotice {
                            kind: NoticeKind::Overdue,
                            credit_id,
                            payment_number,
                            amount: required,
                        })
                        .await;
                }
                Err(e) => {
                    tracing::error!(
                        credit_id = %credit_id,
                        payment_number = payment_number,
                        error = %e,
                        "Overdue payment failed"
                    );
                    report
                        .errors
                        .push(format!("Credit {} payment {}: {}", credit_id, payment_number, e));
                    return;
                }
            }
        }
    }

    /// Due installments grouped per credit, each group in payment order
    async fn due_payments(&self, now: DateTime<Utc>) -> Result<BTreeMap<Uuid, Vec<i32>>, JobError> {
        let mut uow = self.store.begin().await?;
        let entries = uow.list_due_entries(now).await?;
        uow.commit().await?;

        let mut grouped: BTreeMap<Uuid, Vec<i32>> = BTreeMap::new();
        for entry in entries {
            grouped
                .entry(entry.credit_id)
                .or_default()
                .push(entry.payment_number);
        }
        for numbers in grouped.values_mut() {
            numbers.sort_unstable();
        }
        Ok(grouped)
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to exit and wait for it.
    /// A sweep in progress finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Overdue scheduler task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Report from one overdue sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub credits_scanned: u64,
    pub payments_collected: u64,
    /// Installments left unpaid for insufficient funds
    pub payments_failed: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit::{CreditEngine, CreditPolicy};
    use crate::ledger::LedgerService;
    use crate::rates::FixedRateProvider;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<PaymentNotice>>,
    }

    #[async_trait]
    impl PaymentNotifier for RecordingNotifier {
        async fn notify(&self, notice: PaymentNotice) {
            self.notices.lock().await.push(notice);
        }
    }

    fn scheduler(config: OverdueSchedulerConfig) -> OverdueScheduler {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let processor = PaymentProcessor::new(Arc::clone(&store), CreditPolicy::default());
        OverdueScheduler::with_config(store, processor, config)
    }

    #[test]
    fn test_scheduler_config_default() {
        let config = OverdueSchedulerConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(43200));
    }

    #[test]
    fn test_sweep_report_default() {
        let report = SweepReport::default();
        assert_eq!(report.credits_scanned, 0);
        assert_eq!(report.errors.len(), 0);
    }

    #[tokio::test]
    async fn test_empty_sweep() {
        let report = scheduler(OverdueSchedulerConfig::default()).run_once().await;

        assert_eq!(report.credits_scanned, 0);
        assert_eq!(report.payments_collected, 0);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_notifies_each_outcome() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let policy = CreditPolicy {
            rate_spread: dec!(0),
            ..CreditPolicy::default()
        };
        let ledger = LedgerService::new(Arc::clone(&store));
        let engine = CreditEngine::new(
            Arc::clone(&store),
            Arc::new(FixedRateProvider::new(dec!(0))),
            policy,
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let processor = PaymentProcessor::new(Arc::clone(&store), policy);
        let scheduler = OverdueScheduler::new(store, processor)
            .with_notifier(Arc::clone(&notifier) as Arc<dyn PaymentNotifier>);

        let user_id = Uuid::new_v4();
        let account = ledger.open_account(user_id, "Main").await.unwrap();
        let credit = engine
            .create_credit(user_id, account.id, dec!(200), 2, "test")
            .await
            .unwrap();
        ledger.withdraw(account.id, dec!(100), "spent").await.unwrap();

        scheduler.run_once_at(Utc::now() + chrono::Duration::days(70)).await;

        let notices = notifier.notices.lock().await;
        assert_eq!(
            *notices,
            vec![
                PaymentNotice {
                    kind: NoticeKind::Collected,
                    credit_id: credit.id,
                    payment_number: 1,
                    amount: dec!(100),
                },
                PaymentNotice {
                    kind: NoticeKind::Overdue,
                    credit_id: credit.id,
                    payment_number: 2,
                    amount: dec!(110),
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop() {
        let handle = scheduler(OverdueSchedulerConfig {
            sweep_interval: Duration::from_secs(60),
        })
        .start();

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert!(!handle.is_finished());

        handle.stop().await;
    }
}
