//! Payment notifications sent by the overdue sweep

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// The installment was debited from the credit's account
    Collected,
    /// The account could not cover the installment
    Overdue,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Collected => "collected",
            NoticeKind::Overdue => "overdue",
        }
    }
}

/// What the borrower is told about one installment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentNotice {
    pub kind: NoticeKind,
    pub credit_id: Uuid,
    pub payment_number: i32,
    /// Amount debited, or amount now due (penalty included) when overdue
    pub amount: Decimal,
}

/// Delivery channel for sweep outcomes.
///
/// Delivery is best effort; a notifier must not fail the sweep.
#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    async fn notify(&self, notice: PaymentNotice);
}

/// Writes notices to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl PaymentNotifier for TracingNotifier {
    async fn notify(&self, notice: PaymentNotice) {
        tracing::info!(
            kind = notice.kind.as_str(),
            credit_id = %notice.credit_id,
            payment_number = notice.payment_number,
            amount = %notice.amount,
            "Payment notice"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_notice_serializes_kind() {
        let notice = PaymentNotice {
            kind: NoticeKind::Overdue,
            credit_id: Uuid::nil(),
            payment_number: 2,
            amount: dec!(110),
        };

        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["kind"], "overdue");
        assert_eq!(json["payment_number"], 2);
    }

    #[tokio::test]
    async fn test_tracing_notifier_accepts_notice() {
        TracingNotifier
            .notify(PaymentNotice {
                kind: NoticeKind::Collected,
                credit_id: Uuid::new_v4(),
                payment_number: 1,
                amount: dec!(100),
            })
            .await;
    }
}
