//! Interest rate capability
//!
//! The credit engine needs a base annual rate (percent) at origination.
//! Providers are pluggable; [`TimeBoundedRateProvider`] caps how long a
//! lookup may take and the credit engine always goes through one.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Days searched backwards for the latest published key rate
pub const KEY_RATE_LOOKBACK_DAYS: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("Rate lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("No key rate published since {0}")]
    NotPublished(NaiveDate),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Rate source failed: {0}")]
    Source(String),
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Current base annual rate in percent
    async fn current_base_rate(&self) -> Result<Decimal, RateError>;
}

#[async_trait]
impl<P: RateProvider + ?Sized> RateProvider for Arc<P> {
    async fn current_base_rate(&self) -> Result<Decimal, RateError> {
        (**self).current_base_rate().await
    }
}

/// Always returns the configured rate
#[derive(Debug, Clone, Copy)]
pub struct FixedRateProvider {
    rate: Decimal,
}

impl FixedRateProvider {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }
}

#[async_trait]
impl RateProvider for FixedRateProvider {
    async fn current_base_rate(&self) -> Result<Decimal, RateError> {
        Ok(self.rate)
    }
}

/// Latest central bank key rate stored in the `key_rates` table
#[derive(Debug, Clone)]
pub struct PgKeyRateProvider {
    pool: PgPool,
    lookback_days: i64,
}

impl PgKeyRateProvider {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lookback_days: KEY_RATE_LOOKBACK_DAYS,
        }
    }

    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }
}

#[async_trait]
impl RateProvider for PgKeyRateProvider {
    async fn current_base_rate(&self) -> Result<Decimal, RateError> {
        let today = Utc::now().date_naive();
        let oldest = today - ChronoDuration::days(self.lookback_days);

        let row: Option<(NaiveDate, Decimal)> = sqlx::query_as(
            r#"
            SELECT effective_date, rate
            FROM key_rates
            WHERE effective_date BETWEEN $1 AND $2
            ORDER BY effective_date DESC
            LIMIT 1
            "#,
        )
        .bind(oldest)
        .bind(today)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((effective_date, rate)) => {
                tracing::debug!(effective_date = %effective_date, rate = %rate, "Key rate loaded");
                Ok(rate)
            }
            None => Err(RateError::NotPublished(oldest)),
        }
    }
}

/// Fails with [`RateError::Timeout`] when the inner lookup is too slow
#[derive(Debug, Clone)]
pub struct TimeBoundedRateProvider<P> {
    inner: P,
    timeout: Duration,
}

impl<P: RateProvider> TimeBoundedRateProvider<P> {
    pub fn new(inner: P, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<P: RateProvider> RateProvider for TimeBoundedRateProvider<P> {
    async fn current_base_rate(&self) -> Result<Decimal, RateError> {
        match tokio::time::timeout(self.timeout, self.inner.current_base_rate()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Rate lookup timed out");
                Err(RateError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct SlowRateProvider(Duration);

    #[async_trait]
    impl RateProvider for SlowRateProvider {
        async fn current_base_rate(&self) -> Result<Decimal, RateError> {
            tokio::time::sleep(self.0).await;
            Ok(dec!(16))
        }
    }

    #[tokio::test]
    async fn test_fixed_rate() {
        let provider = FixedRateProvider::new(dec!(16));
        assert_eq!(provider.current_base_rate().await.unwrap(), dec!(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_bound_expires() {
        let provider = TimeBoundedRateProvider::new(
            SlowRateProvider(Duration::from_secs(30)),
            Duration::from_secs(10),
        );

        let err = provider.current_base_rate().await.unwrap_err();
        assert!(matches!(err, RateError::Timeout(d) if d == Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_bound_passes_fast_lookup() {
        let provider = TimeBoundedRateProvider::new(
            SlowRateProvider(Duration::from_millis(5)),
            Duration::from_secs(10),
        );

        assert_eq!(provider.current_base_rate().await.unwrap(), dec!(16));
    }
}
