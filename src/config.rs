//! Configuration module
//!
//! Loads configuration from environment variables.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::credit::CreditPolicy;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    /// Seconds between overdue sweeps
    pub overdue_sweep_interval_secs: u64,

    /// Upper bound on a base rate lookup
    pub rate_lookup_timeout_secs: u64,

    /// Percentage points added to the base rate
    pub credit_rate_spread: Decimal,

    /// Fraction of a missed installment charged once as penalty
    pub late_payment_penalty_rate: Decimal,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns `None` for unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let overdue_sweep_interval_secs: u64 =
            parse_or(&lookup, "OVERDUE_SWEEP_INTERVAL_SECS", 43_200)?;
        if overdue_sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("OVERDUE_SWEEP_INTERVAL_SECS"));
        }

        let rate_lookup_timeout_secs: u64 = parse_or(&lookup, "RATE_LOOKUP_TIMEOUT_SECS", 10)?;
        if rate_lookup_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("RATE_LOOKUP_TIMEOUT_SECS"));
        }

        let credit_rate_spread = parse_or(&lookup, "CREDIT_RATE_SPREAD", Decimal::from(5))?;

        let late_payment_penalty_rate: Decimal =
            parse_or(&lookup, "LATE_PAYMENT_PENALTY_RATE", Decimal::new(10, 2))?;
        if late_payment_penalty_rate < Decimal::ZERO {
            return Err(ConfigError::InvalidValue("LATE_PAYMENT_PENALTY_RATE"));
        }

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(_) => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            environment,
            overdue_sweep_interval_secs,
            rate_lookup_timeout_secs,
            credit_rate_spread,
            late_payment_penalty_rate,
            log_format,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.overdue_sweep_interval_secs)
    }

    pub fn rate_lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.rate_lookup_timeout_secs)
    }

    pub fn credit_policy(&self) -> CreditPolicy {
        CreditPolicy {
            rate_spread: self.credit_rate_spread,
            penalty_rate: self.late_payment_penalty_rate,
            rate_lookup_timeout: self.rate_lookup_timeout(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
