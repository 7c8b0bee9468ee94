//! Configuration loading from environment variables.

use std::env;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::placement::DEFAULT_FEE_RATE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Connection pool size
    pub db_max_connections: u32,

    /// Fee charged on top of every stake (e.g., 0.05 = 5%)
    pub placement_fee_rate: Decimal,

    /// Minutes before kickoff when betting closes
    pub betting_cutoff_mins: i64,

    /// Settlement loop interval in seconds
    pub settle_interval_secs: u64,

    /// Days a finished match is kept before its rows are purged
    pub retention_days: i64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - DATABASE_URL: PostgreSQL connection string
    ///
    /// Optional variables (with defaults):
    /// - DB_MAX_CONNECTIONS: Pool size (default: 10)
    /// - PLACEMENT_FEE_RATE: Stake fee rate in [0, 1) (default: 0.05)
    /// - BETTING_CUTOFF_MINS: Betting closes this long before kickoff, never negative (default: 0)
    /// - SETTLE_INTERVAL_SECS: Settlement loop interval (default: 3600)
    /// - RETENTION_DAYS: Finished match retention (default: 14)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_env_only()
    }

    /// Load configuration from environment variables only (no .env file).
    /// Useful for testing.
    pub fn from_env_only() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", 10);
        let betting_cutoff_mins: i64 = parse_or("BETTING_CUTOFF_MINS", 0);
        if betting_cutoff_mins < 0 {
            // A negative cutoff would keep betting open after kickoff.
            return Err(ConfigError::InvalidValue {
                name: "BETTING_CUTOFF_MINS".to_string(),
                value: betting_cutoff_mins.to_string(),
            });
        }
        let settle_interval_secs = parse_or("SETTLE_INTERVAL_SECS", 3600);
        let retention_days = parse_or("RETENTION_DAYS", 14);

        // An unparseable or out-of-range fee rate is an error, not a default.
        let placement_fee_rate = match env::var("PLACEMENT_FEE_RATE") {
            Ok(raw) => {
                let invalid = || ConfigError::InvalidValue {
                    name: "PLACEMENT_FEE_RATE".to_string(),
                    value: raw.clone(),
                };
                let rate: Decimal = raw.trim().parse().map_err(|_| invalid())?;
                if rate < Decimal::ZERO || rate >= Decimal::ONE {
                    return Err(invalid());
                }
                rate
            }
            Err(_) => DEFAULT_FEE_RATE,
        };

        Ok(Self {
            database_url,
            db_max_connections,
            placement_fee_rate,
            betting_cutoff_mins,
            settle_interval_secs,
            retention_days,
        })
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serial_test::serial;

    fn clear_optional() {
        for name in [
            "DB_MAX_CONNECTIONS",
            "PLACEMENT_FEE_RATE",
            "BETTING_CUTOFF_MINS",
            "SETTLE_INTERVAL_SECS",
            "RETENTION_DAYS",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_database_url() {
        // Clear DATABASE_URL if set
        env::remove_var("DATABASE_URL");

        // Use from_env_only to avoid .env file loading
        let result = Config::from_env_only();
        assert!(result.is_err());

        if let Err(ConfigError::MissingVar(var)) = result {
            assert_eq!(var, "DATABASE_URL");
        } else {
            panic!("Expected MissingVar error");
        }
    }

    #[test]
    #[serial]
    fn test_config_with_defaults() {
        clear_optional();
        env::set_var("DATABASE_URL", "postgres://localhost/test");

        let config = Config::from_env_only().unwrap();

        assert_eq!(config.database_url, "postgres://localhost/test");
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.placement_fee_rate, dec!(0.05));
        assert_eq!(config.betting_cutoff_mins, 0);
        assert_eq!(config.settle_interval_secs, 3600);
        assert_eq!(config.retention_days, 14);

        // Cleanup
        env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn test_config_overrides() {
        clear_optional();
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("PLACEMENT_FEE_RATE", "0.1");
        env::set_var("BETTING_CUTOFF_MINS", "15");
        env::set_var("SETTLE_INTERVAL_SECS", "not-a-number");

        let config = Config::from_env_only().unwrap();
        assert_eq!(config.placement_fee_rate, dec!(0.1));
        assert_eq!(config.betting_cutoff_mins, 15);
        // unparseable optional values fall back to the default
        assert_eq!(config.settle_interval_secs, 3600);

        clear_optional();
        env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn test_config_rejects_out_of_range_fee() {
        clear_optional();
        env::set_var("DATABASE_URL", "postgres://localhost/test");

        for raw in ["1", "-0.01", "five percent"] {
            env::set_var("PLACEMENT_FEE_RATE", raw);
            let result = Config::from_env_only();
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { ref name, .. }) if name == "PLACEMENT_FEE_RATE"),
                "fee rate {}",
                raw
            );
        }

        clear_optional();
        env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn test_config_rejects_negative_cutoff() {
        clear_optional();
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("BETTING_CUTOFF_MINS", "-60");

        let result = Config::from_env_only();
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { ref name, ref value }) if name == "BETTING_CUTOFF_MINS" && value == "-60")
        );

        clear_optional();
        env::remove_var("DATABASE_URL");
    }
}
