//! Service configuration, read from environment variables.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `PORT` | `8080` | HTTP listen port |
//! | `DATABASE_URL` | unset | PostgreSQL URL; unset selects the in-memory store |
//! | `DB_MAX_CONNECTIONS` | `25` | Pool size |
//! | `DB_ACQUIRE_TIMEOUT_MS` | `3000` | Bound on waiting for a pooled connection |
//! | `LOCK_TIMEOUT_MS` | `2000` | Bound on waiting for a row lock |
//! | `STATEMENT_TIMEOUT_MS` | `5000` | Bound on a single statement |
//!
//! Timeouts must be positive: PostgreSQL treats `0` as "wait forever".
//! | `ORDER_MAX_RETRIES` | `3` | Retries of transient contention |
//! | `SEED_DEMO_DATA` | `true` | Seed a demo catalog on startup |

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub lock_timeout: Duration,
    pub statement_timeout: Duration,
    pub order_max_retries: usize,
    pub seed_demo_data: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: None,
            db_max_connections: 25,
            db_acquire_timeout: Duration::from_millis(3_000),
            lock_timeout: Duration::from_millis(2_000),
            statement_timeout: Duration::from_millis(5_000),
            order_max_retries: 3,
            seed_demo_data: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            port: parse_or(&get, "PORT", defaults.port)?,
            database_url: get("DATABASE_URL"),
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            db_acquire_timeout: parse_timeout(&get, "DB_ACQUIRE_TIMEOUT_MS", defaults.db_acquire_timeout)?,
            lock_timeout: parse_timeout(&get, "LOCK_TIMEOUT_MS", defaults.lock_timeout)?,
            statement_timeout: parse_timeout(&get, "STATEMENT_TIMEOUT_MS", defaults.statement_timeout)?,
            order_max_retries: parse_or(&get, "ORDER_MAX_RETRIES", defaults.order_max_retries)?,
            seed_demo_data: match get("SEED_DEMO_DATA") {
                None => defaults.seed_demo_data,
                Some(v) => parse_flag("SEED_DEMO_DATA", &v)?,
            },
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_retries(self.order_max_retries)
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn parse_timeout(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let millis: u64 = parse_or(get, name, default.as_millis() as u64)?;
    if millis == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(config(&[]).unwrap(), AppConfig::default());
    }

    #[test]
    fn values_override_defaults() {
        let cfg = config(&[
            ("PORT", "9000"),
            ("DATABASE_URL", "postgres://localhost/evento"),
            ("LOCK_TIMEOUT_MS", "250"),
            ("ORDER_MAX_RETRIES", "0"),
            ("SEED_DEMO_DATA", "off"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/evento"));
        assert_eq!(cfg.lock_timeout, Duration::from_millis(250));
        assert_eq!(cfg.retry_policy().max_retries, 0);
        assert!(!cfg.seed_demo_data);
    }

    #[test]
    fn empty_database_url_means_in_memory() {
        assert_eq!(config(&[("DATABASE_URL", " ")]).unwrap().database_url, None);
    }

    #[test]
    fn malformed_values_are_errors() {
        assert_eq!(
            config(&[("PORT", "eighty")]).unwrap_err(),
            ConfigError::Invalid {
                name: "PORT",
                value: "eighty".to_string()
            }
        );
        assert!(config(&[("SEED_DEMO_DATA", "maybe")]).is_err());
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        for name in ["LOCK_TIMEOUT_MS", "STATEMENT_TIMEOUT_MS", "DB_ACQUIRE_TIMEOUT_MS"] {
            assert_eq!(
                config(&[(name, "0")]).unwrap_err(),
                ConfigError::Invalid {
                    name,
                    value: "0".to_string()
                }
            );
        }
        let cfg = config(&[("DB_ACQUIRE_TIMEOUT_MS", "750")]).unwrap();
        assert_eq!(cfg.db_acquire_timeout, Duration::from_millis(750));
    }
}
