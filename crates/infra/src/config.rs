//! Process configuration, read from the environment.
//!
//! | var | default |
//! |-----|---------|
//! | `POSTGRES_URL` | unset: in-memory store |
//! | `REDIS_URL` | unset: in-memory bus |
//! | `COURSE_STREAM_KEY` | `instructor:courses` |
//! | `BIND_ADDR` | `0.0.0.0:8080` |
//! | `DB_MAX_CONNECTIONS` | `5` |
//! | `DB_ACQUIRE_TIMEOUT_SECS` | `5` |
//! | `OUTBOX_POLL_INTERVAL_MS` | `500` |
//! | `OUTBOX_BATCH_SIZE` | `32` |
//! | `OUTBOX_MAX_ATTEMPTS` | `5` |
//! | `PUBLISH_MAX_ATTEMPTS` | `3` |
//! | `PUBLISH_BASE_DELAY_MS` | `100` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;

pub const DEFAULT_STREAM_KEY: &str = "instructor:courses";

const MAX_PUBLISH_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid {expected}: '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    /// Delivery attempts before a row is dead-lettered.
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `None` runs against the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// `None` publishes to the in-memory bus.
    pub redis_url: Option<String>,
    pub stream_key: String,
    pub outbox: OutboxConfig,
    pub publish_retry: RetryPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup (the environment, a map in tests).
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or(&get, "BIND_ADDR", "socket address", || {
            SocketAddr::from(([0, 0, 0, 0], 8080))
        })?;

        let database = match get("POSTGRES_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: positive(&get, "DB_MAX_CONNECTIONS", 5)?,
                acquire_timeout_secs: positive(&get, "DB_ACQUIRE_TIMEOUT_SECS", 5)?,
            }),
            None => None,
        };

        let outbox = OutboxConfig {
            poll_interval: Duration::from_millis(positive(&get, "OUTBOX_POLL_INTERVAL_MS", 500)?),
            batch_size: positive(&get, "OUTBOX_BATCH_SIZE", 32)?,
            max_attempts: positive(&get, "OUTBOX_MAX_ATTEMPTS", 5)?,
        };

        let publish_retry = RetryPolicy::exponential(
            positive(&get, "PUBLISH_MAX_ATTEMPTS", 3)?,
            Duration::from_millis(parse_or(&get, "PUBLISH_BASE_DELAY_MS", "integer", || 100)?),
            MAX_PUBLISH_DELAY,
        );

        Ok(Self {
            bind_addr,
            database,
            redis_url: get("REDIS_URL"),
            stream_key: get("COURSE_STREAM_KEY").unwrap_or_else(|| DEFAULT_STREAM_KEY.to_string()),
            outbox,
            publish_retry,
        })
    }
}

fn parse_or<G, T>(
    get: &G,
    var: &'static str,
    expected: &'static str,
    default: impl FnOnce() -> T,
) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(var) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value: raw,
        }),
        None => Ok(default()),
    }
}

fn positive<G, T>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
{
    let value = parse_or(get, var, "positive integer", || default)?;
    if value == T::default() {
        return Err(ConfigError::Zero { var });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_in_memory_defaults() {
        let cfg = config(&[]).unwrap();

        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:8080");
        assert!(cfg.database.is_none());
        assert!(cfg.redis_url.is_none());
        assert_eq!(cfg.stream_key, "instructor:courses");
        assert_eq!(cfg.outbox.poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.outbox.batch_size, 32);
        assert_eq!(cfg.outbox.max_attempts, 5);
        assert_eq!(cfg.publish_retry.max_attempts, 3);
        assert_eq!(cfg.publish_retry.base_delay, Duration::from_millis(100));
    }

    #[test]
    fn postgres_url_enables_the_database_section() {
        let cfg = config(&[
            ("POSTGRES_URL", "postgres://app@localhost/instructor"),
            ("DB_MAX_CONNECTIONS", "12"),
        ])
        .unwrap();

        let db = cfg.database.unwrap();
        assert_eq!(db.url, "postgres://app@localhost/instructor");
        assert_eq!(db.max_connections, 12);
        assert_eq!(db.acquire_timeout_secs, 5);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = config(&[("POSTGRES_URL", "  "), ("REDIS_URL", "")]).unwrap();
        assert!(cfg.database.is_none());
        assert!(cfg.redis_url.is_none());
    }

    #[test]
    fn malformed_numbers_are_reported_with_the_variable() {
        let err = config(&[("OUTBOX_BATCH_SIZE", "lots")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "OUTBOX_BATCH_SIZE",
                expected: "positive integer",
                value: "lots".to_string(),
            }
        );

        let err = config(&[("BIND_ADDR", "localhost")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "BIND_ADDR", .. }));
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert_eq!(
            config(&[("PUBLISH_MAX_ATTEMPTS", "0")]).unwrap_err(),
            ConfigError::Zero {
                var: "PUBLISH_MAX_ATTEMPTS"
            }
        );
    }
}
