//! Runtime configuration, read from `TASKRELAY_*` environment variables.

use std::time::Duration;

pub const ENV_QUEUE_CAPACITY: &str = "TASKRELAY_QUEUE_CAPACITY";
pub const ENV_WORKERS: &str = "TASKRELAY_WORKERS";
pub const ENV_DISPATCH_TIMEOUT_SECS: &str = "TASKRELAY_DISPATCH_TIMEOUT_SECS";
pub const ENV_DATABASE_URL: &str = "TASKRELAY_DATABASE_URL";
pub const ENV_LOG: &str = "TASKRELAY_LOG";

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a whole number, got {value:?}")]
    NotANumber { var: &'static str, value: String },

    #[error("{var} must be at least 1")]
    Zero { var: &'static str },
}

/// Relay configuration.
///
/// | Env Var                           | Default                    |
/// |-----------------------------------|----------------------------|
/// | `TASKRELAY_QUEUE_CAPACITY`        | `100`                      |
/// | `TASKRELAY_WORKERS`               | `4`                        |
/// | `TASKRELAY_DISPATCH_TIMEOUT_SECS` | `10`                       |
/// | `TASKRELAY_DATABASE_URL`          | unset (in-memory store)    |
/// | `TASKRELAY_LOG`                   | `info`                     |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub queue_capacity: usize,
    pub workers: usize,
    pub dispatch_timeout: Duration,
    /// `sqlite:` URL of the task database. `None` keeps tasks in memory.
    pub database_url: Option<String>,
    /// Log filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKERS,
            dispatch_timeout: Duration::from_secs(DEFAULT_DISPATCH_TIMEOUT_SECS),
            database_url: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Unset and blank variables take the
    /// default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let config = Self {
            queue_capacity: parse_or(
                get(ENV_QUEUE_CAPACITY),
                ENV_QUEUE_CAPACITY,
                defaults.queue_capacity,
            )?,
            workers: parse_or(get(ENV_WORKERS), ENV_WORKERS, defaults.workers)?,
            dispatch_timeout: Duration::from_secs(parse_or(
                get(ENV_DISPATCH_TIMEOUT_SECS),
                ENV_DISPATCH_TIMEOUT_SECS,
                DEFAULT_DISPATCH_TIMEOUT_SECS,
            )?),
            database_url: get(ENV_DATABASE_URL),
            log_filter: get(ENV_LOG).unwrap_or(defaults.log_filter),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero { var: ENV_QUEUE_CAPACITY });
        }
        if self.workers == 0 {
            return Err(ConfigError::Zero { var: ENV_WORKERS });
        }
        if self.dispatch_timeout.is_zero() {
            return Err(ConfigError::Zero {
                var: ENV_DISPATCH_TIMEOUT_SECS,
            });
        }
        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::NotANumber { var, value }),
    }
}
