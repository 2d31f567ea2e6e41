//! Environment-driven server configuration.

use std::time::Duration;
use thiserror::Error;

/// Configuration failures surfaced at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is absent.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is present but unparseable.
    #[error("invalid value for {name}: {value}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Server configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Postgres connection string.
    pub database_url: String,
    /// Pool size.
    pub database_max_connections: u32,
    /// Public submission quota: calls per window.
    pub submission_rate_max: u32,
    /// Public submission quota: window length.
    pub submission_rate_window: Duration,
    /// How often expired rate windows are swept.
    pub rate_sweep_interval: Duration,
}

impl Config {
    /// Reads configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when `DATABASE_URL` is missing or any variable
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "PORT", 8080)?,
            database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            submission_rate_max: parsed(&lookup, "SUBMISSION_RATE_MAX", 10)?,
            submission_rate_window: Duration::from_millis(parsed(
                &lookup,
                "SUBMISSION_RATE_WINDOW_MS",
                60_000,
            )?),
            rate_sweep_interval: Duration::from_secs(parsed(
                &lookup,
                "RATE_SWEEP_INTERVAL_SECS",
                60,
            )?),
        })
    }

    /// The socket address string to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
