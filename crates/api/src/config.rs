//! Coordinator configuration loaded from environment variables.

use std::time::Duration;

use communicator::{CommunicatorConfig, DiscoveryConfig, RetryPolicy};
use thiserror::Error;

/// A present but malformed environment variable. Startup aborts on this;
/// silently falling back to a default would mask a broken deployment.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value for {var}: {value:?}")]
pub struct ConfigError {
    pub var: String,
    pub value: String,
}

/// Coordinator configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `9000`)
/// - `COORDINATOR_REQUEST_TIMEOUT_MS` — per-exchange timeout (default: `30000`)
/// - `COORDINATOR_MAX_RETRIES` — delivery attempts per request (default: `3`)
/// - `COORDINATOR_LOG_LEVEL` — tracing filter directive (default: `RUST_LOG`, then `"info"`)
/// - `COORDINATOR_LOCAL_MODE` — point participant discovery at localhost
///
/// Participant base URLs come from `<PARTICIPANT>_SERVICE_URL` variables,
/// resolved by the communicator at construction.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub log_level: String,
    pub local_mode: bool,
}

impl CoordinatorConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: env("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var("PORT", env("PORT"), 9000)?,
            request_timeout: Duration::from_millis(parse_var(
                "COORDINATOR_REQUEST_TIMEOUT_MS",
                env("COORDINATOR_REQUEST_TIMEOUT_MS"),
                30_000,
            )?),
            max_retries: parse_var(
                "COORDINATOR_MAX_RETRIES",
                env("COORDINATOR_MAX_RETRIES"),
                3,
            )?,
            log_level: env("COORDINATOR_LOG_LEVEL")
                .or_else(|| env("RUST_LOG"))
                .unwrap_or_else(|| "info".to_string()),
            local_mode: parse_bool("COORDINATOR_LOCAL_MODE", env("COORDINATOR_LOCAL_MODE"))?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the communicator configuration this coordinator runs with.
    pub fn communicator_config(&self) -> CommunicatorConfig {
        CommunicatorConfig {
            discovery: DiscoveryConfig {
                overrides: Default::default(),
                local_mode: self.local_mode,
            },
            retry: RetryPolicy {
                max_attempts: self.max_retries.max(1),
                ..RetryPolicy::default()
            },
            ..CommunicatorConfig::default()
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            request_timeout: Duration::from_millis(30_000),
            max_retries: 3,
            log_level: "info".to_string(),
            local_mode: false,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw.parse().map_err(|_| ConfigError {
            var: var.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

fn parse_bool(var: &str, value: Option<String>) -> Result<bool, ConfigError> {
    match value.as_deref() {
        None => Ok(false),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError {
                var: var.to_string(),
                value: raw.to_string(),
            }),
        },
    }
}
