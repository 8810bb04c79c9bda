//! Application configuration loaded from environment variables.
//!
//! Required variables must be present and valid, or the listener exits
//! with a clear error message before connecting to anything.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use koku_sources_client::{
    ProviderApiConfig, SourcesApiConfig, DEFAULT_KOKU_API_PREFIX, DEFAULT_SOURCES_API_PREFIX,
    DEFAULT_SOURCES_INTERNAL_API_PREFIX,
};
use koku_sources_sync::{SyncConfig, DEFAULT_FAKE_HEADER};
use thiserror::Error;

use crate::logging::DEFAULT_FILTER;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Listener configuration.
///
/// Broker settings are loaded separately through
/// [`KafkaConfig::from_env`](koku_sources_events::KafkaConfig).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub sources_api: SourcesApiConfig,
    pub koku_api: ProviderApiConfig,
    pub sync: SyncConfig,
    pub rust_log: String,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let timeout = Duration::from_secs(vars.parse("HTTP_TIMEOUT_SECS", 30u64)?);
        let retry_delay = Duration::from_secs(vars.parse("SOURCES_RETRY_SECONDS", 10u64)?);

        let sources_api = SourcesApiConfig::new(vars.required("SOURCES_API_URL")?)
            .with_prefixes(
                vars.or("SOURCES_API_PREFIX", DEFAULT_SOURCES_API_PREFIX),
                vars.or("SOURCES_INTERNAL_API_PREFIX", DEFAULT_SOURCES_INTERNAL_API_PREFIX),
            )
            .with_timeout(timeout);

        let koku_api = ProviderApiConfig::new(vars.required("KOKU_API_URL")?)
            .with_prefix(vars.or("KOKU_API_PREFIX", DEFAULT_KOKU_API_PREFIX))
            .with_timeout(timeout);

        let max_in_flight: usize = vars.parse("SOURCES_MAX_IN_FLIGHT", 4)?;
        if max_in_flight == 0 {
            return Err(ConfigError::InvalidValue {
                var: "SOURCES_MAX_IN_FLIGHT".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let reconcile_secs: u64 = vars.parse("SOURCES_RECONCILE_INTERVAL_SECS", 0)?;
        let reconcile_interval = (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs));

        let sync = SyncConfig::default()
            .with_retry_delay(retry_delay)
            .with_max_in_flight(max_in_flight)
            .with_reconcile_interval(reconcile_interval)
            .with_fake_auth_header(vars.or("SOURCES_FAKE_HEADER", DEFAULT_FAKE_HEADER));

        Ok(Self {
            database_url: vars.required("DATABASE_URL")?,
            database_max_connections: vars.parse("DATABASE_MAX_CONNECTIONS", 10u32)?,
            sources_api,
            koku_api,
            sync,
            rust_log: vars.or("RUST_LOG", DEFAULT_FILTER),
        })
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var).filter(|v| !v.is_empty())
    }

    fn required(&self, var: &str) -> Result<String, ConfigError> {
        self.get(var)
            .ok_or_else(|| ConfigError::MissingVar(var.to_string()))
    }

    fn or(&self, var: &str, default: &str) -> String {
        self.get(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, var: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(var) {
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                var: var.to_string(),
                message: e.to_string(),
            }),
            None => Ok(default),
        }
    }
}
