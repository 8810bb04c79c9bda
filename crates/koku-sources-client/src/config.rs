//! Client configuration.

use std::time::Duration;

/// Default public prefix of the source registry API.
pub const DEFAULT_SOURCES_API_PREFIX: &str = "/api/v1.0";

/// Default internal prefix of the source registry API.
pub const DEFAULT_SOURCES_INTERNAL_API_PREFIX: &str = "/internal/v1.0";

/// Default prefix of the provider-management API.
pub const DEFAULT_KOKU_API_PREFIX: &str = "/api/cost-management/v1";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Source registry connection settings.
#[derive(Debug, Clone)]
pub struct SourcesApiConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub internal_api_prefix: String,
    pub timeout: Duration,
}

impl SourcesApiConfig {
    /// Settings for a registry at `base_url` with default prefixes.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_prefix: DEFAULT_SOURCES_API_PREFIX.to_string(),
            internal_api_prefix: DEFAULT_SOURCES_INTERNAL_API_PREFIX.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Override the public and internal prefixes.
    #[must_use]
    pub fn with_prefixes(
        mut self,
        api_prefix: impl Into<String>,
        internal_api_prefix: impl Into<String>,
    ) -> Self {
        self.api_prefix = api_prefix.into();
        self.internal_api_prefix = internal_api_prefix.into();
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn public_url(&self, path: &str) -> String {
        join(&self.base_url, &self.api_prefix, path)
    }

    pub(crate) fn internal_url(&self, path: &str) -> String {
        join(&self.base_url, &self.internal_api_prefix, path)
    }
}

/// Provider-management API connection settings.
#[derive(Debug, Clone)]
pub struct ProviderApiConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub timeout: Duration,
}

impl ProviderApiConfig {
    /// Settings for the API at `base_url` with the default prefix.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_prefix: DEFAULT_KOKU_API_PREFIX.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Override the prefix.
    #[must_use]
    pub fn with_prefix(mut self, api_prefix: impl Into<String>) -> Self {
        self.api_prefix = api_prefix.into();
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        join(&self.base_url, &self.api_prefix, path)
    }
}

fn join(base: &str, prefix: &str, path: &str) -> String {
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        prefix.trim_matches('/'),
        path.trim_start_matches('/')
    )
}
