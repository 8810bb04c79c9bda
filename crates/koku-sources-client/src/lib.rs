//! # koku-sources-client
//!
//! HTTP clients for the two systems the integration keeps in sync:
//!
//! - [`SourcesClient`]: the external source registry (details, endpoints,
//!   credentials, availability status)
//! - [`ProviderClient`]: the cost management provider-management API
//!
//! Both are reached through traits ([`SourcesApi`], [`ProviderApi`]) so the
//! synchronization engine can run against in-process fakes.
//!
//! Errors carry a recoverable/non-recoverable classification
//! ([`ClientError::is_recoverable`]) that drives retry decisions.

pub mod config;
pub mod error;
mod http;
pub mod provider;
pub mod sources;

pub use config::{
    ProviderApiConfig, SourcesApiConfig, DEFAULT_KOKU_API_PREFIX, DEFAULT_SOURCES_API_PREFIX,
    DEFAULT_SOURCES_INTERNAL_API_PREFIX,
};
pub use error::{ClientError, ClientResult};
pub use http::HDR_RH_IDENTITY;
pub use provider::{ProviderApi, ProviderClient, ProviderRequest};
pub use sources::{
    Application, AvailabilityStatus, AzureCredentials, SourceDetails, SourcesApi, SourcesClient,
    COST_MANAGEMENT_APP_NAME,
};
