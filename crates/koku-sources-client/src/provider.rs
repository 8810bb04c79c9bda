//! Provider-management API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::ProviderApiConfig;
use crate::error::ClientResult;
use crate::http::{build_client, send, send_json, HDR_RH_IDENTITY};

/// Body of a provider create or update call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub authentication: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_source: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    uuid: Uuid,
}

/// Create, update and destroy providers in the cost management registry.
#[async_trait]
pub trait ProviderApi: Send + Sync + 'static {
    /// Create a provider and return its UUID.
    async fn create_provider(
        &self,
        request: &ProviderRequest,
        auth_header: &str,
    ) -> ClientResult<Uuid>;

    /// Replace a provider's fields; returns the UUID echoed by the server.
    async fn update_provider(
        &self,
        provider_uuid: Uuid,
        request: &ProviderRequest,
        auth_header: &str,
    ) -> ClientResult<Uuid>;

    /// Destroy a provider.
    async fn destroy_provider(&self, provider_uuid: Uuid, auth_header: &str) -> ClientResult<()>;
}

/// HTTP implementation of [`ProviderApi`].
#[derive(Debug, Clone)]
pub struct ProviderClient {
    config: ProviderApiConfig,
    client: Client,
}

impl ProviderClient {
    /// Create a client for the configured API.
    pub fn new(config: ProviderApiConfig) -> ClientResult<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ProviderApi for ProviderClient {
    #[instrument(skip(self, request, auth_header), fields(name = %request.name, provider_type = %request.provider_type))]
    async fn create_provider(
        &self,
        request: &ProviderRequest,
        auth_header: &str,
    ) -> ClientResult<Uuid> {
        let url = self.config.url("providers/");
        let builder = self
            .client
            .post(&url)
            .header(HDR_RH_IDENTITY, auth_header)
            .json(request);
        let response: ProviderResponse = send_json(builder, &url).await?;

        info!(provider_uuid = %response.uuid, "Provider created");
        Ok(response.uuid)
    }

    #[instrument(skip(self, request, auth_header))]
    async fn update_provider(
        &self,
        provider_uuid: Uuid,
        request: &ProviderRequest,
        auth_header: &str,
    ) -> ClientResult<Uuid> {
        let url = self.config.url(&format!("providers/{provider_uuid}/"));
        let builder = self
            .client
            .patch(&url)
            .header(HDR_RH_IDENTITY, auth_header)
            .json(request);
        let response: ProviderResponse = send_json(builder, &url).await?;

        info!("Provider updated");
        Ok(response.uuid)
    }

    #[instrument(skip(self, auth_header))]
    async fn destroy_provider(&self, provider_uuid: Uuid, auth_header: &str) -> ClientResult<()> {
        let url = self.config.url(&format!("providers/{provider_uuid}/"));
        let builder = self
            .client
            .delete(&url)
            .header(HDR_RH_IDENTITY, auth_header);
        let response = send(builder, &url).await?;

        info!(status = %response.status(), "Provider removed");
        Ok(())
    }
}
