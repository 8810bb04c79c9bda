//! Source registry client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::SourcesApiConfig;
use crate::error::{ClientError, ClientResult};
use crate::http::{build_client, flexible_id, send, send_json, ListResponse, HDR_RH_IDENTITY};

/// Registry name of the cost management application type.
pub const COST_MANAGEMENT_APP_NAME: &str = "/insights/platform/cost-management";

const AUTHTYPE_AWS: &str = "arn";
const AUTHTYPE_AZURE: &str = "tenant_id_client_id_client_secret";

/// Basic details of a source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceDetails {
    pub name: String,
    #[serde(deserialize_with = "flexible_id")]
    pub source_type_id: i64,
    /// Cluster identifier for OpenShift sources.
    #[serde(default)]
    pub uid: Option<String>,
}

/// Service principal credentials of an Azure source.
#[derive(Clone, PartialEq, Eq)]
pub struct AzureCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
}

impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Cost management application attached to a source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Application {
    #[serde(deserialize_with = "flexible_id")]
    pub id: i64,
    /// Application-specific settings (Azure billing location).
    #[serde(default)]
    pub extra: Value,
}

/// Availability reported back to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityStatus {
    Available,
    Unavailable(String),
}

#[derive(Debug, Serialize)]
struct AvailabilityBody<'a> {
    availability_status: &'a str,
    availability_status_error: &'a str,
}

impl AvailabilityStatus {
    fn body(&self) -> AvailabilityBody<'_> {
        match self {
            Self::Available => AvailabilityBody {
                availability_status: "available",
                availability_status_error: "",
            },
            Self::Unavailable(error) => AvailabilityBody {
                availability_status: "unavailable",
                availability_status_error: error,
            },
        }
    }
}

/// Read access to the source registry, plus availability reporting.
///
/// Every call carries the caller's identity header.
#[async_trait]
pub trait SourcesApi: Send + Sync + 'static {
    /// Identifier of the cost management application type.
    async fn application_type_id(&self, auth_header: &str) -> ClientResult<i64>;

    /// Name, type identifier and uid of a source.
    async fn source_details(&self, source_id: i64, auth_header: &str)
        -> ClientResult<SourceDetails>;

    /// Registry name (`amazon`, `azure`, `openshift`) of a source type.
    async fn source_type_name(&self, type_id: i64, auth_header: &str) -> ClientResult<String>;

    /// First endpoint of a source.
    async fn endpoint_id(&self, source_id: i64, auth_header: &str) -> ClientResult<i64>;

    /// Role ARN stored on an AWS endpoint.
    async fn aws_role_arn(&self, endpoint_id: i64, auth_header: &str) -> ClientResult<String>;

    /// Service principal stored on an Azure endpoint.
    async fn azure_credentials(
        &self,
        endpoint_id: i64,
        auth_header: &str,
    ) -> ClientResult<AzureCredentials>;

    /// Cost management application of a source, if attached.
    async fn application(&self, source_id: i64, auth_header: &str)
        -> ClientResult<Option<Application>>;

    /// Report provider availability on the source's application.
    async fn set_availability_status(
        &self,
        source_id: i64,
        status: &AvailabilityStatus,
        auth_header: &str,
    ) -> ClientResult<()>;
}

#[derive(Debug, Deserialize)]
struct IdRow {
    #[serde(deserialize_with = "flexible_id")]
    id: i64,
}

#[derive(Debug, Deserialize)]
struct NameRow {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AuthenticationRow {
    #[serde(deserialize_with = "flexible_id")]
    id: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    extra: Value,
}

#[derive(Debug, Deserialize)]
struct ExposedAuthentication {
    #[serde(default)]
    password: Option<String>,
}

/// HTTP implementation of [`SourcesApi`].
#[derive(Debug, Clone)]
pub struct SourcesClient {
    config: SourcesApiConfig,
    client: Client,
}

impl SourcesClient {
    /// Create a client for the configured registry.
    pub fn new(config: SourcesApiConfig) -> ClientResult<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    async fn list_first<T>(
        &self,
        url: &str,
        query: &[(&str, String)],
        auth_header: &str,
    ) -> ClientResult<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let request = self
            .client
            .get(url)
            .query(query)
            .header(HDR_RH_IDENTITY, auth_header);
        let list: ListResponse<T> = send_json(request, url).await?;
        Ok(list.first())
    }

    async fn endpoint_authentication(
        &self,
        endpoint_id: i64,
        authtype: &str,
        auth_header: &str,
    ) -> ClientResult<AuthenticationRow> {
        let url = self.config.public_url("authentications");
        let query = [
            ("filter[resource_type]", "Endpoint".to_string()),
            ("[authtype]", authtype.to_string()),
            ("[resource_id]", endpoint_id.to_string()),
        ];
        self.list_first(&url, &query, auth_header)
            .await?
            .ok_or_else(|| ClientError::missing("authentication", format!("endpoint {endpoint_id}")))
    }

    async fn authentication_password(
        &self,
        authentication_id: i64,
        auth_header: &str,
    ) -> ClientResult<String> {
        let url = self
            .config
            .internal_url(&format!("authentications/{authentication_id}"));
        let request = self
            .client
            .get(&url)
            .query(&[("expose_encrypted_attribute[]", "password")])
            .header(HDR_RH_IDENTITY, auth_header);
        let exposed: ExposedAuthentication = send_json(request, &url).await?;
        exposed.password.ok_or_else(|| ClientError::InvalidResponse {
            url,
            reason: "authentication has no password".to_string(),
        })
    }
}

#[async_trait]
impl SourcesApi for SourcesClient {
    #[instrument(skip_all)]
    async fn application_type_id(&self, auth_header: &str) -> ClientResult<i64> {
        let url = self.config.public_url("application_types");
        let query = [("filter[name]", COST_MANAGEMENT_APP_NAME.to_string())];
        let row: IdRow = self
            .list_first(&url, &query, auth_header)
            .await?
            .ok_or_else(|| ClientError::missing("application type", COST_MANAGEMENT_APP_NAME))?;
        debug!(application_type_id = row.id, "Resolved cost management application type");
        Ok(row.id)
    }

    #[instrument(skip(self, auth_header))]
    async fn source_details(
        &self,
        source_id: i64,
        auth_header: &str,
    ) -> ClientResult<SourceDetails> {
        let url = self.config.public_url(&format!("sources/{source_id}"));
        let request = self.client.get(&url).header(HDR_RH_IDENTITY, auth_header);
        send_json(request, &url).await
    }

    #[instrument(skip(self, auth_header))]
    async fn source_type_name(&self, type_id: i64, auth_header: &str) -> ClientResult<String> {
        let url = self.config.public_url("source_types");
        let query = [("filter[id]", type_id.to_string())];
        let row: NameRow = self
            .list_first(&url, &query, auth_header)
            .await?
            .ok_or_else(|| ClientError::missing("source type", type_id))?;
        Ok(row.name)
    }

    #[instrument(skip(self, auth_header))]
    async fn endpoint_id(&self, source_id: i64, auth_header: &str) -> ClientResult<i64> {
        let url = self.config.public_url("endpoints");
        let query = [("filter[source_id]", source_id.to_string())];
        let row: IdRow = self
            .list_first(&url, &query, auth_header)
            .await?
            .ok_or_else(|| ClientError::missing("endpoint", format!("source {source_id}")))?;
        Ok(row.id)
    }

    #[instrument(skip(self, auth_header))]
    async fn aws_role_arn(&self, endpoint_id: i64, auth_header: &str) -> ClientResult<String> {
        let authentication = self
            .endpoint_authentication(endpoint_id, AUTHTYPE_AWS, auth_header)
            .await?;
        self.authentication_password(authentication.id, auth_header)
            .await
    }

    #[instrument(skip(self, auth_header))]
    async fn azure_credentials(
        &self,
        endpoint_id: i64,
        auth_header: &str,
    ) -> ClientResult<AzureCredentials> {
        let authentication = self
            .endpoint_authentication(endpoint_id, AUTHTYPE_AZURE, auth_header)
            .await?;

        let invalid = |reason: &str| ClientError::InvalidResponse {
            url: self.config.public_url("authentications"),
            reason: reason.to_string(),
        };

        let client_id = authentication
            .username
            .ok_or_else(|| invalid("authentication has no username"))?;
        let tenant_id = authentication
            .extra
            .pointer("/azure/tenant_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| invalid("authentication has no azure tenant_id"))?;
        let client_secret = self
            .authentication_password(authentication.id, auth_header)
            .await?;

        Ok(AzureCredentials {
            client_id,
            client_secret,
            tenant_id,
        })
    }

    #[instrument(skip(self, auth_header))]
    async fn application(
        &self,
        source_id: i64,
        auth_header: &str,
    ) -> ClientResult<Option<Application>> {
        let url = self.config.public_url("applications");
        let query = [("filter[source_id]", source_id.to_string())];
        self.list_first(&url, &query, auth_header).await
    }

    #[instrument(skip(self, auth_header))]
    async fn set_availability_status(
        &self,
        source_id: i64,
        status: &AvailabilityStatus,
        auth_header: &str,
    ) -> ClientResult<()> {
        let application = self
            .application(source_id, auth_header)
            .await?
            .ok_or_else(|| ClientError::missing("application", format!("source {source_id}")))?;

        let url = self
            .config
            .public_url(&format!("applications/{}", application.id));
        let request = self
            .client
            .patch(&url)
            .header(HDR_RH_IDENTITY, auth_header)
            .json(&status.body());
        send(request, &url).await?;

        debug!(application_id = application.id, ?status, "Set availability status");
        Ok(())
    }
}
