//! Shared request plumbing.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Identity header replayed on every call.
pub const HDR_RH_IDENTITY: &str = "x-rh-identity";

pub(crate) fn build_client(timeout: Duration) -> ClientResult<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| ClientError::InvalidConfiguration {
            message: format!("Failed to build HTTP client: {e}"),
        })
}

/// Send a request, turning transport failures and non-success statuses into errors.
pub(crate) async fn send(builder: RequestBuilder, url: &str) -> ClientResult<Response> {
    let response = builder.send().await.map_err(|source| ClientError::Transport {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    debug!(url = %url, status = %status, "Received response");

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Send a request and decode a JSON body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    builder: RequestBuilder,
    url: &str,
) -> ClientResult<T> {
    let response = send(builder, url).await?;
    response
        .json()
        .await
        .map_err(|e| ClientError::InvalidResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

/// `{"data": [...]}` list envelope used by the source registry.
#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn first(self) -> Option<T> {
        self.data.into_iter().next()
    }
}

/// Accept an integer identifier encoded as a JSON number or string.
pub(crate) fn flexible_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Int(i64),
        Str(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Int(id) => Ok(id),
        Id::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid identifier: {s}"))),
    }
}
