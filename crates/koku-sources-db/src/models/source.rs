//! Source record model.
//!
//! One row per source known to the integration, carrying the provider
//! registry identifier and the pending-operation flags that drive
//! synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Kind of cloud account behind a source.
///
/// The type decides the shape of the stored authentication payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    /// Amazon Web Services account.
    Aws,
    /// Microsoft Azure subscription.
    Azure,
    /// OpenShift cluster.
    Ocp,
    /// Not yet resolved against the source registry.
    Unknown,
}

impl SourceType {
    /// Map a source registry type name (`amazon`, `azure`, `openshift`).
    #[must_use]
    pub fn from_registry_name(name: &str) -> Option<Self> {
        match name {
            "amazon" => Some(SourceType::Aws),
            "azure" => Some(SourceType::Azure),
            "openshift" => Some(SourceType::Ocp),
            _ => None,
        }
    }

    /// Provider type string understood by the provider-management API.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Aws => "AWS",
            SourceType::Azure => "AZURE",
            SourceType::Ocp => "OCP",
            SourceType::Unknown => "UNKNOWN",
        }
    }

    /// Whether the type has been resolved.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, SourceType::Unknown)
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "AWS" => Ok(SourceType::Aws),
            "AZURE" => Ok(SourceType::Azure),
            "OCP" => Ok(SourceType::Ocp),
            "UNKNOWN" => Ok(SourceType::Unknown),
            _ => Err(format!("Unknown source type: {s}")),
        }
    }
}

/// A source known to the integration.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Source registry identifier.
    pub source_id: i64,

    /// Display name from the source registry.
    pub name: Option<String>,

    /// Resolved source type.
    pub source_type: SourceType,

    /// Identity header captured from the broker message.
    pub auth_header: Option<String>,

    /// Credential payload; shape depends on `source_type`.
    pub authentication: Option<serde_json::Value>,

    /// Billing location payload (AWS/Azure only).
    pub billing_source: Option<serde_json::Value>,

    /// Source registry endpoint used to look up authentications.
    pub endpoint_id: Option<i64>,

    /// Provider registry identifier, set after the first successful create.
    pub provider_uuid: Option<Uuid>,

    /// Provider has not been created yet.
    pub pending_create: bool,

    /// Provider needs to be updated with the current fields.
    pub pending_update: bool,

    /// Provider and record must be torn down.
    pub pending_delete: bool,

    /// Last broker offset associated with the record.
    #[sqlx(rename = "kafka_offset")]
    pub offset: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourceRecord {
    /// A bare record as created from the first classified create event.
    #[must_use]
    pub fn new_pending(source_id: i64, auth_header: Option<String>, offset: i64) -> Self {
        let now = Utc::now();
        Self {
            source_id,
            name: None,
            source_type: SourceType::Unknown,
            auth_header,
            authentication: None,
            billing_source: None,
            endpoint_id: None,
            provider_uuid: None,
            pending_create: true,
            pending_update: false,
            pending_delete: false,
            offset,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the provider registry already knows this source.
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        self.provider_uuid.is_some()
    }

    /// Whether any pending flag is set.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending_create || self.pending_update || self.pending_delete
    }

    /// Whether enrichment has gathered everything a create call needs.
    ///
    /// Azure providers cannot be created without a billing source.
    #[must_use]
    pub fn is_ready_for_create(&self) -> bool {
        if !self.source_type.is_known() || self.authentication.is_none() {
            return false;
        }
        self.source_type != SourceType::Azure || self.billing_source.is_some()
    }

    /// Insert a bare pending record unless one already exists.
    ///
    /// An existing row keeps its state; only its offset moves forward.
    /// Returns true if a row was inserted.
    pub async fn insert_if_absent(
        pool: &PgPool,
        source_id: i64,
        auth_header: Option<&str>,
        offset: i64,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r"
            INSERT INTO sources (source_id, auth_header, kafka_offset, pending_create)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (source_id) DO UPDATE
                SET kafka_offset = GREATEST(sources.kafka_offset, EXCLUDED.kafka_offset)
            RETURNING (xmax = 0) AS inserted
            ",
        )
        .bind(source_id)
        .bind(auth_header)
        .bind(offset)
        .fetch_one(pool)
        .await
    }

    /// Find a record by source ID.
    pub async fn find_by_source_id(
        pool: &PgPool,
        source_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM sources
            WHERE source_id = $1
            ",
        )
        .bind(source_id)
        .fetch_optional(pool)
        .await
    }

    /// Find the source that owns a registry endpoint.
    pub async fn find_source_id_by_endpoint(
        pool: &PgPool,
        endpoint_id: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT source_id FROM sources
            WHERE endpoint_id = $1
            ORDER BY source_id
            LIMIT 1
            ",
        )
        .bind(endpoint_id)
        .fetch_optional(pool)
        .await
    }

    /// Get the resolved type of a source.
    pub async fn find_source_type(
        pool: &PgPool,
        source_id: i64,
    ) -> Result<Option<SourceType>, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT source_type FROM sources
            WHERE source_id = $1
            ",
        )
        .bind(source_id)
        .fetch_optional(pool)
        .await
    }

    /// List every record with a pending flag, ordered by source ID.
    pub async fn list_pending(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM sources
            WHERE pending_create OR pending_update OR pending_delete
            ORDER BY source_id ASC
            ",
        )
        .fetch_all(pool)
        .await
    }

    /// Flag a provisioned source for update.
    ///
    /// Returns true if the source exists and is provisioned.
    pub async fn flag_update(
        pool: &PgPool,
        source_id: i64,
        offset: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE sources
            SET pending_update = TRUE,
                kafka_offset = GREATEST(kafka_offset, $2),
                updated_at = NOW()
            WHERE source_id = $1 AND provider_uuid IS NOT NULL
            ",
        )
        .bind(source_id)
        .bind(offset)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Flag a source for deletion. Returns true if the source exists.
    pub async fn flag_delete(
        pool: &PgPool,
        source_id: i64,
        offset: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE sources
            SET pending_delete = TRUE,
                kafka_offset = GREATEST(kafka_offset, $2),
                updated_at = NOW()
            WHERE source_id = $1
            ",
        )
        .bind(source_id)
        .bind(offset)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Store name, type and endpoint fetched from the source registry.
    pub async fn update_context(
        pool: &PgPool,
        source_id: i64,
        name: &str,
        source_type: SourceType,
        endpoint_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE sources
            SET name = $2, source_type = $3, endpoint_id = $4, updated_at = NOW()
            WHERE source_id = $1
            ",
        )
        .bind(source_id)
        .bind(name)
        .bind(source_type)
        .bind(endpoint_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Store the credential payload.
    pub async fn update_authentication(
        pool: &PgPool,
        source_id: i64,
        authentication: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE sources
            SET authentication = $2, updated_at = NOW()
            WHERE source_id = $1
            ",
        )
        .bind(source_id)
        .bind(authentication)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Store the billing location payload.
    pub async fn update_billing_source(
        pool: &PgPool,
        source_id: i64,
        billing_source: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE sources
            SET billing_source = $2, updated_at = NOW()
            WHERE source_id = $1
            ",
        )
        .bind(source_id)
        .bind(billing_source)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record the provider UUID and clear `pending_create`.
    pub async fn update_provider_uuid(
        pool: &PgPool,
        source_id: i64,
        provider_uuid: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE sources
            SET provider_uuid = $2, pending_create = FALSE, updated_at = NOW()
            WHERE source_id = $1
            ",
        )
        .bind(source_id)
        .bind(provider_uuid)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clear `pending_update` after a confirmed update.
    pub async fn clear_update(pool: &PgPool, source_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE sources
            SET pending_update = FALSE, updated_at = NOW()
            WHERE source_id = $1 AND pending_update
            ",
        )
        .bind(source_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Delete the record. Returns true if a row was removed.
    pub async fn delete(pool: &PgPool, source_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            DELETE FROM sources
            WHERE source_id = $1
            ",
        )
        .bind(source_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
