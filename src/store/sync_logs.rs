//! Batch-level audit trail of the directory sync gateway.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, PgPool, Row};
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Wire discriminator of a sync batch (`USER` or `ORG`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum SyncType {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "ORG")]
    Organization,
}

impl SyncType {
    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "user" => Ok(Self::User),
            "org" => Ok(Self::Organization),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid sync_logs.sync_type value: {value}"),
            )))),
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Organization => "org",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Success,
    Partial,
}

impl SyncOutcome {
    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid sync_logs.outcome value: {value}"),
            )))),
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncLog {
    pub id: Uuid,
    pub sync_type: SyncType,
    pub adapter: String,
    pub outcome: SyncOutcome,
    pub total: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub errors: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SyncLog {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let sync_type: String = row.try_get("sync_type")?;
        let outcome: String = row.try_get("outcome")?;
        let metadata: Option<String> = row.try_get("metadata")?;
        let metadata = metadata
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|error| sqlx::Error::Decode(Box::new(error)))?;

        Ok(Self {
            id: row.try_get("id")?,
            sync_type: SyncType::from_db(&sync_type)?,
            adapter: row.try_get("adapter")?,
            outcome: SyncOutcome::from_db(&outcome)?,
            total: row.try_get("total")?,
            succeeded: row.try_get("succeeded")?,
            failed: row.try_get("failed")?,
            errors: row.try_get("errors")?,
            metadata,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// One batch outcome, appended exactly once per callback.
#[derive(Debug)]
pub struct NewSyncLog<'a> {
    pub sync_type: SyncType,
    pub adapter: &'a str,
    pub outcome: SyncOutcome,
    pub total: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub errors: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct SyncLogRepo;

impl SyncLogRepo {
    pub async fn append(pool: &PgPool, log: &NewSyncLog<'_>) -> Result<Uuid> {
        let metadata_json = log
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to serialize sync log metadata")?;

        let query = "INSERT INTO sync_logs \
             (sync_type, adapter, outcome, total, succeeded, failed, errors, metadata, \
              started_at, finished_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8::jsonb, $9, $10) \
             RETURNING id";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );

        let row = sqlx::query(query)
            .bind(log.sync_type.as_str())
            .bind(log.adapter)
            .bind(log.outcome.as_str())
            .bind(log.total)
            .bind(log.succeeded)
            .bind(log.failed)
            .bind(log.errors.as_deref())
            .bind(metadata_json)
            .bind(log.started_at)
            .bind(log.finished_at)
            .fetch_one(pool)
            .instrument(span)
            .await
            .context("failed to append sync log")?;

        row.try_get("id").context("failed to decode sync log id")
    }

    /// Newest-first page, optionally narrowed to one sync type.
    pub async fn list(
        pool: &PgPool,
        sync_type: Option<SyncType>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SyncLog>> {
        let query = "SELECT id, sync_type, adapter, outcome, total, succeeded, failed, \
             errors, metadata::text AS metadata, started_at, finished_at, created_at \
             FROM sync_logs \
             WHERE ($1::text IS NULL OR sync_type = $1) \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        sqlx::query_as::<_, SyncLog>(query)
            .bind(sync_type.map(|t| t.as_str()))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to list sync logs")
    }

    pub async fn count(pool: &PgPool, sync_type: Option<SyncType>) -> Result<i64> {
        let query = "SELECT COUNT(*) AS total FROM sync_logs \
             WHERE ($1::text IS NULL OR sync_type = $1)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        let row = sqlx::query(query)
            .bind(sync_type.map(|t| t.as_str()))
            .fetch_one(pool)
            .instrument(span)
            .await
            .context("failed to count sync logs")?;

        row.try_get("total").context("failed to decode sync log count")
    }
}
