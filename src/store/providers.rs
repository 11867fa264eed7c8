//! Identity provider records, with settings persisted as validated JSONB.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::federation::settings::ProviderSettings;
use crate::store::is_unique_violation;

#[derive(Debug, Clone)]
pub struct FederationProvider {
    pub id: Uuid,
    pub provider: String,
    pub name: String,
    pub enabled: bool,
    pub settings: ProviderSettings,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for FederationProvider {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let raw_settings: String = row.try_get("settings")?;
        let settings: ProviderSettings =
            serde_json::from_str(&raw_settings).map_err(|error| sqlx::Error::Decode(Box::new(error)))?;

        Ok(Self {
            id: row.try_get("id")?,
            provider: row.try_get("provider")?,
            name: row.try_get("name")?,
            enabled: row.try_get("enabled")?,
            settings,
            sort_order: row.try_get("sort_order")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Outcome of inserting a provider with a unique key.
#[derive(Debug)]
pub enum CreateProvider {
    Created(Uuid),
    DuplicateKey,
}

pub struct ProviderRepo;

impl ProviderRepo {
    pub async fn list_all(pool: &PgPool) -> Result<Vec<FederationProvider>> {
        let query = "SELECT id, provider, name, enabled, settings::text AS settings, \
             sort_order, created_at, updated_at \
             FROM federation_providers ORDER BY sort_order, provider";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        sqlx::query_as::<_, FederationProvider>(query)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to list providers")
    }

    pub async fn list_enabled(pool: &PgPool) -> Result<Vec<FederationProvider>> {
        let query = "SELECT id, provider, name, enabled, settings::text AS settings, \
             sort_order, created_at, updated_at \
             FROM federation_providers WHERE enabled ORDER BY sort_order, provider";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        sqlx::query_as::<_, FederationProvider>(query)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to list enabled providers")
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<FederationProvider>> {
        let query = "SELECT id, provider, name, enabled, settings::text AS settings, \
             sort_order, created_at, updated_at \
             FROM federation_providers WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        sqlx::query_as::<_, FederationProvider>(query)
            .bind(id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch provider by id")
    }

    pub async fn find_by_key(pool: &PgPool, key: &str) -> Result<Option<FederationProvider>> {
        let query = "SELECT id, provider, name, enabled, settings::text AS settings, \
             sort_order, created_at, updated_at \
             FROM federation_providers WHERE provider = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        sqlx::query_as::<_, FederationProvider>(query)
            .bind(key)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch provider by key")
    }

    /// Resolve the provider whose effective credential id matches, with the
    /// `appId` field winning over `clientId` as at token exchange.
    pub async fn find_by_app_id(pool: &PgPool, app_id: &str) -> Result<Option<FederationProvider>> {
        let query = "SELECT id, provider, name, enabled, settings::text AS settings, \
             sort_order, created_at, updated_at \
             FROM federation_providers \
             WHERE COALESCE(settings->>'appId', settings->>'clientId') = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        sqlx::query_as::<_, FederationProvider>(query)
            .bind(app_id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to resolve provider by app id")
    }

    pub async fn create(
        pool: &PgPool,
        key: &str,
        name: &str,
        settings: &ProviderSettings,
        enabled: bool,
        sort_order: i32,
    ) -> Result<CreateProvider> {
        let settings_json =
            serde_json::to_string(settings).context("failed to serialize provider settings")?;

        let query = "INSERT INTO federation_providers \
             (provider, name, protocol, enabled, settings, sort_order) \
             VALUES ($1, $2, $3, $4, $5::jsonb, $6) \
             RETURNING id";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );

        let result = sqlx::query(query)
            .bind(key)
            .bind(name)
            .bind(settings.protocol().as_str())
            .bind(enabled)
            .bind(settings_json)
            .bind(sort_order)
            .fetch_one(pool)
            .instrument(span)
            .await;

        match result {
            Ok(row) => Ok(CreateProvider::Created(row.try_get("id")?)),
            Err(error) if is_unique_violation(&error) => Ok(CreateProvider::DuplicateKey),
            Err(error) => Err(error).context("failed to insert provider"),
        }
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        name: &str,
        settings: &ProviderSettings,
        enabled: bool,
        sort_order: i32,
    ) -> Result<bool> {
        let settings_json =
            serde_json::to_string(settings).context("failed to serialize provider settings")?;

        let query = "UPDATE federation_providers SET \
             name = $2, protocol = $3, enabled = $4, settings = $5::jsonb, \
             sort_order = $6, updated_at = now() \
             WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );

        let result = sqlx::query(query)
            .bind(id)
            .bind(name)
            .bind(settings.protocol().as_str())
            .bind(enabled)
            .bind(settings_json)
            .bind(sort_order)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to update provider")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
        let query = "DELETE FROM federation_providers WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );

        let result = sqlx::query(query)
            .bind(id)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to delete provider")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_enabled(pool: &PgPool, id: Uuid, enabled: bool) -> Result<bool> {
        let query = "UPDATE federation_providers SET enabled = $2, updated_at = now() \
             WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );

        let result = sqlx::query(query)
            .bind(id)
            .bind(enabled)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to toggle provider")?;

        Ok(result.rows_affected() > 0)
    }
}
