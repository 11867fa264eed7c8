//! Account rows and the queries the auth, federation and sync paths share.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, PgPool, Row};
use std::net::IpAddr;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::is_unique_violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    Active,
    Inactive,
    Deleted,
}

impl AccountStatus {
    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "deleted" => Ok(Self::Deleted),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid accounts.status value: {value}"),
            )))),
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountSource {
    Local,
    Sso,
    Hr,
}

impl AccountSource {
    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "local" => Ok(Self::Local),
            "sso" => Ok(Self::Sso),
            "hr" => Ok(Self::Hr),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid accounts.source value: {value}"),
            )))),
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Sso => "sso",
            Self::Hr => "hr",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub password_hash: Option<String>,
    pub email: Option<String>,
    pub real_name: Option<String>,
    pub phone: Option<String>,
    pub status: AccountStatus,
    pub source: AccountSource,
    pub external_id: Option<String>,
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Account {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let source: String = row.try_get("source")?;

        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            email: row.try_get("email")?,
            real_name: row.try_get("real_name")?,
            phone: row.try_get("phone")?,
            status: AccountStatus::from_db(&status)?,
            source: AccountSource::from_db(&source)?,
            external_id: row.try_get("external_id")?,
            failed_attempts: row.try_get("failed_attempts")?,
            locked_until: row.try_get("locked_until")?,
            last_login_at: row.try_get("last_login_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Counter state after an atomic failure increment.
#[derive(Debug)]
pub struct FailureTally {
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Fields for an account created from an external identity (federation or sync).
#[derive(Debug)]
pub struct NewExternalAccount<'a> {
    pub username: &'a str,
    pub email: Option<&'a str>,
    pub real_name: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub external_id: &'a str,
    pub status: AccountStatus,
}

/// Outcome of inserting an externally sourced account.
#[derive(Debug)]
pub enum ExternalCreate {
    Created(Uuid),
    UsernameTaken,
}

pub struct AccountRepo;

impl AccountRepo {
    pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<Account>> {
        let query = "SELECT id, username, password_hash, email, real_name, phone, \
             status, source, external_id, failed_attempts, locked_until, last_login_at, \
             created_at, updated_at FROM accounts WHERE username = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        sqlx::query_as::<_, Account>(query)
            .bind(username)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch account by username")
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Account>> {
        let query = "SELECT id, username, password_hash, email, real_name, phone, \
             status, source, external_id, failed_attempts, locked_until, last_login_at, \
             created_at, updated_at FROM accounts WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        sqlx::query_as::<_, Account>(query)
            .bind(id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch account by id")
    }

    /// Look up an externally sourced account by its upstream identifier.
    pub async fn find_by_external_id(
        pool: &PgPool,
        source: AccountSource,
        external_id: &str,
    ) -> Result<Option<Account>> {
        let query = "SELECT id, username, password_hash, email, real_name, phone, \
             status, source, external_id, failed_attempts, locked_until, last_login_at, \
             created_at, updated_at FROM accounts WHERE source = $1 AND external_id = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        sqlx::query_as::<_, Account>(query)
            .bind(source.as_str())
            .bind(external_id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch account by external id")
    }

    /// Count a failed login attempt and arm the lock once the threshold is
    /// reached, in a single statement so concurrent failures cannot lose
    /// increments.
    pub async fn record_login_failure(
        pool: &PgPool,
        id: Uuid,
        max_failed_attempts: i32,
        lock_duration_minutes: i32,
    ) -> Result<FailureTally> {
        let query = "UPDATE accounts SET \
             failed_attempts = failed_attempts + 1, \
             locked_until = CASE WHEN failed_attempts + 1 >= $2 \
                 THEN now() + make_interval(mins => $3) ELSE locked_until END, \
             updated_at = now() \
             WHERE id = $1 \
             RETURNING failed_attempts, locked_until";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );

        let row = sqlx::query(query)
            .bind(id)
            .bind(max_failed_attempts)
            .bind(lock_duration_minutes)
            .fetch_one(pool)
            .instrument(span)
            .await
            .context("failed to record login failure")?;

        Ok(FailureTally {
            failed_attempts: row.try_get("failed_attempts")?,
            locked_until: row.try_get("locked_until")?,
        })
    }

    /// Clear the failure counter and stamp the login on success.
    pub async fn record_login_success(
        pool: &PgPool,
        id: Uuid,
        client_ip: Option<IpAddr>,
    ) -> Result<()> {
        let query = "UPDATE accounts SET \
             failed_attempts = 0, locked_until = NULL, \
             last_login_at = now(), last_login_ip = $2, updated_at = now() \
             WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );

        sqlx::query(query)
            .bind(id)
            .bind(client_ip)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to record login success")?;

        Ok(())
    }

    pub async fn set_password(pool: &PgPool, id: Uuid, password_hash: &str) -> Result<bool> {
        let query =
            "UPDATE accounts SET password_hash = $2, updated_at = now() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );

        let result = sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to update password hash")?;

        Ok(result.rows_affected() > 0)
    }

    /// Administrative reset: new hash plus a clean lockout slate.
    pub async fn reset_password(pool: &PgPool, id: Uuid, password_hash: &str) -> Result<bool> {
        let query = "UPDATE accounts SET password_hash = $2, \
             failed_attempts = 0, locked_until = NULL, updated_at = now() \
             WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );

        let result = sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to reset password")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn roles(pool: &PgPool, id: Uuid) -> Result<Vec<String>> {
        let query = "SELECT r.code FROM roles r \
             JOIN account_roles ar ON ar.role_id = r.id \
             WHERE ar.account_id = $1 ORDER BY r.code";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        let rows = sqlx::query(query)
            .bind(id)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to fetch account roles")?;

        rows.into_iter()
            .map(|row| row.try_get("code"))
            .collect::<Result<Vec<String>, sqlx::Error>>()
            .context("failed to decode role codes")
    }

    pub async fn permissions(pool: &PgPool, id: Uuid) -> Result<Vec<String>> {
        let query = "SELECT DISTINCT p.code FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             JOIN account_roles ar ON ar.role_id = rp.role_id \
             WHERE ar.account_id = $1 ORDER BY p.code";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        let rows = sqlx::query(query)
            .bind(id)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to fetch account permissions")?;

        rows.into_iter()
            .map(|row| row.try_get("code"))
            .collect::<Result<Vec<String>, sqlx::Error>>()
            .context("failed to decode permission codes")
    }

    /// Grant a role by code. A no-op when the role does not exist or is
    /// already granted.
    pub async fn assign_role(pool: &PgPool, id: Uuid, role_code: &str) -> Result<()> {
        let query = "INSERT INTO account_roles (account_id, role_id) \
             SELECT $1, id FROM roles WHERE code = $2 \
             ON CONFLICT DO NOTHING";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );

        sqlx::query(query)
            .bind(id)
            .bind(role_code)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to assign role")?;

        Ok(())
    }

    pub async fn create_external(
        pool: &PgPool,
        account: &NewExternalAccount<'_>,
    ) -> Result<ExternalCreate> {
        let query = "INSERT INTO accounts \
             (username, email, real_name, phone, status, source, external_id) \
             VALUES ($1, $2, $3, $4, $5, 'sso', $6) \
             RETURNING id";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );

        let result = sqlx::query(query)
            .bind(account.username)
            .bind(account.email)
            .bind(account.real_name)
            .bind(account.phone)
            .bind(account.status.as_str())
            .bind(account.external_id)
            .fetch_one(pool)
            .instrument(span)
            .await;

        match result {
            Ok(row) => Ok(ExternalCreate::Created(row.try_get("id")?)),
            Err(error) if is_unique_violation(&error) => Ok(ExternalCreate::UsernameTaken),
            Err(error) => Err(error).context("failed to insert external account"),
        }
    }

    /// Fill in profile fields that are still empty; never overwrites data a
    /// user or administrator already set.
    pub async fn backfill_profile(
        pool: &PgPool,
        id: Uuid,
        email: Option<&str>,
        real_name: Option<&str>,
    ) -> Result<()> {
        let query = "UPDATE accounts SET \
             email = CASE WHEN (email IS NULL OR email = '') THEN COALESCE($2, email) ELSE email END, \
             real_name = CASE WHEN (real_name IS NULL OR real_name = '') THEN COALESCE($3, real_name) ELSE real_name END, \
             updated_at = now() \
             WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );

        sqlx::query(query)
            .bind(id)
            .bind(email)
            .bind(real_name)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to backfill profile fields")?;

        Ok(())
    }

    /// Overwrite profile fields from an authoritative sync delta. `None`
    /// values (absent or empty upstream) preserve what is stored.
    pub async fn apply_sync_update(
        pool: &PgPool,
        id: Uuid,
        username: Option<&str>,
        email: Option<&str>,
        real_name: Option<&str>,
        phone: Option<&str>,
        status: AccountStatus,
    ) -> Result<()> {
        let query = "UPDATE accounts SET \
             username = COALESCE($2, username), \
             email = COALESCE($3, email), \
             real_name = COALESCE($4, real_name), \
             phone = COALESCE($5, phone), \
             status = $6, updated_at = now() \
             WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );

        sqlx::query(query)
            .bind(id)
            .bind(username)
            .bind(email)
            .bind(real_name)
            .bind(phone)
            .bind(status.as_str())
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to apply sync update")?;

        Ok(())
    }

    /// Physical removal of a synced account, scoped to the sso source so
    /// local accounts can never be deleted by a directory feed.
    pub async fn delete_synced(pool: &PgPool, external_id: &str) -> Result<u64> {
        let query = "DELETE FROM accounts WHERE external_id = $1 AND source = 'sso'";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );

        let result = sqlx::query(query)
            .bind(external_id)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to delete synced account")?;

        Ok(result.rows_affected())
    }

    /// Seed a local account if the username is free. Returns the new id, or
    /// `None` when the username already exists.
    pub async fn create_local(
        pool: &PgPool,
        username: &str,
        password_hash: &str,
        real_name: &str,
    ) -> Result<Option<Uuid>> {
        let query = "INSERT INTO accounts (username, password_hash, real_name, status, source) \
             VALUES ($1, $2, $3, 'active', 'local') \
             ON CONFLICT (username) DO NOTHING \
             RETURNING id";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );

        let row = sqlx::query(query)
            .bind(username)
            .bind(password_hash)
            .bind(real_name)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to create local account")?;

        row.map(|row| row.try_get("id"))
            .transpose()
            .context("failed to decode created account id")
    }
}
