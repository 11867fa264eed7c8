//! Organization hierarchy rows maintained by the directory sync feed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrgStatus {
    Active,
    Inactive,
}

impl OrgStatus {
    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid organizations.status value: {value}"),
            )))),
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Organization {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub parent_external_id: Option<String>,
    pub path: String,
    pub level: i32,
    pub status: OrgStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Organization {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;

        Ok(Self {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            name: row.try_get("name")?,
            parent_external_id: row.try_get("parent_external_id")?,
            path: row.try_get("path")?,
            level: row.try_get("level")?,
            status: OrgStatus::from_db(&status)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Materialized placement of an upserted organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgPlacement {
    pub path: String,
    pub level: i32,
}

pub struct OrgRepo;

impl OrgRepo {
    pub async fn find_by_external_id(
        pool: &PgPool,
        external_id: &str,
    ) -> Result<Option<Organization>> {
        let query = "SELECT id, external_id, name, parent_external_id, path, level, \
             status, created_at, updated_at \
             FROM organizations WHERE external_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        sqlx::query_as::<_, Organization>(query)
            .bind(external_id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch organization")
    }

    /// Insert or refresh an organization keyed by its upstream identifier.
    pub async fn upsert(
        pool: &PgPool,
        external_id: &str,
        name: &str,
        parent_external_id: Option<&str>,
        placement: &OrgPlacement,
        status: OrgStatus,
    ) -> Result<()> {
        let query = "INSERT INTO organizations \
             (external_id, name, parent_external_id, path, level, status) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (external_id) DO UPDATE SET \
             name = EXCLUDED.name, \
             parent_external_id = EXCLUDED.parent_external_id, \
             path = EXCLUDED.path, \
             level = EXCLUDED.level, \
             status = EXCLUDED.status, \
             updated_at = now()";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );

        sqlx::query(query)
            .bind(external_id)
            .bind(name)
            .bind(parent_external_id)
            .bind(&placement.path)
            .bind(placement.level)
            .bind(status.as_str())
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to upsert organization")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_db_text() {
        for status in [OrgStatus::Active, OrgStatus::Inactive] {
            assert_eq!(OrgStatus::from_db(status.as_str()).unwrap(), status);
        }

        assert!(OrgStatus::from_db("archived").is_err());
    }

    #[test]
    fn test_placement_equality() {
        let a = OrgPlacement {
            path: "/hq/ops".to_string(),
            level: 2,
        };

        assert_eq!(
            a,
            OrgPlacement {
                path: "/hq/ops".to_string(),
                level: 2
            }
        );
    }
}
