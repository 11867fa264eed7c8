//! Per-item application of user and organization deltas.

use anyhow::{anyhow, Result};
use sqlx::PgPool;
use std::fmt::Display;
use tracing::debug;

use crate::federation::service::DEFAULT_ROLE;
use crate::store::accounts::{
    AccountRepo, AccountSource, AccountStatus, ExternalCreate, NewExternalAccount,
};
use crate::store::orgs::{OrgPlacement, OrgRepo, OrgStatus};
use crate::store::sync_logs::SyncOutcome;
use crate::sync::{DeltaStatus, OrgDelta, UserDelta};

/// Tally of one applied batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl BatchReport {
    fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    fn success(&mut self) {
        self.succeeded += 1;
    }

    fn failure(&mut self, label: &str, detail: impl Display) {
        self.failed += 1;
        self.errors.push(format!("{label}: {detail}"));
    }

    #[must_use]
    pub fn outcome(&self) -> SyncOutcome {
        if self.failed == 0 {
            SyncOutcome::Success
        } else {
            SyncOutcome::Partial
        }
    }

    #[must_use]
    pub fn joined_errors(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

/// Empty or whitespace-only strings from the feed count as absent.
fn normalized(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn account_status(status: Option<DeltaStatus>) -> AccountStatus {
    match status {
        Some(DeltaStatus::Inactive) => AccountStatus::Inactive,
        _ => AccountStatus::Active,
    }
}

/// Apply a user batch item by item. Every failure is recorded and skipped;
/// the remaining items still land.
pub async fn apply_user_batch(pool: &PgPool, items: &[serde_json::Value]) -> BatchReport {
    let mut report = BatchReport::with_total(items.len());

    for (index, item) in items.iter().enumerate() {
        let delta: UserDelta = match serde_json::from_value(item.clone()) {
            Ok(delta) => delta,
            Err(error) => {
                report.failure(&format!("item {index}"), error);
                continue;
            }
        };

        match apply_user_delta(pool, &delta).await {
            Ok(()) => report.success(),
            Err(error) => report.failure(&delta.external_id, error),
        }
    }

    report
}

async fn apply_user_delta(pool: &PgPool, delta: &UserDelta) -> Result<()> {
    if delta.status == Some(DeltaStatus::Deleted) {
        let removed = AccountRepo::delete_synced(pool, &delta.external_id).await?;
        debug!(external_id = %delta.external_id, removed, "sync delete applied");

        return Ok(());
    }

    let username = normalized(delta.username.as_ref());
    let email = normalized(delta.email.as_ref());
    let real_name = normalized(delta.real_name.as_ref());
    let phone = normalized(delta.phone.as_ref());
    let status = account_status(delta.status);

    if let Some(existing) =
        AccountRepo::find_by_external_id(pool, AccountSource::Sso, &delta.external_id).await?
    {
        AccountRepo::apply_sync_update(
            pool,
            existing.id,
            username.as_deref(),
            email.as_deref(),
            real_name.as_deref(),
            phone.as_deref(),
            status,
        )
        .await?;

        return Ok(());
    }

    let username = username.unwrap_or_else(|| delta.external_id.clone());
    let new_account = NewExternalAccount {
        username: &username,
        email: email.as_deref(),
        real_name: real_name.as_deref(),
        phone: phone.as_deref(),
        external_id: &delta.external_id,
        status,
    };

    match AccountRepo::create_external(pool, &new_account).await? {
        ExternalCreate::Created(id) => AccountRepo::assign_role(pool, id, DEFAULT_ROLE).await,
        ExternalCreate::UsernameTaken => Err(anyhow!("username {username} already taken")),
    }
}

/// Where an organization lands given its parent, or the root when none.
fn placement_under(parent: Option<(&str, i32)>, external_id: &str) -> OrgPlacement {
    match parent {
        Some((parent_path, parent_level)) => OrgPlacement {
            path: format!("{parent_path}/{external_id}"),
            level: parent_level + 1,
        },
        None => OrgPlacement {
            path: format!("/{external_id}"),
            level: 1,
        },
    }
}

/// Order a batch so parents are applied before their children. Entries
/// without a level sort first and are treated as roots until their parent
/// shows up in a later batch.
fn sort_by_level(deltas: &mut [OrgDelta]) {
    deltas.sort_by_key(|delta| delta.level.unwrap_or(0));
}

/// Apply an organization batch: parse everything, order by hierarchy level,
/// then upsert item by item.
pub async fn apply_org_batch(pool: &PgPool, items: &[serde_json::Value]) -> BatchReport {
    let mut report = BatchReport::with_total(items.len());
    let mut deltas = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value::<OrgDelta>(item.clone()) {
            Ok(delta) => deltas.push(delta),
            Err(error) => report.failure(&format!("item {index}"), error),
        }
    }

    sort_by_level(&mut deltas);

    for delta in &deltas {
        match apply_org_delta(pool, delta).await {
            Ok(()) => report.success(),
            Err(error) => report.failure(&delta.external_id, error),
        }
    }

    report
}

async fn apply_org_delta(pool: &PgPool, delta: &OrgDelta) -> Result<()> {
    let parent_external_id = normalized(delta.parent_external_id.as_ref());

    let parent = match &parent_external_id {
        Some(parent_id) => OrgRepo::find_by_external_id(pool, parent_id).await?,
        None => None,
    };

    let placement = placement_under(
        parent
            .as_ref()
            .map(|parent| (parent.path.as_str(), parent.level)),
        &delta.external_id,
    );

    // Inactive (and anything short of active) is a soft disable; the sync
    // feed never removes organization rows.
    let status = match delta.status {
        Some(DeltaStatus::Active) | None => OrgStatus::Active,
        Some(_) => OrgStatus::Inactive,
    };

    OrgRepo::upsert(
        pool,
        &delta.external_id,
        &delta.name,
        parent_external_id.as_deref(),
        &placement,
        status,
    )
    .await
}
