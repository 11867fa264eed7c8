//! Attaching mapped remote profiles to local accounts.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::federation::mapping::MappedProfile;
use crate::store::accounts::{
    Account, AccountRepo, AccountSource, AccountStatus, ExternalCreate, NewExternalAccount,
};

/// Role granted to accounts the federation path creates.
pub const DEFAULT_ROLE: &str = "user";

/// Outcome of resolving a mapped profile to an account.
#[derive(Debug)]
pub enum SsoLogin {
    Authenticated(Account),
    Disabled,
    UsernameConflict,
}

async fn finish_login(pool: &PgPool, account_id: uuid::Uuid) -> Result<Account> {
    AccountRepo::record_login_success(pool, account_id, None).await?;

    AccountRepo::find_by_id(pool, account_id)
        .await?
        .context("account vanished during federated login")
}

/// Find or create the account behind a mapped profile, keyed by
/// `(external_id, source = sso)`.
///
/// Existing accounts get empty profile fields backfilled, never overwritten.
/// New accounts start active with the default role; a username collision is
/// retried once with a provider-suffixed username.
pub async fn find_or_create_account(
    pool: &PgPool,
    provider_key: &str,
    profile: &MappedProfile,
) -> Result<SsoLogin> {
    if let Some(account) =
        AccountRepo::find_by_external_id(pool, AccountSource::Sso, &profile.external_id).await?
    {
        if account.status != AccountStatus::Active {
            return Ok(SsoLogin::Disabled);
        }

        AccountRepo::backfill_profile(
            pool,
            account.id,
            profile.email.as_deref(),
            profile.real_name.as_deref(),
        )
        .await?;

        return Ok(SsoLogin::Authenticated(finish_login(pool, account.id).await?));
    }

    let mut new_account = NewExternalAccount {
        username: &profile.username,
        email: profile.email.as_deref(),
        real_name: profile.real_name.as_deref(),
        phone: profile.phone.as_deref(),
        external_id: &profile.external_id,
        status: AccountStatus::Active,
    };

    let created = match AccountRepo::create_external(pool, &new_account).await? {
        ExternalCreate::Created(id) => id,
        ExternalCreate::UsernameTaken => {
            let fallback = format!("{}_{provider_key}", profile.username);
            new_account.username = &fallback;

            match AccountRepo::create_external(pool, &new_account).await? {
                ExternalCreate::Created(id) => id,
                ExternalCreate::UsernameTaken => return Ok(SsoLogin::UsernameConflict),
            }
        }
    };

    AccountRepo::assign_role(pool, created, DEFAULT_ROLE).await?;

    info!(
        provider = provider_key,
        external_id = %profile.external_id,
        "provisioned account from federated identity"
    );

    Ok(SsoLogin::Authenticated(finish_login(pool, created).await?))
}
