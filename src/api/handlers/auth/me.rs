//! Profile lookups for the calling account and, for admins, any account.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::principal::{require_auth, require_self_or_admin};
use super::state::AuthState;
use super::types::UserProfile;
use crate::api::error::ApiError;
use crate::store::accounts::{AccountRepo, AccountStatus};

/// Full profile for one account. Deleted accounts read as absent.
async fn profile_of(pool: &PgPool, account_id: Uuid) -> Result<UserProfile, ApiError> {
    let account = AccountRepo::find_by_id(pool, account_id).await?;

    let Some(account) = account.filter(|found| found.status != AccountStatus::Deleted) else {
        return Err(ApiError::NotFound("Account not found".to_string()));
    };

    let roles = AccountRepo::roles(pool, account.id).await?;
    let permissions = AccountRepo::permissions(pool, account.id).await?;

    Ok(UserProfile::from_parts(&account, roles, permissions))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Profile of the calling account.", body = UserProfile),
        (status = 401, description = "Missing, invalid or expired token."),
        (status = 403, description = "Account disabled."),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(error) => return error.into_response(),
    };

    match profile_of(&pool, principal.account_id).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(error) => error.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/auth/accounts/{id}",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Profile of the requested account.", body = UserProfile),
        (status = 401, description = "Missing, invalid or expired token."),
        (status = 403, description = "Caller is neither the account owner nor an administrator."),
        (status = 404, description = "No such account."),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn account(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match account_profile(&headers, &pool, &auth_state, &id).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn account_profile(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    id: &str,
) -> Result<UserProfile, ApiError> {
    let Ok(target) = id.parse::<Uuid>() else {
        return Err(ApiError::validation("Account id must be a UUID"));
    };

    let principal = require_auth(headers, pool, state).await?;
    require_self_or_admin(&principal, target)?;

    profile_of(pool, target).await
}
