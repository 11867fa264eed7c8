//! Username/password login.

use anyhow::Context;
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use sqlx::PgPool;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;

use super::state::AuthState;
use super::types::{LoginRequest, LoginResponse, UserProfile};
use super::utils::extract_client_ip;
use crate::api::error::ApiError;
use crate::password::{remaining_lock_minutes, verify_password};
use crate::store::accounts::{AccountRepo, AccountStatus};

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid username or password".to_string())
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; token pair plus profile.", body = LoginResponse),
        (status = 400, description = "Missing or malformed payload."),
        (status = 401, description = "Unknown username or wrong password."),
        (status = 403, description = "Account disabled or currently locked."),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    let client_ip = extract_client_ip(&headers);

    match attempt_login(&pool, &auth_state, client_ip, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn attempt_login(
    pool: &PgPool,
    state: &AuthState,
    client_ip: Option<IpAddr>,
    request: LoginRequest,
) -> Result<LoginResponse, ApiError> {
    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        return Err(ApiError::validation("Username and password are required"));
    }

    let account = AccountRepo::find_by_username(pool, username).await?;

    // Unknown usernames and deleted accounts burn the same bcrypt comparison
    // as a wrong password, so the response timing does not reveal which.
    let Some(account) = account.filter(|found| found.status != AccountStatus::Deleted) else {
        let _ = verify_password(&request.password, None);
        return Err(invalid_credentials());
    };

    if account.status == AccountStatus::Inactive {
        return Err(ApiError::Forbidden("Account is disabled".to_string()));
    }

    if let Some(locked_until) = account.locked_until {
        if let Some(minutes) = remaining_lock_minutes(locked_until, Utc::now()) {
            return Err(ApiError::Forbidden(format!(
                "Account is locked. Try again in {minutes} minutes"
            )));
        }
    }

    if !verify_password(&request.password, account.password_hash.as_deref()) {
        let tally = AccountRepo::record_login_failure(
            pool,
            account.id,
            state.config().max_failed_attempts(),
            state.config().lock_duration_minutes(),
        )
        .await?;

        if tally.locked_until.is_some_and(|until| until > Utc::now()) {
            warn!(
                username = %account.username,
                failed_attempts = tally.failed_attempts,
                "account locked after repeated login failures"
            );
        }

        return Err(invalid_credentials());
    }

    AccountRepo::record_login_success(pool, account.id, client_ip).await?;

    let roles = AccountRepo::roles(pool, account.id).await?;
    let permissions = AccountRepo::permissions(pool, account.id).await?;
    let pair = state
        .tokens()
        .issue_pair(account.id, &account.username)
        .context("failed to sign token pair")?;

    Ok(LoginResponse {
        token: pair.token,
        refresh_token: pair.refresh_token,
        user: UserProfile::from_parts(&account, roles, permissions),
    })
}
