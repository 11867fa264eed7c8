//! Password changes, both self-service and administrative reset.

use anyhow::Context;
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use super::principal::{require_admin, require_auth};
use super::state::AuthState;
use super::types::{Acknowledgement, ChangePasswordRequest, ResetPasswordRequest};
use crate::api::error::ApiError;
use crate::password::{hash_password, verify_password};
use crate::store::accounts::AccountRepo;

#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed.", body = Acknowledgement),
        (status = 400, description = "Wrong old password or new password rejected by policy."),
        (status = 401, description = "Missing, invalid or expired token."),
        (status = 403, description = "Account disabled."),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    match change_own_password(&pool, &auth_state, &headers, request).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn change_own_password(
    pool: &PgPool,
    state: &AuthState,
    headers: &HeaderMap,
    request: ChangePasswordRequest,
) -> Result<Acknowledgement, ApiError> {
    let principal = require_auth(headers, pool, state).await?;

    let account = AccountRepo::find_by_id(pool, principal.account_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;

    if !verify_password(&request.old_password, account.password_hash.as_deref()) {
        return Err(ApiError::validation("Old password is incorrect"));
    }

    if let Err(violation) = state.config().password_policy().validate(&request.new_password) {
        return Err(ApiError::validation_with(
            "New password does not meet the password policy",
            vec![violation.message()],
        ));
    }

    let hash = hash_password(&request.new_password).context("failed to hash password")?;
    AccountRepo::set_password(pool, account.id, &hash).await?;

    info!(username = %account.username, "password changed");

    Ok(Acknowledgement::new("Password changed"))
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset and lockout cleared.", body = Acknowledgement),
        (status = 400, description = "New password rejected by policy."),
        (status = 401, description = "Missing, invalid or expired token."),
        (status = 403, description = "Caller is not an administrator."),
        (status = 404, description = "No such account."),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn reset_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    match reset_account_password(&pool, &auth_state, &headers, request).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn reset_account_password(
    pool: &PgPool,
    state: &AuthState,
    headers: &HeaderMap,
    request: ResetPasswordRequest,
) -> Result<Acknowledgement, ApiError> {
    let principal = require_auth(headers, pool, state).await?;
    require_admin(&principal)?;

    if let Err(violation) = state.config().password_policy().validate(&request.new_password) {
        return Err(ApiError::validation_with(
            "New password does not meet the password policy",
            vec![violation.message()],
        ));
    }

    let hash = hash_password(&request.new_password).context("failed to hash password")?;

    // Reset also clears the failed-attempt counter and lock, so a locked-out
    // user can sign in immediately with the new password.
    if !AccountRepo::reset_password(pool, request.user_id, &hash).await? {
        return Err(ApiError::NotFound("Account not found".to_string()));
    }

    info!(
        admin = %principal.username,
        user_id = %request.user_id,
        "password reset"
    );

    Ok(Acknowledgement::new("Password reset"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use secrecy::SecretString;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
    use uuid::Uuid;

    use super::super::state::AuthConfig;

    fn state() -> Arc<AuthState> {
        Arc::new(
            AuthState::new(AuthConfig::new(SecretString::from(
                "test-jwt-secret".to_string(),
            )))
            .unwrap(),
        )
    }

    fn unreachable_pool() -> PgPool {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("postgres")
            .database("postgres");

        PgPoolOptions::new().connect_lazy_with(options)
    }

    async fn envelope_code(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        value["code"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_change_password_without_payload_is_a_validation_error() {
        let response = change_password(
            HeaderMap::new(),
            Extension(unreachable_pool()),
            Extension(state()),
            None,
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(envelope_code(response).await, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_change_password_without_token_is_unauthorized() {
        let request = ChangePasswordRequest {
            old_password: "Old123!pass".to_string(),
            new_password: "New123!pass".to_string(),
        };

        let response = change_password(
            HeaderMap::new(),
            Extension(unreachable_pool()),
            Extension(state()),
            Some(Json(request)),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(envelope_code(response).await, "MISSING_TOKEN");
    }

    #[tokio::test]
    async fn test_reset_password_without_token_is_unauthorized() {
        let request = ResetPasswordRequest {
            user_id: Uuid::new_v4(),
            new_password: "New123!pass".to_string(),
        };

        let response = reset_password(
            HeaderMap::new(),
            Extension(unreachable_pool()),
            Extension(state()),
            Some(Json(request)),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
