//! Access-token renewal from a refresh token.

use anyhow::Context;
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;

use super::state::AuthState;
use super::types::{RefreshRequest, RefreshResponse};
use crate::api::error::ApiError;
use crate::store::accounts::{AccountRepo, AccountStatus};
use crate::token::TokenError;

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "A fresh access token. The refresh token is not rotated.", body = RefreshResponse),
        (status = 400, description = "Missing or malformed payload."),
        (status = 401, description = "Refresh token invalid or expired."),
        (status = 403, description = "Account disabled since the token was issued."),
    ),
    tag = "auth"
)]
pub async fn refresh(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    match renew_access(&pool, &auth_state, &request.refresh_token).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn renew_access(
    pool: &PgPool,
    state: &AuthState,
    refresh_token: &str,
) -> Result<RefreshResponse, ApiError> {
    let claims = state.tokens().verify_refresh(refresh_token)?;

    // The account is re-checked on every renewal so a disable or delete cuts
    // the session short even while the refresh token is still within its TTL.
    let account = AccountRepo::find_by_id(pool, claims.sub).await?;

    let Some(account) = account.filter(|found| found.status != AccountStatus::Deleted) else {
        return Err(TokenError::InvalidRefresh.into());
    };

    if account.status == AccountStatus::Inactive {
        return Err(ApiError::Forbidden("Account is disabled".to_string()));
    }

    let token = state
        .tokens()
        .issue_access(account.id, &account.username)
        .context("failed to sign access token")?;

    Ok(RefreshResponse { token })
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
    async fn test_refresh_without_payload_is_a_validation_error() {
        let response = refresh(Extension(unreachable_pool()), Extension(state()), None)
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refresh_rejects_garbage_token_before_any_database_work() {
        let request = RefreshRequest {
            refresh_token: "not.a.token".to_string(),
        };

        let response = refresh(
            Extension(unreachable_pool()),
            Extension(state()),
            Some(Json(request)),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(envelope_code(response).await, "INVALID_REFRESH_TOKEN");
    }

    #[tokio::test]
    async fn test_refresh_rejects_an_access_token() {
        let state = state();
        let token = state
            .tokens()
            .issue_access(Uuid::new_v4(), "jsmith")
            .unwrap();

        let request = RefreshRequest {
            refresh_token: token,
        };

        let response = refresh(
            Extension(unreachable_pool()),
            Extension(state),
            Some(Json(request)),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(envelope_code(response).await, "INVALID_REFRESH_TOKEN");
    }

    #[tokio::test]
    async fn test_refresh_with_valid_token_but_unreachable_database_fails() {
        let state = state();
        let token = state
            .tokens()
            .issue_refresh(Uuid::new_v4(), "jsmith")
            .unwrap();

        let request = RefreshRequest {
            refresh_token: token,
        };

        let response = refresh(
            Extension(unreachable_pool()),
            Extension(state),
            Some(Json(request)),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
