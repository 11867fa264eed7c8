//! Public federation endpoints: provider discovery, authorization redirect
//! and the code-exchange callback.

use anyhow::Context;
use axum::{
    extract::{rejection::QueryRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use super::state::AuthState;
use super::types::{LoginResponse, UserProfile};
use crate::api::error::ApiError;
use crate::federation::client::{authorize_url, generate_state};
use crate::federation::mapping::map_profile;
use crate::federation::service::{find_or_create_account, SsoLogin};
use crate::federation::settings::ProviderSettings;
use crate::store::accounts::AccountRepo;
use crate::store::providers::{FederationProvider, ProviderRepo};

/// What anonymous clients may learn about a provider.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PublicProvider {
    pub provider: String,
    pub name: String,
    #[serde(rename = "type")]
    pub protocol: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub auth_url: String,
    pub provider: String,
}

#[derive(IntoParams, Debug, Deserialize, Default)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeParams {
    /// Opaque CSRF state echoed back by the provider; generated when absent.
    pub state: Option<String>,
}

#[derive(IntoParams, Debug, Deserialize)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    /// Authorization code issued by the provider.
    pub code: String,
    #[allow(dead_code)]
    pub state: Option<String>,
}

async fn enabled_provider(pool: &PgPool, key: &str) -> Result<FederationProvider, ApiError> {
    let provider = ProviderRepo::find_by_key(pool, key).await?;

    provider
        .filter(|found| found.enabled)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown or disabled provider: {key}")))
}

#[utoipa::path(
    get,
    path = "/auth/sso/providers",
    responses(
        (status = 200, description = "Enabled providers in display order, without secrets.", body = [PublicProvider]),
    ),
    tag = "sso"
)]
pub async fn providers(pool: Extension<PgPool>) -> impl IntoResponse {
    match ProviderRepo::list_enabled(&pool).await {
        Ok(providers) => {
            let listing: Vec<PublicProvider> = providers
                .into_iter()
                .map(|provider| PublicProvider {
                    protocol: provider.settings.protocol().as_str().to_string(),
                    provider: provider.provider,
                    name: provider.name,
                })
                .collect();

            (StatusCode::OK, Json(listing)).into_response()
        }
        Err(error) => ApiError::from(error).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/auth/sso/authorize/{provider}",
    params(
        ("provider" = String, Path, description = "Provider key"),
        AuthorizeParams,
    ),
    responses(
        (status = 200, description = "Authorization redirect URL for the provider.", body = AuthorizeResponse),
        (status = 400, description = "Provider protocol has no interactive authorization flow."),
        (status = 404, description = "Unknown or disabled provider."),
    ),
    tag = "sso"
)]
pub async fn authorize(
    pool: Extension<PgPool>,
    Path(provider): Path<String>,
    Query(params): Query<AuthorizeParams>,
) -> impl IntoResponse {
    match authorize_redirect(&pool, &provider, params.state).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn authorize_redirect(
    pool: &PgPool,
    provider_key: &str,
    state: Option<String>,
) -> Result<AuthorizeResponse, ApiError> {
    let provider = enabled_provider(pool, provider_key).await?;

    let ProviderSettings::OAuth2(settings) = &provider.settings else {
        return Err(ApiError::validation(format!(
            "Interactive login is not supported for {} providers",
            provider.settings.protocol().as_str()
        )));
    };

    let state = state.unwrap_or_else(generate_state);
    let url = authorize_url(settings, &state)?;

    Ok(AuthorizeResponse {
        auth_url: url.into(),
        provider: provider.provider,
    })
}

#[utoipa::path(
    get,
    path = "/auth/sso/callback/{provider}",
    params(
        ("provider" = String, Path, description = "Provider key"),
        CallbackParams,
    ),
    responses(
        (status = 200, description = "Authenticated; token pair plus profile.", body = LoginResponse),
        (status = 400, description = "Missing code or non-interactive protocol."),
        (status = 403, description = "Matched account is disabled."),
        (status = 404, description = "Unknown or disabled provider."),
        (status = 409, description = "Username collision could not be resolved."),
        (status = 502, description = "Identity provider rejected the exchange."),
    ),
    tag = "sso"
)]
pub async fn callback(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(provider): Path<String>,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> impl IntoResponse {
    let Ok(Query(params)) = params else {
        return ApiError::validation("Missing code parameter").into_response();
    };

    match federated_login(&pool, &auth_state, &provider, &params.code).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn federated_login(
    pool: &PgPool,
    state: &AuthState,
    provider_key: &str,
    code: &str,
) -> Result<LoginResponse, ApiError> {
    let provider = enabled_provider(pool, provider_key).await?;

    let ProviderSettings::OAuth2(settings) = &provider.settings else {
        return Err(ApiError::validation(format!(
            "Interactive login is not supported for {} providers",
            provider.settings.protocol().as_str()
        )));
    };

    let access_token = state.federation().exchange_code(settings, code).await?;
    let profile = state
        .federation()
        .fetch_profile(settings, &access_token)
        .await?;
    let mapped = map_profile(&profile, settings.mapping.as_ref())?;

    let account = match find_or_create_account(pool, &provider.provider, &mapped).await? {
        SsoLogin::Authenticated(account) => account,
        SsoLogin::Disabled => {
            return Err(ApiError::Forbidden("Account is disabled".to_string()));
        }
        SsoLogin::UsernameConflict => {
            return Err(ApiError::Conflict(
                "Username already taken, even with the provider suffix".to_string(),
            ));
        }
    };

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
