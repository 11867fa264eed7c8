//! Administrative CRUD over federation providers.
//!
//! Settings documents are parsed and validated on every write, so stored
//! settings are always decodable. Listings mask credential secrets.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::handlers::auth::principal::{require_admin, require_auth};
use crate::api::handlers::auth::types::Acknowledgement;
use crate::api::handlers::auth::AuthState;
use crate::federation::client::ProbeReport;
use crate::federation::settings::ProviderSettings;
use crate::store::providers::{CreateProvider, FederationProvider, ProviderRepo};

/// Administrative rendering of one provider, secrets masked.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    pub id: String,
    pub provider: String,
    pub name: String,
    pub enabled: bool,
    pub sort_order: i32,
    #[schema(value_type = Object)]
    pub settings: serde_json::Value,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl ProviderView {
    fn from_record(provider: FederationProvider) -> Self {
        Self {
            id: provider.id.to_string(),
            settings: provider.settings.masked(),
            provider: provider.provider,
            name: provider.name,
            enabled: provider.enabled,
            sort_order: provider.sort_order,
            created_at: provider.created_at,
            updated_at: provider.updated_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateProviderRequest {
    pub provider: String,
    pub name: String,
    #[schema(value_type = Object)]
    pub settings: serde_json::Value,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProviderRequest {
    pub name: String,
    #[schema(value_type = Object)]
    pub settings: serde_json::Value,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ToggleRequest {
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

fn provider_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse::<Uuid>()
        .map_err(|_| ApiError::validation("Provider id must be a UUID"))
}

/// Keys end up as URL path segments of the login and callback routes.
fn valid_provider_key(key: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").map_or(false, |re| re.is_match(key))
}

fn parsed_settings(value: &serde_json::Value) -> Result<ProviderSettings, ApiError> {
    let settings = ProviderSettings::parse(value)
        .map_err(|error| ApiError::validation(format!("Malformed provider settings: {error}")))?;

    if let Err(problems) = settings.validate() {
        return Err(ApiError::validation_with(
            "Provider settings failed validation",
            problems,
        ));
    }

    Ok(settings)
}

async fn admin_of(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<String, ApiError> {
    let principal = require_auth(headers, pool, state).await?;
    require_admin(&principal)?;

    Ok(principal.username)
}

#[utoipa::path(
    get,
    path = "/sso",
    responses(
        (status = 200, description = "All providers, secrets masked.", body = [ProviderView]),
        (status = 401, description = "Missing, invalid or expired token."),
        (status = 403, description = "Caller is not an administrator."),
    ),
    security(("bearer" = [])),
    tag = "sso-admin"
)]
pub async fn list(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match list_providers(&headers, &pool, &auth_state).await {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn list_providers(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Vec<ProviderView>, ApiError> {
    admin_of(headers, pool, state).await?;

    let providers = ProviderRepo::list_all(pool).await?;

    Ok(providers.into_iter().map(ProviderView::from_record).collect())
}

#[utoipa::path(
    post,
    path = "/sso",
    request_body = CreateProviderRequest,
    responses(
        (status = 201, description = "Provider created.", body = ProviderView),
        (status = 400, description = "Malformed or invalid settings document."),
        (status = 401, description = "Missing, invalid or expired token."),
        (status = 403, description = "Caller is not an administrator."),
        (status = 409, description = "Provider key already exists."),
    ),
    security(("bearer" = [])),
    tag = "sso-admin"
)]
pub async fn create(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreateProviderRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    match create_provider(&headers, &pool, &auth_state, request).await {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn create_provider(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    request: CreateProviderRequest,
) -> Result<ProviderView, ApiError> {
    let admin = admin_of(headers, pool, state).await?;

    let key = request.provider.trim();
    if key.is_empty() || request.name.trim().is_empty() {
        return Err(ApiError::validation("Provider key and name are required"));
    }

    if !valid_provider_key(key) {
        return Err(ApiError::validation(
            "Provider key may only contain letters, digits, hyphens and underscores",
        ));
    }

    let settings = parsed_settings(&request.settings)?;

    let created = ProviderRepo::create(
        pool,
        key,
        request.name.trim(),
        &settings,
        request.enabled,
        request.sort_order,
    )
    .await?;

    let id = match created {
        CreateProvider::Created(id) => id,
        CreateProvider::DuplicateKey => {
            return Err(ApiError::Conflict(format!(
                "Provider key already exists: {key}"
            )));
        }
    };

    info!(admin = %admin, provider = key, "federation provider created");

    fetch_view(pool, id).await
}

async fn fetch_view(pool: &PgPool, id: Uuid) -> Result<ProviderView, ApiError> {
    ProviderRepo::find_by_id(pool, id)
        .await?
        .map(ProviderView::from_record)
        .ok_or_else(|| ApiError::NotFound("Provider not found".to_string()))
}

#[utoipa::path(
    get,
    path = "/sso/{id}",
    params(("id" = String, Path, description = "Provider id")),
    responses(
        (status = 200, description = "The provider, secrets masked.", body = ProviderView),
        (status = 401, description = "Missing, invalid or expired token."),
        (status = 403, description = "Caller is not an administrator."),
        (status = 404, description = "No such provider."),
    ),
    security(("bearer" = [])),
    tag = "sso-admin"
)]
pub async fn get_one(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match get_provider(&headers, &pool, &auth_state, &id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn get_provider(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    raw_id: &str,
) -> Result<ProviderView, ApiError> {
    let id = provider_id(raw_id)?;
    admin_of(headers, pool, state).await?;

    fetch_view(pool, id).await
}

#[utoipa::path(
    put,
    path = "/sso/{id}",
    params(("id" = String, Path, description = "Provider id")),
    request_body = UpdateProviderRequest,
    responses(
        (status = 200, description = "Provider updated.", body = ProviderView),
        (status = 400, description = "Malformed or invalid settings document."),
        (status = 401, description = "Missing, invalid or expired token."),
        (status = 403, description = "Caller is not an administrator."),
        (status = 404, description = "No such provider."),
    ),
    security(("bearer" = [])),
    tag = "sso-admin"
)]
pub async fn update(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<String>,
    payload: Option<Json<UpdateProviderRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    match update_provider(&headers, &pool, &auth_state, &id, request).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn update_provider(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    raw_id: &str,
    request: UpdateProviderRequest,
) -> Result<ProviderView, ApiError> {
    let id = provider_id(raw_id)?;
    let admin = admin_of(headers, pool, state).await?;

    if request.name.trim().is_empty() {
        return Err(ApiError::validation("Provider name is required"));
    }

    let settings = parsed_settings(&request.settings)?;

    let updated = ProviderRepo::update(
        pool,
        id,
        request.name.trim(),
        &settings,
        request.enabled,
        request.sort_order,
    )
    .await?;

    if !updated {
        return Err(ApiError::NotFound("Provider not found".to_string()));
    }

    info!(admin = %admin, provider_id = %id, "federation provider updated");

    fetch_view(pool, id).await
}

#[utoipa::path(
    delete,
    path = "/sso/{id}",
    params(("id" = String, Path, description = "Provider id")),
    responses(
        (status = 200, description = "Provider deleted.", body = Acknowledgement),
        (status = 401, description = "Missing, invalid or expired token."),
        (status = 403, description = "Caller is not an administrator."),
        (status = 404, description = "No such provider."),
    ),
    security(("bearer" = [])),
    tag = "sso-admin"
)]
pub async fn delete(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match delete_provider(&headers, &pool, &auth_state, &id).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn delete_provider(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    raw_id: &str,
) -> Result<Acknowledgement, ApiError> {
    let id = provider_id(raw_id)?;
    let admin = admin_of(headers, pool, state).await?;

    if !ProviderRepo::delete(pool, id).await? {
        return Err(ApiError::NotFound("Provider not found".to_string()));
    }

    info!(admin = %admin, provider_id = %id, "federation provider deleted");

    Ok(Acknowledgement::new("Provider deleted"))
}

#[utoipa::path(
    patch,
    path = "/sso/{id}/toggle",
    params(("id" = String, Path, description = "Provider id")),
    request_body = ToggleRequest,
    responses(
        (status = 200, description = "Enabled flag set.", body = Acknowledgement),
        (status = 400, description = "Missing or malformed payload."),
        (status = 401, description = "Missing, invalid or expired token."),
        (status = 403, description = "Caller is not an administrator."),
        (status = 404, description = "No such provider."),
    ),
    security(("bearer" = [])),
    tag = "sso-admin"
)]
pub async fn toggle(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<String>,
    payload: Option<Json<ToggleRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    match toggle_provider(&headers, &pool, &auth_state, &id, request.enabled).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn toggle_provider(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    raw_id: &str,
    enabled: bool,
) -> Result<Acknowledgement, ApiError> {
    let id = provider_id(raw_id)?;
    let admin = admin_of(headers, pool, state).await?;

    if !ProviderRepo::set_enabled(pool, id, enabled).await? {
        return Err(ApiError::NotFound("Provider not found".to_string()));
    }

    info!(admin = %admin, provider_id = %id, enabled, "federation provider toggled");

    Ok(Acknowledgement::new(if enabled {
        "Provider enabled"
    } else {
        "Provider disabled"
    }))
}

#[utoipa::path(
    post,
    path = "/sso/{id}/test",
    params(("id" = String, Path, description = "Provider id")),
    responses(
        (status = 200, description = "Probe outcome; reachable is false on transport failure.", body = ProbeReport),
        (status = 401, description = "Missing, invalid or expired token."),
        (status = 403, description = "Caller is not an administrator."),
        (status = 404, description = "No such provider."),
    ),
    security(("bearer" = [])),
    tag = "sso-admin"
)]
pub async fn test(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match probe_provider(&headers, &pool, &auth_state, &id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn probe_provider(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    raw_id: &str,
) -> Result<ProbeReport, ApiError> {
    let id = provider_id(raw_id)?;
    admin_of(headers, pool, state).await?;

    let provider = ProviderRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Provider not found".to_string()))?;

    Ok(state.federation().probe(&provider.settings).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use secrecy::SecretString;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    use crate::api::handlers::auth::AuthConfig;

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
    async fn test_list_without_token_is_unauthorized() {
        let response = list(
            HeaderMap::new(),
            Extension(unreachable_pool()),
            Extension(state()),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(envelope_code(response).await, "MISSING_TOKEN");
    }

    #[tokio::test]
    async fn test_create_without_payload_is_a_validation_error() {
        let response = create(
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
    async fn test_get_one_rejects_a_malformed_id() {
        let response = get_one(
            HeaderMap::new(),
            Extension(unreachable_pool()),
            Extension(state()),
            Path("nope".to_string()),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_provider_key_shape() {
        assert!(valid_provider_key("corp"));
        assert!(valid_provider_key("corp-idp_2"));
        assert!(!valid_provider_key("has space"));
        assert!(!valid_provider_key("slash/key"));
        assert!(!valid_provider_key("-leading"));
        assert!(!valid_provider_key(""));
    }

    #[test]
    fn test_parsed_settings_collects_every_problem() {
        let value = serde_json::json!({
            "protocol": "oauth2",
            "authorizationEndpoint": "not a url",
            "tokenEndpoint": "https://idp.example.com/oauth/token",
            "userinfoEndpoint": "https://idp.example.com/oauth/userinfo",
            "redirectUri": "https://roster.example.com/callback"
        });

        let error = parsed_settings(&value).unwrap_err();

        assert_eq!(error.code(), crate::api::error::code::VALIDATION_ERROR);
    }

    #[test]
    fn test_view_masks_secrets() {
        let settings = ProviderSettings::parse(&serde_json::json!({
            "protocol": "oauth2",
            "authorizationEndpoint": "https://idp.example.com/oauth/authorize",
            "tokenEndpoint": "https://idp.example.com/oauth/token",
            "userinfoEndpoint": "https://idp.example.com/oauth/userinfo",
            "redirectUri": "https://roster.example.com/callback",
            "appId": "app1",
            "appSecret": "topsecret"
        }))
        .unwrap();

        let view = ProviderView::from_record(FederationProvider {
            id: Uuid::new_v4(),
            provider: "corp".to_string(),
            name: "Corporate IdP".to_string(),
            enabled: true,
            settings,
            sort_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });

        assert_eq!(view.settings["appSecret"], "***");
        assert_eq!(view.settings["appId"], "app1");
    }
}
