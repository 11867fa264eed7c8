//! Bearer-token principal extraction and authorization gates.
//!
//! Roles and permissions are read from the database on every request, so
//! grant changes apply without re-login.

use axum::http::{header, HeaderMap};
use sqlx::PgPool;
use uuid::Uuid;

use super::state::AuthState;
use crate::api::error::ApiError;
use crate::rbac::Principal;
use crate::store::accounts::{AccountRepo, AccountStatus};
use crate::token::TokenError;

/// Pull the token out of `Authorization: Bearer <token>`.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, TokenError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(TokenError::Missing)?;

    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(TokenError::Missing)
}

/// Resolve the bearer token into a principal, or fail with the matching
/// 401/403. A token whose account has gone away reads as invalid.
pub async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Principal, ApiError> {
    let token = extract_bearer_token(headers)?;
    let claims = state.tokens().verify_access(token)?;

    let Some(account) = AccountRepo::find_by_id(pool, claims.sub).await? else {
        return Err(ApiError::InvalidToken);
    };

    match account.status {
        AccountStatus::Active => {}
        AccountStatus::Inactive => {
            return Err(ApiError::Forbidden("Account is disabled".to_string()))
        }
        AccountStatus::Deleted => return Err(ApiError::InvalidToken),
    }

    let roles = AccountRepo::roles(pool, account.id).await?;
    let permissions = AccountRepo::permissions(pool, account.id).await?;

    Ok(Principal {
        account_id: account.id,
        username: account.username,
        roles,
        permissions,
    })
}

pub fn require_admin(principal: &Principal) -> Result<(), ApiError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Administrator role required".to_string(),
        ))
    }
}

pub fn require_permissions(principal: &Principal, required: &[&str]) -> Result<(), ApiError> {
    if principal.has_all_permissions(required) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Missing required permission: {}",
            required.join(", ")
        )))
    }
}

pub fn require_self_or_admin(principal: &Principal, target: Uuid) -> Result<(), ApiError> {
    if principal.may_act_on(target) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Not allowed to act on another account".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use secrecy::SecretString;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    use super::super::state::AuthConfig;
    use crate::api::error::code;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn state() -> AuthState {
        AuthState::new(AuthConfig::new(SecretString::from(
            "test-jwt-secret".to_string(),
        )))
        .unwrap()
    }

    fn unreachable_pool() -> PgPool {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("postgres")
            .database("postgres");

        PgPoolOptions::new().connect_lazy_with(options)
    }

    fn principal(roles: &[&str]) -> Principal {
        Principal {
            account_id: Uuid::new_v4(),
            username: "jsmith".to_string(),
            roles: roles.iter().map(ToString::to_string).collect(),
            permissions: vec!["user:read".to_string()],
        }
    }

    #[test]
    fn test_bearer_extraction_accepts_both_spellings() {
        assert_eq!(
            extract_bearer_token(&headers_with("Bearer a.b.c")).unwrap(),
            "a.b.c"
        );
        assert_eq!(
            extract_bearer_token(&headers_with("bearer a.b.c")).unwrap(),
            "a.b.c"
        );
    }

    #[test]
    fn test_bearer_extraction_rejects_missing_or_malformed() {
        assert_eq!(
            extract_bearer_token(&HeaderMap::new()),
            Err(TokenError::Missing)
        );
        assert_eq!(
            extract_bearer_token(&headers_with("Basic dXNlcjpwYXNz")),
            Err(TokenError::Missing)
        );
        assert_eq!(
            extract_bearer_token(&headers_with("Bearer ")),
            Err(TokenError::Missing)
        );
    }

    #[tokio::test]
    async fn test_require_auth_without_header_is_missing_token() {
        let error = require_auth(&HeaderMap::new(), &unreachable_pool(), &state())
            .await
            .unwrap_err();

        assert_eq!(error.code(), code::MISSING_TOKEN);
    }

    #[tokio::test]
    async fn test_require_auth_with_garbage_token_is_invalid() {
        let error = require_auth(
            &headers_with("Bearer not-a-jwt"),
            &unreachable_pool(),
            &state(),
        )
        .await
        .unwrap_err();

        assert_eq!(error.code(), code::INVALID_TOKEN);
    }

    #[tokio::test]
    async fn test_require_auth_with_refresh_token_is_invalid() {
        let state = state();
        let refresh = state
            .tokens()
            .issue_refresh(Uuid::new_v4(), "jsmith")
            .unwrap();

        let error = require_auth(
            &headers_with(&format!("Bearer {refresh}")),
            &unreachable_pool(),
            &state,
        )
        .await
        .unwrap_err();

        assert_eq!(error.code(), code::INVALID_TOKEN);
    }

    #[test]
    fn test_admin_gate() {
        assert!(require_admin(&principal(&["admin"])).is_ok());
        assert!(require_admin(&principal(&["user"])).is_err());
    }

    #[test]
    fn test_permission_gate_requires_all() {
        let caller = principal(&["user"]);

        assert!(require_permissions(&caller, &["user:read"]).is_ok());
        assert!(require_permissions(&caller, &["user:read", "user:delete"]).is_err());
    }

    #[test]
    fn test_self_or_admin_gate() {
        let caller = principal(&["user"]);

        assert!(require_self_or_admin(&caller, caller.account_id).is_ok());
        assert!(require_self_or_admin(&caller, Uuid::new_v4()).is_err());
        assert!(require_self_or_admin(&principal(&["admin"]), Uuid::new_v4()).is_ok());
    }
}
