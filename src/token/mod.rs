//! Stateless HS256 session tokens.
//!
//! Access tokens carry `sub`, `username`, `iat` and `exp`; refresh tokens add
//! a `type: "refresh"` discriminator so the two are never interchangeable.
//! Refreshing issues a new access token only; refresh tokens stay valid until
//! their own expiry.

use chrono::{TimeDelta, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

const REFRESH_TYPE: &str = "refresh";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Claims {
    #[must_use]
    pub fn is_refresh(&self) -> bool {
        self.token_type.as_deref() == Some(REFRESH_TYPE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Authorization token is missing")]
    Missing,
    #[error("Token is invalid")]
    Invalid,
    #[error("Token has expired")]
    Expired,
    #[error("Refresh token is invalid")]
    InvalidRefresh,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

/// Issues and verifies the two token flavors from one shared secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: TimeDelta,
    refresh_ttl: TimeDelta,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &SecretString, access_ttl_seconds: i64, refresh_ttl_seconds: i64) -> Self {
        let bytes = secret.expose_secret().as_bytes();

        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            access_ttl: TimeDelta::seconds(access_ttl_seconds),
            refresh_ttl: TimeDelta::seconds(refresh_ttl_seconds),
        }
    }

    fn issue(
        &self,
        account_id: Uuid,
        username: &str,
        ttl: TimeDelta,
        token_type: Option<String>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();

        let claims = Claims {
            sub: account_id,
            username: username.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            token_type,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn issue_access(
        &self,
        account_id: Uuid,
        username: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue(account_id, username, self.access_ttl, None)
    }

    pub fn issue_refresh(
        &self,
        account_id: Uuid,
        username: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue(
            account_id,
            username,
            self.refresh_ttl,
            Some(REFRESH_TYPE.to_string()),
        )
    }

    pub fn issue_pair(
        &self,
        account_id: Uuid,
        username: &str,
    ) -> Result<TokenPair, jsonwebtoken::errors::Error> {
        Ok(TokenPair {
            token: self.issue_access(account_id, username)?,
            refresh_token: self.issue_refresh(account_id, username)?,
        })
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|error| match error.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Verify an access token. Refresh tokens are rejected here.
    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode_claims(token)?;

        if claims.is_refresh() {
            return Err(TokenError::Invalid);
        }

        Ok(claims)
    }

    /// Verify a refresh token. Anything without the refresh discriminator is
    /// rejected as an invalid refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode_claims(token).map_err(|error| match error {
            TokenError::Expired => TokenError::Expired,
            _ => TokenError::InvalidRefresh,
        })?;

        if !claims.is_refresh() {
            return Err(TokenError::InvalidRefresh);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(
            &SecretString::from("0123456789abcdef0123456789abcdef"),
            DEFAULT_ACCESS_TTL_SECONDS,
            DEFAULT_REFRESH_TTL_SECONDS,
        )
    }

    fn tamper(token: &str) -> String {
        let mut tampered: String = token[..token.len() - 1].to_string();
        let last = token.chars().last().unwrap();

        tampered.push(if last == 'A' { 'B' } else { 'A' });
        tampered
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = service();
        let account_id = Uuid::new_v4();

        let token = service.issue_access(account_id, "jsmith").unwrap();
        let claims = service.verify_access(&token).unwrap();

        assert_eq!(claims.sub, account_id);
        assert_eq!(claims.username, "jsmith");
        assert!(claims.token_type.is_none());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_refresh_token_carries_discriminator() {
        let service = service();

        let token = service.issue_refresh(Uuid::new_v4(), "jsmith").unwrap();
        let claims = service.verify_refresh(&token).unwrap();

        assert!(claims.is_refresh());
    }

    #[test]
    fn test_pair_lifetimes_differ() {
        let service = service();

        let pair = service.issue_pair(Uuid::new_v4(), "jsmith").unwrap();
        let access = service.verify_access(&pair.token).unwrap();
        let refresh = service.verify_refresh(&pair.refresh_token).unwrap();

        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let service = service();

        let token = service.issue_refresh(Uuid::new_v4(), "jsmith").unwrap();

        assert_eq!(service.verify_access(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_access_token_rejected_as_refresh() {
        let service = service();

        let token = service.issue_access(Uuid::new_v4(), "jsmith").unwrap();

        assert_eq!(
            service.verify_refresh(&token),
            Err(TokenError::InvalidRefresh)
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = TokenService::new(
            &SecretString::from("0123456789abcdef0123456789abcdef"),
            -60,
            -60,
        );

        let access = service.issue_access(Uuid::new_v4(), "jsmith").unwrap();
        let refresh = service.issue_refresh(Uuid::new_v4(), "jsmith").unwrap();

        assert_eq!(service.verify_access(&access), Err(TokenError::Expired));
        assert_eq!(service.verify_refresh(&refresh), Err(TokenError::Expired));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let service = service();

        let token = service.issue_access(Uuid::new_v4(), "jsmith").unwrap();

        assert_eq!(
            service.verify_access(&tamper(&token)),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let service = service();
        let other = TokenService::new(
            &SecretString::from("ffffffffffffffffffffffffffffffff"),
            DEFAULT_ACCESS_TTL_SECONDS,
            DEFAULT_REFRESH_TTL_SECONDS,
        );

        let token = other.issue_access(Uuid::new_v4(), "jsmith").unwrap();

        assert_eq!(service.verify_access(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let service = service();

        assert_eq!(
            service.verify_access("not.a.token"),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            service.verify_refresh(""),
            Err(TokenError::InvalidRefresh)
        );
    }
}
