//! Uniform JSON failure envelope shared by every handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::federation::FederationError;
use crate::sync::gateway::SyncError;
use crate::token::TokenError;

/// Stable machine-readable codes. Clients match on `code`, never on the
/// message text; codes never change, messages may be reworded.
pub mod code {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const CONFLICT: &str = "CONFLICT";
    pub const UPSTREAM_FAILURE: &str = "UPSTREAM_FAILURE";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const MISSING_TOKEN: &str = "MISSING_TOKEN";
    pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
    pub const EXPIRED_TOKEN: &str = "EXPIRED_TOKEN";
    pub const INVALID_REFRESH_TOKEN: &str = "INVALID_REFRESH_TOKEN";
    pub const INVALID_TIMESTAMP: &str = "INVALID_TIMESTAMP";
    pub const INVALID_APP_ID: &str = "INVALID_APP_ID";
    pub const INVALID_SIGNATURE: &str = "INVALID_SIGNATURE";
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<String>,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Upstream(String),

    #[error("Authorization token is missing")]
    MissingToken,

    #[error("Token is invalid")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Refresh token is invalid")]
    InvalidRefreshToken,

    #[error("Timestamp outside the accepted window")]
    InvalidTimestamp,

    #[error("Unknown app id")]
    InvalidAppId,

    #[error("Signature mismatch")]
    InvalidSignature,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn validation_with(message: impl Into<String>, details: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    /// Stable code for the envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => code::UNAUTHORIZED,
            Self::Forbidden(_) => code::FORBIDDEN,
            Self::NotFound(_) => code::NOT_FOUND,
            Self::Validation { .. } => code::VALIDATION_ERROR,
            Self::Conflict(_) => code::CONFLICT,
            Self::Upstream(_) => code::UPSTREAM_FAILURE,
            Self::MissingToken => code::MISSING_TOKEN,
            Self::InvalidToken => code::INVALID_TOKEN,
            Self::ExpiredToken => code::EXPIRED_TOKEN,
            Self::InvalidRefreshToken => code::INVALID_REFRESH_TOKEN,
            Self::InvalidTimestamp => code::INVALID_TIMESTAMP,
            Self::InvalidAppId => code::INVALID_APP_ID,
            Self::InvalidSignature => code::INVALID_SIGNATURE,
            Self::Internal(_) => code::INTERNAL_ERROR,
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_)
            | Self::MissingToken
            | Self::InvalidToken
            | Self::ExpiredToken
            | Self::InvalidRefreshToken
            | Self::InvalidTimestamp
            | Self::InvalidAppId
            | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire shape of every failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref cause) = self {
            error!("Unhandled error: {cause:#}");
        }

        let details = match &self {
            Self::Validation { details, .. } if !details.is_empty() => Some(details.clone()),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            code: self.code(),
            message: self.to_string(),
            details,
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::Missing => Self::MissingToken,
            TokenError::Invalid => Self::InvalidToken,
            TokenError::Expired => Self::ExpiredToken,
            TokenError::InvalidRefresh => Self::InvalidRefreshToken,
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::InvalidTimestamp => Self::InvalidTimestamp,
            SyncError::UnknownApp => Self::InvalidAppId,
            SyncError::InvalidSignature => Self::InvalidSignature,
        }
    }
}

impl From<FederationError> for ApiError {
    fn from(error: FederationError) -> Self {
        match error {
            // Upstream detail stays in the logs.
            FederationError::TokenExchange(detail) => {
                warn!("Token exchange failed: {detail}");
                Self::Upstream("Identity provider rejected the code exchange".to_string())
            }
            FederationError::ProfileFetch(detail) => {
                warn!("Profile fetch failed: {detail}");
                Self::Upstream("Identity provider did not return a user profile".to_string())
            }
            FederationError::UnmappableIdentity => {
                Self::Upstream("Identity provider response carries no usable identity".to_string())
            }
            FederationError::Misconfigured(detail) => Self::validation(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use axum::body::to_bytes;

    async fn body_json(error: ApiError) -> serde_json::Value {
        let response = error.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            ApiError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Upstream("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Internal(anyhow!("x")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_every_token_and_sync_code_is_401() {
        let errors = [
            ApiError::MissingToken,
            ApiError::InvalidToken,
            ApiError::ExpiredToken,
            ApiError::InvalidRefreshToken,
            ApiError::InvalidTimestamp,
            ApiError::InvalidAppId,
            ApiError::InvalidSignature,
        ];

        for error in errors {
            assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_token_error_conversion_keeps_distinct_codes() {
        assert_eq!(
            ApiError::from(TokenError::Missing).code(),
            code::MISSING_TOKEN
        );
        assert_eq!(
            ApiError::from(TokenError::Invalid).code(),
            code::INVALID_TOKEN
        );
        assert_eq!(
            ApiError::from(TokenError::Expired).code(),
            code::EXPIRED_TOKEN
        );
        assert_eq!(
            ApiError::from(TokenError::InvalidRefresh).code(),
            code::INVALID_REFRESH_TOKEN
        );
    }

    #[test]
    fn test_sync_error_conversion_keeps_distinct_codes() {
        assert_eq!(
            ApiError::from(SyncError::InvalidTimestamp).code(),
            code::INVALID_TIMESTAMP
        );
        assert_eq!(
            ApiError::from(SyncError::UnknownApp).code(),
            code::INVALID_APP_ID
        );
        assert_eq!(
            ApiError::from(SyncError::InvalidSignature).code(),
            code::INVALID_SIGNATURE
        );
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let body = body_json(ApiError::NotFound("account not found".into())).await;

        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["message"], "account not found");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_validation_details_are_included_when_present() {
        let body = body_json(ApiError::validation_with(
            "Password does not meet the policy".to_string(),
            vec!["Password must contain an uppercase letter".to_string()],
        ))
        .await;

        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(
            body["details"][0],
            "Password must contain an uppercase letter"
        );
    }

    #[tokio::test]
    async fn test_internal_error_never_leaks_the_cause() {
        let body = body_json(ApiError::Internal(anyhow!("db password is hunter2"))).await;

        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_federation_errors_map_to_upstream_failure() {
        let body = body_json(ApiError::from(FederationError::TokenExchange(
            "401 from idp".to_string(),
        )))
        .await;

        assert_eq!(body["code"], "UPSTREAM_FAILURE");
        assert!(!body["message"].as_str().unwrap().contains("401 from idp"));
    }
}
