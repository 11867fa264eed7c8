//! Admission control for sync callbacks: freshness, app resolution,
//! signature, strictly in that order.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;

use crate::store::providers::{FederationProvider, ProviderRepo};
use crate::sync::signature::{is_fresh, verify_signature};
use crate::sync::SyncCallbackRequest;

/// Batch-level rejections. Each maps to a stable 401 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Timestamp outside the accepted window")]
    InvalidTimestamp,
    #[error("Unknown app id")]
    UnknownApp,
    #[error("Signature mismatch")]
    InvalidSignature,
}

/// Outcome of the ordered trust checks.
#[derive(Debug)]
pub enum GatewayCheck {
    Trusted(FederationProvider),
    Rejected(SyncError),
}

/// Run the three admission checks. The timestamp is checked before any
/// database work, so a stale request is rejected without touching storage.
pub async fn authorize_callback(
    pool: &PgPool,
    request: &SyncCallbackRequest,
    now: DateTime<Utc>,
) -> Result<GatewayCheck> {
    if !is_fresh(request.timestamp, now) {
        warn!(app_id = %request.app_id, timestamp = request.timestamp, "stale sync callback");

        return Ok(GatewayCheck::Rejected(SyncError::InvalidTimestamp));
    }

    let Some(provider) = ProviderRepo::find_by_app_id(pool, &request.app_id).await? else {
        warn!(app_id = %request.app_id, "sync callback from unknown app");

        return Ok(GatewayCheck::Rejected(SyncError::UnknownApp));
    };

    let Some(credentials) = provider.settings.credentials() else {
        warn!(provider = %provider.provider, "provider has no usable credential pair");

        return Ok(GatewayCheck::Rejected(SyncError::UnknownApp));
    };

    if !verify_signature(
        credentials.id,
        credentials.secret,
        request.timestamp,
        &request.signature,
    ) {
        warn!(app_id = %request.app_id, "sync callback signature mismatch");

        return Ok(GatewayCheck::Rejected(SyncError::InvalidSignature));
    }

    Ok(GatewayCheck::Trusted(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sync_logs::SyncType;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    fn unreachable_pool() -> PgPool {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("postgres")
            .database("postgres");

        PgPoolOptions::new().connect_lazy_with(options)
    }

    fn request(timestamp: i64) -> SyncCallbackRequest {
        SyncCallbackRequest {
            app_id: "app1".to_string(),
            timestamp,
            signature: "8a2da09f9fb54ad131f48589fbd9f5f1".to_string(),
            sync_type: SyncType::User,
            data: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_stale_timestamp_rejected_before_database_access() {
        let now = Utc::now();
        let stale = now.timestamp_millis() - (6 * 60 * 1000);

        // The pool is unreachable: only the check order keeps this Ok.
        let check = authorize_callback(&unreachable_pool(), &request(stale), now)
            .await
            .unwrap();

        assert!(matches!(
            check,
            GatewayCheck::Rejected(SyncError::InvalidTimestamp)
        ));
    }

    #[tokio::test]
    async fn test_fresh_timestamp_proceeds_to_app_resolution() {
        let now = Utc::now();

        let result =
            authorize_callback(&unreachable_pool(), &request(now.timestamp_millis()), now).await;

        assert!(result.is_err());
    }

    #[test]
    fn test_rejection_codes_are_distinct() {
        assert_ne!(SyncError::InvalidTimestamp, SyncError::UnknownApp);
        assert_ne!(SyncError::UnknownApp, SyncError::InvalidSignature);
    }
}
