//! Trusted directory sync gateway.
//!
//! The HR system pushes signed user and organization batches. A batch is
//! admitted only after three ordered checks: timestamp freshness, app
//! resolution, and signature verification. Items are then applied one by
//! one; a bad record is reported but never aborts the rest of the batch.

pub mod apply;
pub mod gateway;
pub mod signature;

pub use crate::store::sync_logs::{SyncOutcome, SyncType};

use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

/// Signed batch pushed by the directory peer.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncCallbackRequest {
    pub app_id: String,
    /// Epoch milliseconds at the sender.
    pub timestamp: i64,
    pub signature: String,
    #[serde(rename = "type")]
    pub sync_type: SyncType,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Value>,
}

/// Lifecycle marker carried by delta items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeltaStatus {
    Active,
    Inactive,
    Deleted,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDelta {
    pub external_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<DeltaStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgDelta {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub parent_external_id: Option<String>,
    /// Hierarchy depth as known upstream, used only to order a batch so
    /// parents are applied before children.
    #[serde(default)]
    pub level: Option<i32>,
    #[serde(default)]
    pub status: Option<DeltaStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_callback_request_deserializes_wire_shape() {
        let request: SyncCallbackRequest = serde_json::from_value(json!({
            "appId": "app1",
            "timestamp": 1_700_000_000_000_i64,
            "signature": "8a2da09f9fb54ad131f48589fbd9f5f1",
            "type": "USER",
            "data": [{"externalId": "u-1"}]
        }))
        .unwrap();

        assert_eq!(request.app_id, "app1");
        assert_eq!(request.sync_type, SyncType::User);
        assert_eq!(request.data.len(), 1);
    }

    #[test]
    fn test_callback_request_rejects_unknown_type() {
        let result = serde_json::from_value::<SyncCallbackRequest>(json!({
            "appId": "app1",
            "timestamp": 0,
            "signature": "x",
            "type": "DEPARTMENT",
            "data": []
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_user_delta_requires_external_id_only() {
        let delta: UserDelta = serde_json::from_value(json!({"externalId": "u-9"})).unwrap();

        assert_eq!(delta.external_id, "u-9");
        assert!(delta.username.is_none());
        assert!(delta.status.is_none());

        assert!(serde_json::from_value::<UserDelta>(json!({"username": "x"})).is_err());
    }

    #[test]
    fn test_org_delta_parses_status_and_level() {
        let delta: OrgDelta = serde_json::from_value(json!({
            "externalId": "dept-2",
            "name": "Operations",
            "parentExternalId": "dept-1",
            "level": 2,
            "status": "INACTIVE"
        }))
        .unwrap();

        assert_eq!(delta.level, Some(2));
        assert_eq!(delta.status, Some(DeltaStatus::Inactive));
    }
}
