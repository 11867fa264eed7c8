//! The trusted directory sync gateway and its audit log.

use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::api::error::ApiError;
use crate::api::handlers::auth::principal::{require_admin, require_auth};
use crate::api::handlers::auth::AuthState;
use crate::store::sync_logs::{NewSyncLog, SyncLog, SyncLogRepo, SyncOutcome, SyncType};
use crate::sync::apply::{apply_org_batch, apply_user_batch, BatchReport};
use crate::sync::gateway::{authorize_callback, GatewayCheck};
use crate::sync::SyncCallbackRequest;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// Callback acknowledgement: per-batch counts plus any item errors.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SyncAck {
    pub success: bool,
    pub message: String,
    pub data: SyncStats,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SyncStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl SyncAck {
    fn from_report(sync_type: SyncType, report: &BatchReport) -> Self {
        let message = if report.failed == 0 {
            format!("Processed {} {} records", report.total, sync_type.as_str())
        } else {
            format!(
                "Processed {} {} records, {} failed",
                report.total,
                sync_type.as_str(),
                report.failed
            )
        };

        Self {
            success: true,
            message,
            data: SyncStats {
                total: report.total,
                success: report.succeeded,
                failed: report.failed,
                errors: if report.errors.is_empty() {
                    None
                } else {
                    Some(report.errors.clone())
                },
            },
        }
    }
}

#[utoipa::path(
    post,
    path = "/sync/callback",
    request_body = SyncCallbackRequest,
    responses(
        (status = 200, description = "Batch applied; counts and item errors in the body.", body = SyncAck),
        (status = 400, description = "Missing or malformed payload."),
        (status = 401, description = "Stale timestamp, unknown app id, or signature mismatch."),
    ),
    tag = "sync"
)]
pub async fn callback(
    pool: Extension<PgPool>,
    payload: Option<Json<SyncCallbackRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    match process_callback(&pool, request).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn process_callback(
    pool: &PgPool,
    request: SyncCallbackRequest,
) -> Result<SyncAck, ApiError> {
    let started = Utc::now();

    let provider = match authorize_callback(pool, &request, started).await? {
        GatewayCheck::Trusted(provider) => provider,
        GatewayCheck::Rejected(rejection) => return Err(rejection.into()),
    };

    let report = match request.sync_type {
        SyncType::User => apply_user_batch(pool, &request.data).await,
        SyncType::Organization => apply_org_batch(pool, &request.data).await,
    };

    let finished = Utc::now();

    // The audit row is written even for an all-failed batch; only a broken
    // audit store turns the callback into an error.
    let log = NewSyncLog {
        sync_type: request.sync_type,
        adapter: &provider.provider,
        outcome: report.outcome(),
        total: report.total as i32,
        succeeded: report.succeeded as i32,
        failed: report.failed as i32,
        errors: report.joined_errors(),
        metadata: None,
        started_at: started,
        finished_at: finished,
    };
    SyncLogRepo::append(pool, &log).await?;

    info!(
        adapter = %provider.provider,
        sync_type = request.sync_type.as_str(),
        total = report.total,
        failed = report.failed,
        "sync batch applied"
    );

    Ok(SyncAck::from_report(request.sync_type, &report))
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogView {
    pub id: String,
    #[serde(rename = "type")]
    pub sync_type: SyncType,
    pub adapter: String,
    pub outcome: SyncOutcome,
    pub total: i32,
    pub succeeded: i32,
    pub failed: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<String>,
    #[schema(value_type = String)]
    pub started_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub finished_at: DateTime<Utc>,
}

impl SyncLogView {
    fn from_record(log: SyncLog) -> Self {
        Self {
            id: log.id.to_string(),
            sync_type: log.sync_type,
            adapter: log.adapter,
            outcome: log.outcome,
            total: log.total,
            succeeded: log.succeeded,
            failed: log.failed,
            errors: log.errors,
            started_at: log.started_at,
            finished_at: log.finished_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogPage {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub items: Vec<SyncLogView>,
}

#[derive(IntoParams, Debug, Deserialize, Default)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    /// 1-based page number.
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    /// Narrow to one sync type (`USER` or `ORG`).
    #[serde(rename = "type")]
    pub sync_type: Option<SyncType>,
}

#[utoipa::path(
    get,
    path = "/sync/admin/logs",
    params(LogQuery),
    responses(
        (status = 200, description = "Newest-first page of sync audit entries.", body = SyncLogPage),
        (status = 400, description = "Malformed query parameters."),
        (status = 401, description = "Missing, invalid or expired token."),
        (status = 403, description = "Caller is not an administrator."),
    ),
    security(("bearer" = [])),
    tag = "sync"
)]
pub async fn admin_logs(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> impl IntoResponse {
    let Ok(Query(query)) = query else {
        return ApiError::validation("Malformed query parameters").into_response();
    };

    match list_logs(&headers, &pool, &auth_state, query).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn list_logs(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    query: LogQuery,
) -> Result<SyncLogPage, ApiError> {
    let principal = require_auth(headers, pool, state).await?;
    require_admin(&principal)?;

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1) * page_size;

    let items = SyncLogRepo::list(pool, query.sync_type, page_size, offset).await?;
    let total = SyncLogRepo::count(pool, query.sync_type).await?;

    Ok(SyncLogPage {
        total,
        page,
        page_size,
        items: items.into_iter().map(SyncLogView::from_record).collect(),
    })
}
