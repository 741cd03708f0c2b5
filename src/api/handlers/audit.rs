//! Audit trail listing for the authenticated user.

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use utoipa::ToSchema;

use super::principal::require_auth;
use crate::identity::audit::AuditLogRepo;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuditQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Optional action filter, e.g. `user_blocked`.
    pub action: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub id: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub created_at: String,
}

#[utoipa::path(
    get,
    path = "/v1/me/audit-logs",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, clamped to 1..=100"),
        ("offset" = Option<i64>, Query, description = "Page offset"),
        ("action" = Option<String>, Query, description = "Filter by action name"),
    ),
    responses(
        (status = 200, description = "Audit entries, newest first.", body = [AuditLogResponse]),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "audit"
)]
pub async fn list_audit_logs(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(query): Query<AuditQuery>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    match AuditLogRepo::list_for_user(
        &pool,
        principal.user_id,
        query.action.as_deref(),
        limit,
        offset,
    )
    .await
    {
        Ok(entries) => {
            let entries: Vec<AuditLogResponse> = entries
                .into_iter()
                .map(|entry| AuditLogResponse {
                    id: entry.id.to_string(),
                    action: entry.action,
                    entity_type: entry.entity_type,
                    entity_id: entry.entity_id,
                    ip_address: entry.ip_address,
                    user_agent: entry.user_agent,
                    metadata: entry.metadata,
                    reason: entry.reason,
                    created_at: entry.created_at.to_rfc3339(),
                })
                .collect();
            (StatusCode::OK, Json(entries)).into_response()
        }
        Err(err) => {
            error!("Failed to list audit logs: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
