//! Session listing and revocation for the authenticated user.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use sqlx::PgPool;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::principal::{extract_client_ip, extract_user_agent, require_auth, Principal};
use crate::identity::audit::{actions, AuditLogRepo, NewAuditLog};
use crate::identity::sessions::SessionRepo;

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: String,
    /// Whether this row backs the request being served.
    pub current: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevokedResponse {
    pub revoked: u64,
}

#[utoipa::path(
    get,
    path = "/v1/me/sessions",
    responses(
        (status = 200, description = "Active and expired sessions, newest first.", body = [SessionSummary]),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "sessions"
)]
pub async fn list_sessions(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match SessionRepo::list_for_user(&pool, principal.user_id).await {
        Ok(sessions) => {
            let summaries: Vec<SessionSummary> = sessions
                .iter()
                .map(|session| SessionSummary {
                    id: session.id.to_string(),
                    current: session.id == principal.session_id,
                    ip_address: session.ip_address.clone(),
                    user_agent: session.user_agent.clone(),
                    created_at: session.created_at.to_rfc3339(),
                    expires_at: session.expires_at.to_rfc3339(),
                })
                .collect();
            (StatusCode::OK, Json(summaries)).into_response()
        }
        Err(err) => {
            error!("Failed to list sessions: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session revoked."),
        (status = 404, description = "No such session for this user."),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "sessions"
)]
pub async fn revoke_session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match SessionRepo::revoke(&pool, principal.user_id, id).await {
        Ok(true) => {
            audit(&pool, &headers, &principal, actions::SESSION_REVOKED, Some(id)).await;
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to revoke session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me/sessions",
    responses(
        (status = 200, description = "All sessions except the current one revoked.", body = RevokedResponse),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "sessions"
)]
pub async fn revoke_other_sessions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match SessionRepo::revoke_all_except(&pool, principal.user_id, principal.session_id).await {
        Ok(revoked) => {
            audit(
                &pool,
                &headers,
                &principal,
                actions::ALL_SESSIONS_REVOKED,
                None,
            )
            .await;
            (StatusCode::OK, Json(RevokedResponse { revoked })).into_response()
        }
        Err(err) => {
            error!("Failed to revoke sessions: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn audit(
    pool: &PgPool,
    headers: &HeaderMap,
    principal: &Principal,
    action: &str,
    session_id: Option<Uuid>,
) {
    let ip = extract_client_ip(headers);
    let user_agent = extract_user_agent(headers);
    let entry = NewAuditLog {
        action,
        entity_type: Some("session"),
        entity_id: session_id.map(|id| id.to_string()),
        ip_address: ip.as_deref(),
        user_agent: user_agent.as_deref(),
        metadata: None,
        reason: None,
    };
    if let Err(err) = AuditLogRepo::log(pool, principal.user_id, entry).await {
        error!("Failed to write audit log for {action}: {err}");
    }
}
