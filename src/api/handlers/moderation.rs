//! Block and mute endpoints.
//!
//! Thin adapters over the [`RelationshipManager`]: handlers authenticate,
//! validate the target, call the manager facade, and write best-effort audit
//! entries. PUT is used for creation because the manager is idempotent:
//! repeating the call returns the existing relationship unchanged.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::principal::{extract_client_ip, extract_user_agent, require_auth, Principal};
use crate::identity::audit::{actions, AuditLogRepo, NewAuditLog};
use crate::identity::users::UserRepo;
use crate::moderation::{
    ModerationError, MuteDuration, Page, Relationship, RelationshipManager,
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MuteRequest {
    /// Defaults to a permanent mute when omitted.
    pub duration: Option<MuteDuration>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RelationshipResponse {
    pub target_user_id: String,
    pub duration: Option<MuteDuration>,
    pub expires_at: Option<String>,
    pub created_at: String,
}

impl RelationshipResponse {
    fn from_relationship(relationship: &Relationship) -> Self {
        Self {
            target_user_id: relationship.target_user_id.to_string(),
            duration: relationship.duration,
            expires_at: relationship.expires_at.map(|at| at.to_rfc3339()),
            created_at: relationship.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RelationshipStatusResponse {
    pub active: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    fn page(&self) -> Page {
        Page::new(self.limit.unwrap_or(50), self.offset.unwrap_or(0))
    }
}

/// Public shape of a listed user.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub name: String,
    pub image: Option<String>,
    pub is_verified: bool,
}

#[utoipa::path(
    put,
    path = "/v1/me/blocks/{user_id}",
    params(("user_id" = String, Path, description = "User to block")),
    responses(
        (status = 200, description = "Block active (created or pre-existing).", body = RelationshipResponse),
        (status = 401, description = "Missing or invalid session."),
        (status = 404, description = "Target user does not exist."),
    ),
    tag = "moderation"
)]
pub async fn block_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    manager: Extension<Arc<RelationshipManager>>,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_target_exists(&pool, user_id).await {
        return status.into_response();
    }

    match manager.create_block(principal.user_id, user_id).await {
        Ok(relationship) => {
            audit(
                &pool,
                &headers,
                &principal,
                actions::USER_BLOCKED,
                user_id,
            )
            .await;
            (
                StatusCode::OK,
                Json(RelationshipResponse::from_relationship(&relationship)),
            )
                .into_response()
        }
        Err(err) => moderation_error_response(&err),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me/blocks/{user_id}",
    params(("user_id" = String, Path, description = "User to unblock")),
    responses(
        (status = 204, description = "Block removed."),
        (status = 404, description = "No block existed."),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "moderation"
)]
pub async fn unblock_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    manager: Extension<Arc<RelationshipManager>>,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match manager.remove_block(principal.user_id, user_id).await {
        Ok(true) => {
            audit(
                &pool,
                &headers,
                &principal,
                actions::USER_UNBLOCKED,
                user_id,
            )
            .await;
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => moderation_error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/me/blocks/{user_id}",
    params(("user_id" = String, Path, description = "User to check")),
    responses(
        (status = 200, description = "Whether an active block exists.", body = RelationshipStatusResponse),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "moderation"
)]
pub async fn block_status(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    manager: Extension<Arc<RelationshipManager>>,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match manager.is_blocked(principal.user_id, user_id).await {
        Ok(active) => (StatusCode::OK, Json(RelationshipStatusResponse { active })).into_response(),
        Err(err) => moderation_error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/me/blocks",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, clamped to 1..=100"),
        ("offset" = Option<i64>, Query, description = "Page offset"),
    ),
    responses(
        (status = 200, description = "Blocked users, most recent first.", body = [UserSummary]),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "moderation"
)]
pub async fn list_blocked(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    manager: Extension<Arc<RelationshipManager>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let targets = match manager.list_blocked(principal.user_id, query.page()).await {
        Ok(targets) => targets,
        Err(err) => return moderation_error_response(&err),
    };

    user_summaries_response(&pool, &targets).await
}

#[utoipa::path(
    put,
    path = "/v1/me/mutes/{user_id}",
    params(("user_id" = String, Path, description = "User to mute")),
    request_body = MuteRequest,
    responses(
        (status = 200, description = "Mute present (created or pre-existing).", body = RelationshipResponse),
        (status = 401, description = "Missing or invalid session."),
        (status = 404, description = "Target user does not exist."),
    ),
    tag = "moderation"
)]
pub async fn mute_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    manager: Extension<Arc<RelationshipManager>>,
    Path(user_id): Path<Uuid>,
    payload: Option<Json<MuteRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = ensure_target_exists(&pool, user_id).await {
        return status.into_response();
    }

    let duration = payload
        .and_then(|Json(request)| request.duration)
        .unwrap_or(MuteDuration::Permanent);

    match manager
        .create_mute(principal.user_id, user_id, duration)
        .await
    {
        Ok(relationship) => {
            audit(&pool, &headers, &principal, actions::USER_MUTED, user_id).await;
            (
                StatusCode::OK,
                Json(RelationshipResponse::from_relationship(&relationship)),
            )
                .into_response()
        }
        Err(err) => moderation_error_response(&err),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me/mutes/{user_id}",
    params(("user_id" = String, Path, description = "User to unmute")),
    responses(
        (status = 204, description = "Mute removed."),
        (status = 404, description = "No mute existed."),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "moderation"
)]
pub async fn unmute_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    manager: Extension<Arc<RelationshipManager>>,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match manager.remove_mute(principal.user_id, user_id).await {
        Ok(true) => {
            audit(&pool, &headers, &principal, actions::USER_UNMUTED, user_id).await;
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => moderation_error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/me/mutes/{user_id}",
    params(("user_id" = String, Path, description = "User to check")),
    responses(
        (status = 200, description = "Whether an active (non-expired) mute exists.", body = RelationshipStatusResponse),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "moderation"
)]
pub async fn mute_status(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    manager: Extension<Arc<RelationshipManager>>,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match manager.is_muted(principal.user_id, user_id).await {
        Ok(active) => (StatusCode::OK, Json(RelationshipStatusResponse { active })).into_response(),
        Err(err) => moderation_error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/me/mutes",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, clamped to 1..=100"),
        ("offset" = Option<i64>, Query, description = "Page offset"),
    ),
    responses(
        (status = 200, description = "Actively muted users, most recent first. \
            Expired mutes occupy page slots without being returned, so a page \
            may hold fewer than `limit` entries.", body = [UserSummary]),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "moderation"
)]
pub async fn list_muted(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    manager: Extension<Arc<RelationshipManager>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let targets = match manager.list_muted(principal.user_id, query.page()).await {
        Ok(targets) => targets,
        Err(err) => return moderation_error_response(&err),
    };

    user_summaries_response(&pool, &targets).await
}

async fn ensure_target_exists(pool: &PgPool, user_id: Uuid) -> Result<(), StatusCode> {
    match UserRepo::find_by_id(pool, user_id).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(err) => {
            error!("Failed to resolve target user: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn user_summaries_response(pool: &PgPool, ids: &[Uuid]) -> axum::response::Response {
    match UserRepo::find_many(pool, ids).await {
        Ok(users) => {
            let summaries: Vec<UserSummary> = users
                .iter()
                .map(|user| UserSummary {
                    id: user.id.to_string(),
                    username: user.username.clone(),
                    name: user.name.clone(),
                    image: user.image.clone(),
                    is_verified: user.is_verified,
                })
                .collect();
            (StatusCode::OK, Json(summaries)).into_response()
        }
        Err(err) => {
            error!("Failed to load user summaries: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn moderation_error_response(err: &ModerationError) -> axum::response::Response {
    match err {
        ModerationError::InvalidArgument(message) => {
            (StatusCode::BAD_REQUEST, *message).into_response()
        }
        ModerationError::Store(store_err) => {
            error!("Moderation store error: {store_err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Best-effort audit write; failures are logged, never surfaced.
async fn audit(
    pool: &PgPool,
    headers: &HeaderMap,
    principal: &Principal,
    action: &str,
    target: Uuid,
) {
    let ip = extract_client_ip(headers);
    let user_agent = extract_user_agent(headers);
    let entry = NewAuditLog {
        action,
        entity_type: Some("user"),
        entity_id: Some(target.to_string()),
        ip_address: ip.as_deref(),
        user_agent: user_agent.as_deref(),
        metadata: None,
        reason: None,
    };
    if let Err(err) = AuditLogRepo::log(pool, principal.user_id, entry).await {
        error!("Failed to write audit log for {action}: {err}");
    }
}
