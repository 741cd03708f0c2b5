//! Privacy and notification settings endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use tracing::error;

use super::principal::{extract_client_ip, extract_user_agent, require_auth, Principal};
use crate::identity::audit::{actions, AuditLogRepo, NewAuditLog};
use crate::identity::models::{NotificationSettings, PrivacySettings};
use crate::identity::settings::{
    NotificationSettingsRepo, NotificationUpdate, PrivacySettingsRepo, PrivacyUpdate,
};

#[utoipa::path(
    get,
    path = "/v1/me/settings/privacy",
    responses(
        (status = 200, description = "Current privacy settings (defaults if never set).",
            body = PrivacySettings),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "settings"
)]
pub async fn get_privacy(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match PrivacySettingsRepo::get(&pool, principal.user_id).await {
        Ok(settings) => (StatusCode::OK, Json(settings)).into_response(),
        Err(err) => {
            error!("Failed to fetch privacy settings: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/me/settings/privacy",
    request_body = PrivacyUpdate,
    responses(
        (status = 200, description = "Updated privacy settings.",
            body = PrivacySettings),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "settings"
)]
pub async fn patch_privacy(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(update): Json<PrivacyUpdate>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match PrivacySettingsRepo::update(&pool, principal.user_id, update).await {
        Ok(settings) => {
            audit(&pool, &headers, &principal, actions::PRIVACY_SETTINGS_UPDATED).await;
            (StatusCode::OK, Json(settings)).into_response()
        }
        Err(err) => {
            error!("Failed to update privacy settings: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/me/settings/notifications",
    responses(
        (status = 200, description = "Current notification settings (defaults if never set).",
            body = NotificationSettings),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "settings"
)]
pub async fn get_notifications(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match NotificationSettingsRepo::get(&pool, principal.user_id).await {
        Ok(settings) => (StatusCode::OK, Json(settings)).into_response(),
        Err(err) => {
            error!("Failed to fetch notification settings: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/me/settings/notifications",
    request_body = NotificationUpdate,
    responses(
        (status = 200, description = "Updated notification settings.",
            body = NotificationSettings),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "settings"
)]
pub async fn patch_notifications(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(update): Json<NotificationUpdate>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match NotificationSettingsRepo::update(&pool, principal.user_id, update).await {
        Ok(settings) => {
            audit(
                &pool,
                &headers,
                &principal,
                actions::NOTIFICATION_SETTINGS_UPDATED,
            )
            .await;
            (StatusCode::OK, Json(settings)).into_response()
        }
        Err(err) => {
            error!("Failed to update notification settings: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn audit(pool: &PgPool, headers: &HeaderMap, principal: &Principal, action: &str) {
    let ip = extract_client_ip(headers);
    let user_agent = extract_user_agent(headers);
    let entry = NewAuditLog {
        action,
        entity_type: Some("settings"),
        entity_id: None,
        ip_address: ip.as_deref(),
        user_agent: user_agent.as_deref(),
        metadata: None,
        reason: None,
    };
    if let Err(err) = AuditLogRepo::log(pool, principal.user_id, entry).await {
        error!("Failed to write audit log for {action}: {err}");
    }
}
