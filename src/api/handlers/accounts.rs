//! Linked account listing and unlinking.

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
use crate::identity::accounts::{AccountRepo, UnlinkOutcome};
use crate::identity::audit::{actions, AuditLogRepo, NewAuditLog};

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkedAccountResponse {
    pub id: String,
    pub provider_id: String,
    /// Provider-side account identifier; token material is never exposed.
    pub account_id: String,
    pub created_at: String,
}

#[utoipa::path(
    get,
    path = "/v1/me/accounts",
    responses(
        (status = 200, description = "Linked sign-in methods.", body = [LinkedAccountResponse]),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "accounts"
)]
pub async fn list_accounts(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match AccountRepo::list_for_user(&pool, principal.user_id).await {
        Ok(accounts) => {
            let accounts: Vec<LinkedAccountResponse> = accounts
                .iter()
                .map(|account| LinkedAccountResponse {
                    id: account.id.to_string(),
                    provider_id: account.provider_id.clone(),
                    account_id: account.account_id.clone(),
                    created_at: account.created_at.to_rfc3339(),
                })
                .collect();
            (StatusCode::OK, Json(accounts)).into_response()
        }
        Err(err) => {
            error!("Failed to list linked accounts: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PasswordEligibilityResponse {
    /// True when the user has a credential account with a password; password
    /// changes themselves happen in the external auth collaborator.
    pub eligible: bool,
}

#[utoipa::path(
    get,
    path = "/v1/me/accounts/password-eligibility",
    responses(
        (status = 200, description = "Whether a password change is possible.", body = PasswordEligibilityResponse),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "accounts"
)]
pub async fn password_eligibility(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match AccountRepo::has_password(&pool, principal.user_id).await {
        Ok(eligible) => {
            (StatusCode::OK, Json(PasswordEligibilityResponse { eligible })).into_response()
        }
        Err(err) => {
            error!("Failed to check credential account: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me/accounts/{id}",
    params(("id" = String, Path, description = "Linked account id")),
    responses(
        (status = 204, description = "Account unlinked."),
        (status = 404, description = "No such linked account."),
        (status = 409, description = "Refused: last remaining sign-in method."),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "accounts"
)]
pub async fn unlink_account(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match AccountRepo::unlink(&pool, principal.user_id, id).await {
        Ok(UnlinkOutcome::Unlinked) => {
            audit(&pool, &headers, &principal, id).await;
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(UnlinkOutcome::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Ok(UnlinkOutcome::LastSignInMethod) => (
            StatusCode::CONFLICT,
            "Cannot remove the last remaining sign-in method.",
        )
            .into_response(),
        Err(err) => {
            error!("Failed to unlink account: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn audit(pool: &PgPool, headers: &HeaderMap, principal: &Principal, account_id: Uuid) {
    let ip = extract_client_ip(headers);
    let user_agent = extract_user_agent(headers);
    let entry = NewAuditLog {
        action: actions::OAUTH_ACCOUNT_UNLINKED,
        entity_type: Some("account"),
        entity_id: Some(account_id.to_string()),
        ip_address: ip.as_deref(),
        user_agent: user_agent.as_deref(),
        metadata: None,
        reason: None,
    };
    if let Err(err) = AuditLogRepo::log(pool, principal.user_id, entry).await {
        error!(
            "Failed to write audit log for {}: {err}",
            actions::OAUTH_ACCOUNT_UNLINKED
        );
    }
}
