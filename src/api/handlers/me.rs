//! Authenticated self-service endpoints.
//!
//! Flow Overview:
//! 1) Authenticate via bearer token or session cookie.
//! 2) Resolve the current user from the database.
//! 3) Apply allow-listed updates, or delete the account.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use utoipa::ToSchema;

use super::principal::{extract_client_ip, extract_user_agent, require_auth};
use crate::identity::audit::{actions, AuditLogRepo, NewAuditLog};
use crate::identity::models::User;
use crate::identity::users::{ProfileUpdate, ProfileUpdateOutcome, UserRepo};

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]{3,30}$").expect("valid username pattern"));

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub email_verified: bool,
    pub name: String,
    pub username: String,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub image: Option<String>,
    pub is_private: bool,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl MeResponse {
    fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            email_verified: user.email_verified,
            name: user.name.clone(),
            username: user.username.clone(),
            bio: user.bio.clone(),
            website: user.website.clone(),
            location: user.location.clone(),
            image: user.image.clone(),
            is_private: user.is_private,
            is_verified: user.is_verified,
            created_at: user.created_at.to_rfc3339(),
            updated_at: user.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MeUpdateRequest {
    pub name: Option<String>,
    pub username: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub image: Option<String>,
    pub is_private: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DeleteAccountRequest {
    pub reason: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user profile.", body = MeResponse),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "me"
)]
pub async fn get_me(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match UserRepo::find_by_id(&pool, principal.user_id).await {
        Ok(Some(user)) => (StatusCode::OK, Json(MeResponse::from_user(&user))).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch /v1/me profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/me",
    request_body = MeUpdateRequest,
    responses(
        (status = 200, description = "Profile updated.", body = MeResponse),
        (status = 400, description = "Invalid update payload."),
        (status = 401, description = "Missing or invalid session."),
        (status = 409, description = "Username already taken."),
    ),
    tag = "me"
)]
pub async fn patch_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<MeUpdateRequest>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let update = match validate_update(payload) {
        Ok(update) => update,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };
    if update.is_empty() {
        return (StatusCode::BAD_REQUEST, "No updates provided.").into_response();
    }

    match UserRepo::update_profile(&pool, principal.user_id, update).await {
        Ok(ProfileUpdateOutcome::Updated(user)) => {
            (StatusCode::OK, Json(MeResponse::from_user(&user))).into_response()
        }
        Ok(ProfileUpdateOutcome::UsernameTaken) => {
            (StatusCode::CONFLICT, "Username already taken.").into_response()
        }
        Ok(ProfileUpdateOutcome::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me",
    request_body = DeleteAccountRequest,
    responses(
        (status = 204, description = "Account deleted; sessions and linked accounts removed."),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "me"
)]
pub async fn delete_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<DeleteAccountRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let user = match UserRepo::find_by_id(&pool, principal.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch user for deletion: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Audit first; the entry goes with the user row via the FK cascade, but
    // the write is kept for deployments that archive the audit table.
    let reason = payload.and_then(|Json(request)| request.reason);
    let ip = extract_client_ip(&headers);
    let user_agent = extract_user_agent(&headers);
    let entry = NewAuditLog {
        action: actions::ACCOUNT_DELETED,
        entity_type: Some("user"),
        entity_id: Some(user.id.to_string()),
        ip_address: ip.as_deref(),
        user_agent: user_agent.as_deref(),
        metadata: Some(serde_json::json!({ "email": user.email })),
        reason,
    };
    if let Err(err) = AuditLogRepo::log(&pool, user.id, entry).await {
        error!("Failed to write account deletion audit log: {err}");
    }

    match UserRepo::delete_account(&pool, &user).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to delete account: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn validate_update(payload: MeUpdateRequest) -> Result<ProfileUpdate, &'static str> {
    let name = normalize_optional(payload.name);
    if let Some(name) = name.as_deref() {
        if name.is_empty() || name.len() > 100 {
            return Err("Name must be between 1 and 100 characters.");
        }
    }

    let username = payload
        .username
        .map(|username| username.trim().to_lowercase());
    if let Some(username) = username.as_deref() {
        if !USERNAME_RE.is_match(username) {
            return Err(
                "Username must be 3-30 characters of letters, digits, dashes or underscores.",
            );
        }
    }

    let bio = normalize_optional(payload.bio);
    if let Some(bio) = bio.as_deref() {
        if bio.len() > 160 {
            return Err("Bio cannot exceed 160 characters.");
        }
    }

    let website = normalize_optional(payload.website);
    if let Some(website) = website.as_deref() {
        if website.len() > 200 || url::Url::parse(website).is_err() {
            return Err("Website must be a valid URL of at most 200 characters.");
        }
    }

    let location = normalize_optional(payload.location);
    if let Some(location) = location.as_deref() {
        if location.len() > 100 {
            return Err("Location cannot exceed 100 characters.");
        }
    }

    let image = normalize_optional(payload.image);
    if let Some(image) = image.as_deref() {
        if url::Url::parse(image).is_err() {
            return Err("Image must be a valid URL.");
        }
    }

    Ok(ProfileUpdate {
        name,
        username,
        bio,
        website,
        location,
        image,
        is_private: payload.is_private,
    })
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_request() -> MeUpdateRequest {
        MeUpdateRequest {
            name: None,
            username: None,
            bio: None,
            website: None,
            location: None,
            image: None,
            is_private: None,
        }
    }

    #[test]
    fn username_is_lowercased_and_validated() {
        let request = MeUpdateRequest {
            username: Some("  Ada_Lovelace ".to_string()),
            ..empty_request()
        };
        let update = validate_update(request).expect("valid");
        assert_eq!(update.username.as_deref(), Some("ada_lovelace"));

        let request = MeUpdateRequest {
            username: Some("a!".to_string()),
            ..empty_request()
        };
        assert!(validate_update(request).is_err());
    }

    #[test]
    fn website_must_be_a_url() {
        let request = MeUpdateRequest {
            website: Some("https://kerno.dev".to_string()),
            ..empty_request()
        };
        assert!(validate_update(request).is_ok());

        let request = MeUpdateRequest {
            website: Some("not a url".to_string()),
            ..empty_request()
        };
        assert!(validate_update(request).is_err());
    }

    #[test]
    fn overlong_bio_is_rejected() {
        let request = MeUpdateRequest {
            bio: Some("x".repeat(161)),
            ..empty_request()
        };
        assert!(validate_update(request).is_err());
    }
}
