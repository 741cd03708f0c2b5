//! Public profile lookups.
//!
//! Responses honor the owner's privacy settings: email, location and website
//! are stripped unless the corresponding toggle allows them, and banned
//! users read as absent.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use sqlx::PgPool;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::identity::models::{PrivacySettings, User};
use crate::identity::settings::PrivacySettingsRepo;
use crate::identity::users::UserRepo;

#[derive(Debug, Serialize, ToSchema)]
pub struct PublicProfileResponse {
    pub id: String,
    pub username: String,
    pub name: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub followers_count: i32,
    pub following_count: i32,
    pub posts_count: i32,
    pub is_private: bool,
    pub is_verified: bool,
    pub created_at: String,
}

impl PublicProfileResponse {
    fn from_user(user: &User, privacy: &PrivacySettings) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            name: user.name.clone(),
            bio: user.bio.clone(),
            image: user.image.clone(),
            email: privacy.show_email.then(|| user.email.clone()),
            website: privacy
                .show_website
                .then(|| user.website.clone())
                .flatten(),
            location: privacy
                .show_location
                .then(|| user.location.clone())
                .flatten(),
            followers_count: user.followers_count,
            following_count: user.following_count,
            posts_count: user.posts_count,
            is_private: user.is_private,
            is_verified: user.is_verified,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Public profile.", body = PublicProfileResponse),
        (status = 404, description = "Unknown or banned user."),
    ),
    tag = "users"
)]
pub async fn get_user(pool: Extension<PgPool>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match UserRepo::find_by_id(&pool, id).await {
        Ok(Some(user)) => profile_response(&pool, user).await,
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users/by-username/{username}",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "Public profile.", body = PublicProfileResponse),
        (status = 404, description = "Unknown or banned user."),
    ),
    tag = "users"
)]
pub async fn get_user_by_username(
    pool: Extension<PgPool>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let username = username.trim().to_lowercase();
    match UserRepo::find_by_username(&pool, &username).await {
        Ok(Some(user)) => profile_response(&pool, user).await,
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch user by username: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn profile_response(pool: &PgPool, user: User) -> axum::response::Response {
    if user.is_banned {
        return StatusCode::NOT_FOUND.into_response();
    }

    match PrivacySettingsRepo::get(pool, user.id).await {
        Ok(privacy) => (
            StatusCode::OK,
            Json(PublicProfileResponse::from_user(&user, &privacy)),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to fetch privacy settings: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
