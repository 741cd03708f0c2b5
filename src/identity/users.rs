//! User lookup, profile updates and account deletion.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::User;
use crate::api::email;

const USER_COLUMNS: &str = r"
    id, name, email, email_verified, image, username, bio, website, location,
    role, followers_count, following_count, posts_count, is_private,
    is_verified, verification_type, is_banned, banned_at, banned_reason,
    last_active_at, country_code, created_at, updated_at
";

/// Allow-listed profile fields; `None` leaves a column untouched.
#[derive(Debug, Default, Clone)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub image: Option<String>,
    pub is_private: Option<bool>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.username.is_none()
            && self.bio.is_none()
            && self.website.is_none()
            && self.location.is_none()
            && self.image.is_none()
            && self.is_private.is_none()
    }
}

/// Outcome of a profile update attempt.
#[derive(Debug)]
pub enum ProfileUpdateOutcome {
    Updated(User),
    UsernameTaken,
    NotFound,
}

pub struct UserRepo;

impl UserRepo {
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by id")
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user by username")
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by email")
    }

    /// Fetch several users at once, returned in the order of `ids`.
    /// Missing ids are skipped, so the result may be shorter than the input.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn find_many(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(pool)
        .await
        .context("failed to fetch users by id list")?;

        // ANY($1) gives no ordering; restore the caller's.
        let mut ordered = Vec::with_capacity(users.len());
        for id in ids {
            if let Some(user) = users.iter().find(|user| user.id == *id) {
                ordered.push(user.clone());
            }
        }
        Ok(ordered)
    }

    /// Apply an allow-listed profile update. Username uniqueness is checked
    /// up front so the caller gets a typed conflict instead of a raw
    /// constraint error.
    ///
    /// # Errors
    /// Returns an error if a database query fails.
    pub async fn update_profile(
        pool: &PgPool,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<ProfileUpdateOutcome> {
        if let Some(username) = update.username.as_deref() {
            let taken = Self::find_by_username(pool, username)
                .await?
                .is_some_and(|existing| existing.id != user_id);
            if taken {
                return Ok(ProfileUpdateOutcome::UsernameTaken);
            }
        }

        let query = format!(
            r"
            UPDATE users SET
                name = COALESCE($2, name),
                username = COALESCE($3, username),
                bio = COALESCE($4, bio),
                website = COALESCE($5, website),
                location = COALESCE($6, location),
                image = COALESCE($7, image),
                is_private = COALESCE($8, is_private),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .bind(update.name)
            .bind(update.username)
            .bind(update.bio)
            .bind(update.website)
            .bind(update.location)
            .bind(update.image)
            .bind(update.is_private)
            .fetch_optional(pool)
            .await
            .context("failed to update profile")?;

        Ok(row.map_or(ProfileUpdateOutcome::NotFound, ProfileUpdateOutcome::Updated))
    }

    /// Delete a user and their credentials in one transaction: queue the
    /// farewell email, drop sessions and linked accounts, then the user row.
    /// Relationship and settings rows go with the FK cascades.
    ///
    /// # Errors
    /// Returns an error if any statement in the transaction fails.
    pub async fn delete_account(pool: &PgPool, user: &User) -> Result<()> {
        let mut tx = pool.begin().await.context("begin delete transaction")?;

        email::enqueue(
            &mut tx,
            &user.email,
            email::TEMPLATE_ACCOUNT_DELETED,
            &serde_json::json!({ "name": user.name }),
        )
        .await?;

        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .context("failed to delete sessions")?;

        sqlx::query("DELETE FROM accounts WHERE user_id = $1")
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .context("failed to delete linked accounts")?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .context("failed to delete user")?;

        tx.commit().await.context("commit delete transaction")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_update_is_detected() {
        assert!(ProfileUpdate::default().is_empty());

        let update = ProfileUpdate {
            bio: Some("hello".to_string()),
            ..ProfileUpdate::default()
        };
        assert!(!update.is_empty());
    }
}
