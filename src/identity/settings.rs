//! Privacy and notification settings.
//!
//! Settings rows are created lazily: reads fall back to defaults, writes
//! ensure the row exists and then apply an allow-listed COALESCE update.

use anyhow::{Context, Result};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{NotificationSettings, PrivacySettings};

const PRIVACY_COLUMNS: &str = r"
    show_email, show_location, show_website, allow_indexing, show_liked_posts,
    show_followers, show_following, allow_direct_messages,
    allow_direct_messages_from_followed_only, allow_tagging,
    allow_tagging_from_followed_only, show_read_receipts
";

const NOTIFICATION_COLUMNS: &str = r"
    push_enabled, push_likes, push_reposts, push_replies, push_mentions,
    push_follows, push_messages, mute_non_followers, mute_new_accounts,
    mute_unverified
";

/// Allow-listed privacy patch; `None` leaves a column untouched.
#[derive(Debug, Default, Clone, Deserialize, utoipa::ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PrivacyUpdate {
    pub show_email: Option<bool>,
    pub show_location: Option<bool>,
    pub show_website: Option<bool>,
    pub allow_indexing: Option<bool>,
    pub show_liked_posts: Option<bool>,
    pub show_followers: Option<bool>,
    pub show_following: Option<bool>,
    pub allow_direct_messages: Option<bool>,
    pub allow_direct_messages_from_followed_only: Option<bool>,
    pub allow_tagging: Option<bool>,
    pub allow_tagging_from_followed_only: Option<bool>,
    pub show_read_receipts: Option<bool>,
}

/// Allow-listed notification patch; `None` leaves a column untouched.
#[derive(Debug, Default, Clone, Deserialize, utoipa::ToSchema)]
#[serde(deny_unknown_fields)]
pub struct NotificationUpdate {
    pub push_enabled: Option<bool>,
    pub push_likes: Option<bool>,
    pub push_reposts: Option<bool>,
    pub push_replies: Option<bool>,
    pub push_mentions: Option<bool>,
    pub push_follows: Option<bool>,
    pub push_messages: Option<bool>,
    pub mute_non_followers: Option<bool>,
    pub mute_new_accounts: Option<bool>,
    pub mute_unverified: Option<bool>,
}

pub struct PrivacySettingsRepo;

impl PrivacySettingsRepo {
    /// Settings for `user_id`, or the defaults when no row exists yet.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(pool: &PgPool, user_id: Uuid) -> Result<PrivacySettings> {
        let row = sqlx::query_as::<_, PrivacySettings>(&format!(
            "SELECT {PRIVACY_COLUMNS} FROM privacy_settings WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch privacy settings")?;
        Ok(row.unwrap_or_default())
    }

    /// # Errors
    /// Returns an error if a statement in the transaction fails.
    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        update: PrivacyUpdate,
    ) -> Result<PrivacySettings> {
        let mut tx = pool.begin().await.context("begin settings transaction")?;

        sqlx::query(
            "INSERT INTO privacy_settings (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("failed to ensure privacy settings row")?;

        let query = format!(
            r"
            UPDATE privacy_settings SET
                show_email = COALESCE($2, show_email),
                show_location = COALESCE($3, show_location),
                show_website = COALESCE($4, show_website),
                allow_indexing = COALESCE($5, allow_indexing),
                show_liked_posts = COALESCE($6, show_liked_posts),
                show_followers = COALESCE($7, show_followers),
                show_following = COALESCE($8, show_following),
                allow_direct_messages = COALESCE($9, allow_direct_messages),
                allow_direct_messages_from_followed_only =
                    COALESCE($10, allow_direct_messages_from_followed_only),
                allow_tagging = COALESCE($11, allow_tagging),
                allow_tagging_from_followed_only =
                    COALESCE($12, allow_tagging_from_followed_only),
                show_read_receipts = COALESCE($13, show_read_receipts),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING {PRIVACY_COLUMNS}
            "
        );
        let settings = sqlx::query_as::<_, PrivacySettings>(&query)
            .bind(user_id)
            .bind(update.show_email)
            .bind(update.show_location)
            .bind(update.show_website)
            .bind(update.allow_indexing)
            .bind(update.show_liked_posts)
            .bind(update.show_followers)
            .bind(update.show_following)
            .bind(update.allow_direct_messages)
            .bind(update.allow_direct_messages_from_followed_only)
            .bind(update.allow_tagging)
            .bind(update.allow_tagging_from_followed_only)
            .bind(update.show_read_receipts)
            .fetch_one(&mut *tx)
            .await
            .context("failed to update privacy settings")?;

        tx.commit().await.context("commit settings transaction")?;

        Ok(settings)
    }
}

pub struct NotificationSettingsRepo;

impl NotificationSettingsRepo {
    /// Settings for `user_id`, or the defaults when no row exists yet.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(pool: &PgPool, user_id: Uuid) -> Result<NotificationSettings> {
        let row = sqlx::query_as::<_, NotificationSettings>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notification_settings WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch notification settings")?;
        Ok(row.unwrap_or_default())
    }

    /// # Errors
    /// Returns an error if a statement in the transaction fails.
    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        update: NotificationUpdate,
    ) -> Result<NotificationSettings> {
        let mut tx = pool.begin().await.context("begin settings transaction")?;

        sqlx::query(
            r"
            INSERT INTO notification_settings (user_id)
            VALUES ($1) ON CONFLICT (user_id) DO NOTHING
            ",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("failed to ensure notification settings row")?;

        let query = format!(
            r"
            UPDATE notification_settings SET
                push_enabled = COALESCE($2, push_enabled),
                push_likes = COALESCE($3, push_likes),
                push_reposts = COALESCE($4, push_reposts),
                push_replies = COALESCE($5, push_replies),
                push_mentions = COALESCE($6, push_mentions),
                push_follows = COALESCE($7, push_follows),
                push_messages = COALESCE($8, push_messages),
                mute_non_followers = COALESCE($9, mute_non_followers),
                mute_new_accounts = COALESCE($10, mute_new_accounts),
                mute_unverified = COALESCE($11, mute_unverified),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING {NOTIFICATION_COLUMNS}
            "
        );
        let settings = sqlx::query_as::<_, NotificationSettings>(&query)
            .bind(user_id)
            .bind(update.push_enabled)
            .bind(update.push_likes)
            .bind(update.push_reposts)
            .bind(update.push_replies)
            .bind(update.push_mentions)
            .bind(update.push_follows)
            .bind(update.push_messages)
            .bind(update.mute_non_followers)
            .bind(update.mute_new_accounts)
            .bind(update.mute_unverified)
            .fetch_one(&mut *tx)
            .await
            .context("failed to update notification settings")?;

        tx.commit().await.context("commit settings transaction")?;

        Ok(settings)
    }
}
