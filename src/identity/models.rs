use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

/// Core user record.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    pub username: String,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub role: String,
    pub followers_count: i32,
    pub following_count: i32,
    pub posts_count: i32,
    pub is_private: bool,
    pub is_verified: bool,
    pub verification_type: Option<String>,
    pub is_banned: bool,
    pub banned_at: Option<DateTime<Utc>>,
    pub banned_reason: Option<String>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub country_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored session row. Only the token hash is persisted.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Linked OAuth or credential account. Token material stays in the database
/// and is never exposed through the API.
#[derive(Debug, Clone, FromRow)]
pub struct LinkedAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: String,
    pub provider_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit trail entry. `metadata` is free-form JSON supplied by the caller.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AuditLogEntry {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        // inet and jsonb columns are selected as ::text and decoded here.
        let metadata: Option<String> = row.try_get("metadata")?;
        let metadata = metadata
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|err| {
                    sqlx::Error::Decode(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("invalid audit metadata json: {err}"),
                    )))
                })
            })
            .transpose()?;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            action: row.try_get("action")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            metadata,
            reason: row.try_get("reason")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Per-user privacy toggles. Defaults apply when no row exists yet.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct PrivacySettings {
    pub show_email: bool,
    pub show_location: bool,
    pub show_website: bool,
    pub allow_indexing: bool,
    pub show_liked_posts: bool,
    pub show_followers: bool,
    pub show_following: bool,
    pub allow_direct_messages: bool,
    pub allow_direct_messages_from_followed_only: bool,
    pub allow_tagging: bool,
    pub allow_tagging_from_followed_only: bool,
    pub show_read_receipts: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            show_email: false,
            show_location: true,
            show_website: true,
            allow_indexing: true,
            show_liked_posts: true,
            show_followers: true,
            show_following: true,
            allow_direct_messages: true,
            allow_direct_messages_from_followed_only: false,
            allow_tagging: true,
            allow_tagging_from_followed_only: false,
            show_read_receipts: true,
        }
    }
}

/// Per-user notification toggles. Defaults apply when no row exists yet.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct NotificationSettings {
    pub push_enabled: bool,
    pub push_likes: bool,
    pub push_reposts: bool,
    pub push_replies: bool,
    pub push_mentions: bool,
    pub push_follows: bool,
    pub push_messages: bool,
    pub mute_non_followers: bool,
    pub mute_new_accounts: bool,
    pub mute_unverified: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            push_enabled: true,
            push_likes: true,
            push_reposts: true,
            push_replies: true,
            push_mentions: true,
            push_follows: true,
            push_messages: true,
            mute_non_followers: false,
            mute_new_accounts: false,
            mute_unverified: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privacy_defaults_hide_email_only() {
        let defaults = PrivacySettings::default();
        assert!(!defaults.show_email);
        assert!(defaults.show_location);
        assert!(defaults.show_website);
        assert!(defaults.allow_direct_messages);
    }

    #[test]
    fn notification_defaults_enable_push_without_filters() {
        let defaults = NotificationSettings::default();
        assert!(defaults.push_enabled);
        assert!(!defaults.mute_non_followers);
        assert!(!defaults.mute_new_accounts);
        assert!(!defaults.mute_unverified);
    }
}
