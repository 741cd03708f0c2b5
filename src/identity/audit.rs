//! Audit trail for security-relevant account actions.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::AuditLogEntry;

/// Canonical action names, shared by handlers and consumers of the trail.
pub mod actions {
    pub const ACCOUNT_DELETED: &str = "account_deleted";
    pub const SESSION_REVOKED: &str = "session_revoked";
    pub const ALL_SESSIONS_REVOKED: &str = "all_sessions_revoked";
    pub const OAUTH_ACCOUNT_UNLINKED: &str = "oauth_account_unlinked";
    pub const PRIVACY_SETTINGS_UPDATED: &str = "privacy_settings_updated";
    pub const NOTIFICATION_SETTINGS_UPDATED: &str = "notification_settings_updated";
    pub const USER_BLOCKED: &str = "user_blocked";
    pub const USER_UNBLOCKED: &str = "user_unblocked";
    pub const USER_MUTED: &str = "user_muted";
    pub const USER_UNMUTED: &str = "user_unmuted";
}

/// Insert payload for one audit entry.
#[derive(Debug, Default)]
pub struct NewAuditLog<'a> {
    pub action: &'a str,
    pub entity_type: Option<&'a str>,
    pub entity_id: Option<String>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub metadata: Option<serde_json::Value>,
    pub reason: Option<String>,
}

pub struct AuditLogRepo;

impl AuditLogRepo {
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn log(pool: &PgPool, user_id: Uuid, entry: NewAuditLog<'_>) -> Result<()> {
        let metadata = entry
            .metadata
            .map(|value| serde_json::to_string(&value))
            .transpose()
            .context("failed to serialize audit metadata")?;

        sqlx::query(
            r"
            INSERT INTO audit_logs
                (user_id, action, entity_type, entity_id, ip_address, user_agent, metadata, reason)
            VALUES ($1, $2, $3, $4, $5::inet, $6, $7::jsonb, $8)
            ",
        )
        .bind(user_id)
        .bind(entry.action)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(entry.ip_address)
        .bind(entry.user_agent)
        .bind(metadata)
        .bind(entry.reason)
        .execute(pool)
        .await
        .context("failed to write audit log")?;
        Ok(())
    }

    /// Entries for one user, newest first, optionally filtered by action.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        action: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLogEntry>> {
        sqlx::query_as::<_, AuditLogEntry>(
            r"
            SELECT id, user_id, action, entity_type, entity_id,
                   ip_address::text AS ip_address, user_agent,
                   metadata::text AS metadata, reason, created_at
            FROM audit_logs
            WHERE user_id = $1
              AND ($2::varchar IS NULL OR action = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(user_id)
        .bind(action)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("failed to list audit logs")
    }
}
