//! Session issuance, resolution and revocation.
//!
//! Raw bearer tokens are handed out exactly once at creation; the database
//! only ever sees a SHA-256 hash, so a leaked dump cannot be replayed.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::models::Session;

const SESSION_COLUMNS: &str =
    "id, user_id, expires_at, ip_address, user_agent, created_at, updated_at";

/// Create a new session token for the auth cookie or bearer header.
/// The raw value is only returned to the caller; the database stores a hash.
///
/// # Errors
/// Returns an error if the system RNG fails.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a session token so raw values never touch the database.
#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Minimal data resolved from a presented session token.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
}

pub struct SessionRepo;

impl SessionRepo {
    /// Issue a session for `user_id` and return it together with the raw
    /// token. Called by the auth collaborator once a login handshake has
    /// succeeded elsewhere.
    ///
    /// # Errors
    /// Returns an error if token generation or the insert fails.
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        ttl_seconds: i64,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<(Session, String)> {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);

        let query = format!(
            r"
            INSERT INTO sessions (user_id, token_hash, expires_at, ip_address, user_agent)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'), $4, $5)
            RETURNING {SESSION_COLUMNS}
            "
        );
        let session = sqlx::query_as::<_, Session>(&query)
            .bind(user_id)
            .bind(&token_hash)
            .bind(ttl_seconds)
            .bind(ip)
            .bind(user_agent)
            .fetch_one(pool)
            .await
            .context("failed to insert session")?;

        Ok((session, token))
    }

    /// Resolve a token hash to its user. Expired sessions read as absent;
    /// rows are left for the owner to revoke or for maintenance to clear.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn lookup(pool: &PgPool, token_hash: &[u8]) -> Result<Option<SessionRecord>> {
        let query = r"
            SELECT sessions.id AS session_id, sessions.user_id, users.email
            FROM sessions
            JOIN users ON users.id = sessions.user_id
            WHERE sessions.token_hash = $1
              AND sessions.expires_at > NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;

        Ok(row.map(|row| SessionRecord {
            session_id: row.get("session_id"),
            user_id: row.get("user_id"),
            email: row.get("email"),
        }))
    }

    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Session>> {
        sqlx::query_as::<_, Session>(&format!(
            r"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("failed to list sessions")
    }

    /// Revoke one session, scoped to its owner. Returns whether a row was
    /// removed.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn revoke(pool: &PgPool, user_id: Uuid, session_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .execute(pool)
            .await
            .context("failed to revoke session")?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every session of a user except the one making the request.
    /// Returns how many were removed.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn revoke_all_except(
        pool: &PgPool,
        user_id: Uuid,
        keep_session_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND id != $2")
            .bind(user_id)
            .bind(keep_session_id)
            .execute(pool)
            .await
            .context("failed to revoke sessions")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn generated_tokens_are_32_random_bytes() {
        let decoded_len = generate_session_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));

        let first = generate_session_token().expect("token");
        let second = generate_session_token().expect("token");
        assert_ne!(first, second);
    }

    #[test]
    fn token_hash_is_stable_and_distinct() {
        let first = hash_session_token("token");
        let second = hash_session_token("token");
        let different = hash_session_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 32);
    }
}
