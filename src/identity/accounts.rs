//! Linked OAuth/credential accounts.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::LinkedAccount;

/// Outcome of an unlink attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum UnlinkOutcome {
    Unlinked,
    NotFound,
    /// Refused: removing this account would leave the user with no way to
    /// sign in.
    LastSignInMethod,
}

pub struct AccountRepo;

impl AccountRepo {
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<LinkedAccount>> {
        sqlx::query_as::<_, LinkedAccount>(
            r"
            SELECT id, user_id, account_id, provider_id, created_at, updated_at
            FROM accounts
            WHERE user_id = $1
            ORDER BY created_at ASC
            ",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("failed to list linked accounts")
    }

    /// Whether the user has a local credential account with a password set.
    /// Password changes themselves are the auth collaborator's job.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn has_password(pool: &PgPool, user_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            r"
            SELECT 1 AS present
            FROM accounts
            WHERE user_id = $1
              AND provider_id = 'credential'
              AND password IS NOT NULL
            LIMIT 1
            ",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to check credential account")?;
        Ok(row.is_some())
    }

    /// Unlink one account, refusing to drop the last remaining sign-in
    /// method. Runs in a transaction so a concurrent unlink cannot leave the
    /// user locked out.
    ///
    /// # Errors
    /// Returns an error if a database query fails.
    pub async fn unlink(pool: &PgPool, user_id: Uuid, account_id: Uuid) -> Result<UnlinkOutcome> {
        let mut tx = pool.begin().await.context("begin unlink transaction")?;

        // Lock the user's account rows; FOR UPDATE cannot wrap an aggregate.
        let rows = sqlx::query("SELECT id FROM accounts WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await
            .context("failed to lock linked accounts")?;

        if rows.len() <= 1 {
            let _ = tx.rollback().await;
            return Ok(UnlinkOutcome::LastSignInMethod);
        }

        let result = sqlx::query("DELETE FROM accounts WHERE id = $1 AND user_id = $2")
            .bind(account_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("failed to unlink account")?;

        tx.commit().await.context("commit unlink transaction")?;

        if result.rows_affected() > 0 {
            Ok(UnlinkOutcome::Unlinked)
        } else {
            Ok(UnlinkOutcome::NotFound)
        }
    }
}
