//! Persistence contract for moderation relationships and its PostgreSQL
//! implementation.
//!
//! Blocks and mutes live in separate tables with a UNIQUE constraint on the
//! ordered user pair; the store surfaces that constraint as
//! [`StoreError::UniqueViolation`] so the manager can absorb insert races.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use thiserror::Error;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::models::{MuteDuration, Relationship, RelationshipKind};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A row for (kind, source, target) already exists.
    #[error("relationship already exists")]
    UniqueViolation,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Insert payload; `created_at` is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewRelationship {
    pub kind: RelationshipKind,
    pub source_user_id: Uuid,
    pub target_user_id: Uuid,
    pub duration: Option<MuteDuration>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Insert a new relationship row. Fails with
    /// [`StoreError::UniqueViolation`] when the key is already present.
    async fn insert(&self, new: NewRelationship) -> Result<Relationship, StoreError>;

    async fn find(
        &self,
        kind: RelationshipKind,
        source: Uuid,
        target: Uuid,
    ) -> Result<Option<Relationship>, StoreError>;

    /// Hard delete. Returns the number of rows removed (0 or 1).
    async fn delete(
        &self,
        kind: RelationshipKind,
        source: Uuid,
        target: Uuid,
    ) -> Result<u64, StoreError>;

    /// Rows for `source`, newest first, paginated. Expired mutes are
    /// included; activity filtering is the manager's job.
    async fn list_by_source(
        &self,
        kind: RelationshipKind,
        source: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Relationship>, StoreError>;
}

/// PostgreSQL-backed store over the `blocks` and `mutes` tables.
#[derive(Clone, Debug)]
pub struct PgRelationshipStore {
    pool: PgPool,
}

impl PgRelationshipStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationshipStore for PgRelationshipStore {
    async fn insert(&self, new: NewRelationship) -> Result<Relationship, StoreError> {
        let query = match new.kind {
            RelationshipKind::Block => {
                r"
                INSERT INTO blocks (blocker_id, blocked_id)
                VALUES ($1, $2)
                RETURNING id, blocker_id AS source_user_id, blocked_id AS target_user_id,
                          NULL::text AS mute_duration, NULL::timestamptz AS expires_at, created_at
                "
            }
            RelationshipKind::Mute => {
                r"
                INSERT INTO mutes (muter_id, muted_id, mute_duration, expires_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id, muter_id AS source_user_id, muted_id AS target_user_id,
                          mute_duration, expires_at, created_at
                "
            }
        };
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );

        let mut statement = sqlx::query(query)
            .bind(new.source_user_id)
            .bind(new.target_user_id);
        if new.kind == RelationshipKind::Mute {
            statement = statement
                .bind(new.duration.map(MuteDuration::as_str))
                .bind(new.expires_at);
        }

        let row = statement
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::UniqueViolation
                } else {
                    StoreError::Database(err)
                }
            })?;

        relationship_from_row(new.kind, &row).map_err(StoreError::Database)
    }

    async fn find(
        &self,
        kind: RelationshipKind,
        source: Uuid,
        target: Uuid,
    ) -> Result<Option<Relationship>, StoreError> {
        let query = match kind {
            RelationshipKind::Block => {
                r"
                SELECT id, blocker_id AS source_user_id, blocked_id AS target_user_id,
                       NULL::text AS mute_duration, NULL::timestamptz AS expires_at, created_at
                FROM blocks
                WHERE blocker_id = $1 AND blocked_id = $2
                "
            }
            RelationshipKind::Mute => {
                r"
                SELECT id, muter_id AS source_user_id, muted_id AS target_user_id,
                       mute_duration, expires_at, created_at
                FROM mutes
                WHERE muter_id = $1 AND muted_id = $2
                "
            }
        };
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        let row = sqlx::query(query)
            .bind(source)
            .bind(target)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.map(|row| relationship_from_row(kind, &row))
            .transpose()
            .map_err(StoreError::Database)
    }

    async fn delete(
        &self,
        kind: RelationshipKind,
        source: Uuid,
        target: Uuid,
    ) -> Result<u64, StoreError> {
        let query = match kind {
            RelationshipKind::Block => {
                "DELETE FROM blocks WHERE blocker_id = $1 AND blocked_id = $2"
            }
            RelationshipKind::Mute => "DELETE FROM mutes WHERE muter_id = $1 AND muted_id = $2",
        };
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );

        let result = sqlx::query(query)
            .bind(source)
            .bind(target)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_by_source(
        &self,
        kind: RelationshipKind,
        source: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Relationship>, StoreError> {
        let query = match kind {
            RelationshipKind::Block => {
                r"
                SELECT id, blocker_id AS source_user_id, blocked_id AS target_user_id,
                       NULL::text AS mute_duration, NULL::timestamptz AS expires_at, created_at
                FROM blocks
                WHERE blocker_id = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "
            }
            RelationshipKind::Mute => {
                r"
                SELECT id, muter_id AS source_user_id, muted_id AS target_user_id,
                       mute_duration, expires_at, created_at
                FROM mutes
                WHERE muter_id = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "
            }
        };
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );

        let rows = sqlx::query(query)
            .bind(source)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;

        rows.iter()
            .map(|row| relationship_from_row(kind, row))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Database)
    }
}

fn relationship_from_row(kind: RelationshipKind, row: &PgRow) -> Result<Relationship, sqlx::Error> {
    let duration: Option<String> = row.try_get("mute_duration")?;
    let duration = duration
        .map(|tag| {
            MuteDuration::parse(&tag).ok_or_else(|| {
                sqlx::Error::Decode(Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid mute_duration value: {tag}"),
                )))
            })
        })
        .transpose()?;

    Ok(Relationship {
        id: row.try_get("id")?,
        kind,
        source_user_id: row.try_get("source_user_id")?,
        target_user_id: row.try_get("target_user_id")?,
        duration,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// SQLSTATE 23505, unique_violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl std::fmt::Display for TestDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test db error")
        }
    }

    impl std::error::Error for TestDbError {}

    impl sqlx::error::DatabaseError for TestDbError {
        fn message(&self) -> &str {
            "test db error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
