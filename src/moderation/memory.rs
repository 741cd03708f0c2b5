//! In-memory [`RelationshipStore`] for tests and local development.
//!
//! Enforces the same (kind, source, target) uniqueness as the SQL schema and
//! keeps insertion order so recency listings are deterministic even when an
//! injected clock stands still.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::models::{Relationship, RelationshipKind};
use super::store::{NewRelationship, RelationshipStore, StoreError};

struct Entry {
    relationship: Relationship,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    next_seq: u64,
}

pub struct MemoryRelationshipStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryRelationshipStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRelationshipStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Share a clock with the manager so `created_at` follows test time.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Number of stored rows, expired ones included.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").entries.len()
    }
}

#[async_trait]
impl RelationshipStore for MemoryRelationshipStore {
    async fn insert(&self, new: NewRelationship) -> Result<Relationship, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().expect("store lock poisoned");

        let duplicate = inner.entries.iter().any(|entry| {
            entry.relationship.kind == new.kind
                && entry.relationship.source_user_id == new.source_user_id
                && entry.relationship.target_user_id == new.target_user_id
        });
        if duplicate {
            return Err(StoreError::UniqueViolation);
        }

        let relationship = Relationship {
            id: Uuid::new_v4(),
            kind: new.kind,
            source_user_id: new.source_user_id,
            target_user_id: new.target_user_id,
            duration: new.duration,
            expires_at: new.expires_at,
            created_at: now,
        };
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push(Entry {
            relationship: relationship.clone(),
            seq,
        });

        Ok(relationship)
    }

    async fn find(
        &self,
        kind: RelationshipKind,
        source: Uuid,
        target: Uuid,
    ) -> Result<Option<Relationship>, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .entries
            .iter()
            .map(|entry| &entry.relationship)
            .find(|relationship| {
                relationship.kind == kind
                    && relationship.source_user_id == source
                    && relationship.target_user_id == target
            })
            .cloned())
    }

    async fn delete(
        &self,
        kind: RelationshipKind,
        source: Uuid,
        target: Uuid,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let before = inner.entries.len();
        inner.entries.retain(|entry| {
            !(entry.relationship.kind == kind
                && entry.relationship.source_user_id == source
                && entry.relationship.target_user_id == target)
        });
        Ok((before - inner.entries.len()) as u64)
    }

    async fn list_by_source(
        &self,
        kind: RelationshipKind,
        source: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Relationship>, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut matching: Vec<&Entry> = inner
            .entries
            .iter()
            .filter(|entry| {
                entry.relationship.kind == kind && entry.relationship.source_user_id == source
            })
            .collect();
        // Newest first; insertion sequence breaks created_at ties.
        matching.sort_by(|a, b| {
            b.relationship
                .created_at
                .cmp(&a.relationship.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        let offset = usize::try_from(offset.max(0)).unwrap_or(0);
        let limit = usize::try_from(limit.max(0)).unwrap_or(0);
        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|entry| entry.relationship.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::models::MuteDuration;

    fn new_block(source: Uuid, target: Uuid) -> NewRelationship {
        NewRelationship {
            kind: RelationshipKind::Block,
            source_user_id: source,
            target_user_id: target,
            duration: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn insert_enforces_pair_uniqueness() {
        let store = MemoryRelationshipStore::new();
        let (source, target) = (Uuid::new_v4(), Uuid::new_v4());

        store
            .insert(new_block(source, target))
            .await
            .expect("first insert");
        let err = store
            .insert(new_block(source, target))
            .await
            .expect_err("duplicate insert");
        assert!(matches!(err, StoreError::UniqueViolation));

        // Same pair, other kind is a distinct key.
        store
            .insert(NewRelationship {
                kind: RelationshipKind::Mute,
                source_user_id: source,
                target_user_id: target,
                duration: Some(MuteDuration::Permanent),
                expires_at: None,
            })
            .await
            .expect("mute insert");
        assert_eq!(store.row_count(), 2);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_paginated() {
        let store = MemoryRelationshipStore::new();
        let source = Uuid::new_v4();
        let targets: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

        for target in &targets {
            store
                .insert(new_block(source, *target))
                .await
                .expect("insert");
        }

        let page = store
            .list_by_source(RelationshipKind::Block, source, 2, 0)
            .await
            .expect("list");
        let ids: Vec<Uuid> = page.iter().map(|r| r.target_user_id).collect();
        assert_eq!(ids, vec![targets[3], targets[2]]);

        let rest = store
            .list_by_source(RelationshipKind::Block, source, 10, 2)
            .await
            .expect("list");
        let ids: Vec<Uuid> = rest.iter().map(|r| r.target_user_id).collect();
        assert_eq!(ids, vec![targets[1], targets[0]]);
    }

    #[tokio::test]
    async fn delete_reports_rows_affected() {
        let store = MemoryRelationshipStore::new();
        let (source, target) = (Uuid::new_v4(), Uuid::new_v4());

        store
            .insert(new_block(source, target))
            .await
            .expect("insert");
        assert_eq!(
            store
                .delete(RelationshipKind::Block, source, target)
                .await
                .expect("delete"),
            1
        );
        assert_eq!(
            store
                .delete(RelationshipKind::Block, source, target)
                .await
                .expect("delete"),
            0
        );
    }
}
