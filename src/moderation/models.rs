use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which directed relationship a row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    Block,
    Mute,
}

impl RelationshipKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Mute => "mute",
        }
    }
}

/// How long a mute lasts. Persisted as the textual tag; redundant with the
/// computed `expires_at` but kept for display and auditability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum MuteDuration {
    #[serde(rename = "permanent")]
    Permanent,
    #[serde(rename = "24h")]
    Hours24,
    #[serde(rename = "7d")]
    Days7,
    #[serde(rename = "30d")]
    Days30,
}

impl MuteDuration {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Hours24 => "24h",
            Self::Days7 => "7d",
            Self::Days30 => "30d",
        }
    }

    /// Parse the persisted `mute_duration` tag.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "permanent" => Some(Self::Permanent),
            "24h" => Some(Self::Hours24),
            "7d" => Some(Self::Days7),
            "30d" => Some(Self::Days30),
            _ => None,
        }
    }

    /// Expiry timestamp for a mute created at `now`. Permanent mutes never
    /// expire and carry no timestamp.
    #[must_use]
    pub fn expires_at(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Permanent => None,
            Self::Hours24 => Some(now + Duration::hours(24)),
            Self::Days7 => Some(now + Duration::days(7)),
            Self::Days30 => Some(now + Duration::days(30)),
        }
    }
}

/// A directed (source → target) block or mute between two users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: Uuid,
    pub kind: RelationshipKind,
    pub source_user_id: Uuid,
    pub target_user_id: Uuid,
    /// Mute only; `None` for blocks.
    pub duration: Option<MuteDuration>,
    /// Mute only; `None` means permanent. Blocks never expire.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Whether the relationship is active at `now`. Expired mute rows stay in
    /// storage but read as inactive.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_tags_round_trip() {
        for duration in [
            MuteDuration::Permanent,
            MuteDuration::Hours24,
            MuteDuration::Days7,
            MuteDuration::Days30,
        ] {
            assert_eq!(MuteDuration::parse(duration.as_str()), Some(duration));
        }
        assert_eq!(MuteDuration::parse("14d"), None);
    }

    #[test]
    fn permanent_has_no_expiry() {
        let now = Utc::now();
        assert_eq!(MuteDuration::Permanent.expires_at(now), None);
    }

    #[test]
    fn timed_durations_expire_relative_to_now() {
        let now = Utc::now();
        assert_eq!(
            MuteDuration::Hours24.expires_at(now),
            Some(now + Duration::hours(24))
        );
        assert_eq!(
            MuteDuration::Days7.expires_at(now),
            Some(now + Duration::days(7))
        );
        assert_eq!(
            MuteDuration::Days30.expires_at(now),
            Some(now + Duration::days(30))
        );
    }

    #[test]
    fn activity_tracks_expiry_boundary() {
        let now = Utc::now();
        let relationship = Relationship {
            id: Uuid::new_v4(),
            kind: RelationshipKind::Mute,
            source_user_id: Uuid::new_v4(),
            target_user_id: Uuid::new_v4(),
            duration: Some(MuteDuration::Hours24),
            expires_at: Some(now + Duration::hours(24)),
            created_at: now,
        };

        assert!(relationship.is_active_at(now));
        // The boundary instant itself is no longer active.
        assert!(!relationship.is_active_at(now + Duration::hours(24)));
        assert!(!relationship.is_active_at(now + Duration::hours(25)));
    }
}
