//! # Kerno (Identity, Accounts & Moderation)
//!
//! `kerno` is the identity/account subsystem of a social platform. It owns
//! user records, linked OAuth/credential accounts, sessions, audit logging,
//! privacy/notification settings and the block/mute moderation relationships,
//! served over an HTTP API backed by PostgreSQL.
//!
//! ## Sessions
//!
//! Login handshakes (passwords, OAuth) happen in an external auth
//! collaborator. That collaborator issues sessions through
//! [`identity::sessions::SessionRepo::create`], which returns the raw bearer
//! token exactly once; only a SHA-256 hash is stored. Handlers resolve
//! presented tokens back to a principal.
//!
//! ## Moderation
//!
//! Blocks and mutes are directed (source → target) relationships with
//! idempotent creation: re-creating an existing relationship returns the
//! stored row unchanged. Temporary mutes carry an `expires_at` computed from
//! their duration tag and expire **lazily**: rows are never swept; reads
//! compare the timestamp against the clock. A page of the mute listing can
//! therefore legitimately hold fewer entries than its limit when expired
//! rows occupy window slots.

pub mod api;
pub mod cli;
pub mod identity;
pub mod moderation;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
