//! Identity storage: users, sessions, linked accounts, audit logs and
//! per-user settings.
//!
//! Each repository is a thin set of parametrized queries over the pool;
//! transactions are used only where multiple rows must stay consistent
//! (account deletion, settings upserts).

pub mod accounts;
pub mod audit;
pub mod models;
pub mod sessions;
pub mod settings;
pub mod users;
