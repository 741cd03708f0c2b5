//! API handlers for Kerno.
//!
//! This module organizes the service's route handlers and the shared
//! principal (session) resolution they authenticate with.

pub mod accounts;
pub mod audit;
pub mod health;
pub mod me;
pub mod moderation;
pub mod principal;
pub mod sessions;
pub mod settings;
pub mod users;

use axum::response::{IntoResponse, Json};
use serde_json::json;

/// Undocumented `/` route: service identity for humans and load balancers.
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
