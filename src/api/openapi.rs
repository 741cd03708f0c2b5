use super::handlers::{accounts, audit, health, me, moderation, sessions, settings, users};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec.
/// Routes added outside (like `/` or `OPTIONS /health`) are intentionally not
/// documented.
pub(crate) fn api_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the
    // route to OpenAPI.
    let mut base = cargo_openapi();

    let mut identity_tag = Tag::new("me");
    identity_tag.description = Some("Authenticated self-service".to_string());

    let mut moderation_tag = Tag::new("moderation");
    moderation_tag.description = Some("Blocks and mutes".to_string());

    let mut users_tag = Tag::new("users");
    users_tag.description = Some("Public profiles".to_string());

    // Tags are document metadata independent of the routes; `routes()` only
    // merges paths/components and never touches `tags`, so setting them on the
    // base document yields the same OpenAPI as mutating the built router would.
    base.tags = Some(vec![identity_tag, moderation_tag, users_tag]);

    let router = OpenApiRouter::with_openapi(base)
        .routes(routes!(health::health))
        .routes(routes!(users::get_user))
        .routes(routes!(users::get_user_by_username))
        .routes(routes!(me::get_me))
        .routes(routes!(me::patch_me))
        .routes(routes!(me::delete_me))
        .routes(routes!(sessions::list_sessions))
        .routes(routes!(sessions::revoke_session))
        .routes(routes!(sessions::revoke_other_sessions))
        .routes(routes!(accounts::list_accounts))
        .routes(routes!(accounts::password_eligibility))
        .routes(routes!(accounts::unlink_account))
        .routes(routes!(settings::get_privacy))
        .routes(routes!(settings::patch_privacy))
        .routes(routes!(settings::get_notifications))
        .routes(routes!(settings::patch_notifications))
        .routes(routes!(audit::list_audit_logs))
        .routes(routes!(moderation::block_user))
        .routes(routes!(moderation::unblock_user))
        .routes(routes!(moderation::block_status))
        .routes(routes!(moderation::list_blocked))
        .routes(routes!(moderation::mute_user))
        .routes(routes!(moderation::unmute_user))
        .routes(routes!(moderation::mute_status))
        .routes(routes!(moderation::list_muted));

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn moderation_routes_are_documented() {
        let spec = openapi();
        let paths = &spec.paths.paths;
        assert!(paths.contains_key("/v1/me/blocks/{user_id}"));
        assert!(paths.contains_key("/v1/me/mutes/{user_id}"));
        assert!(paths.contains_key("/v1/me/blocks"));
        assert!(paths.contains_key("/v1/me/mutes"));
        assert!(paths.contains_key("/health"));
    }

    #[test]
    fn parse_author_splits_name_and_email() {
        assert_eq!(
            parse_author("Team Kerno <team@kerno.dev>"),
            (Some("Team Kerno"), Some("team@kerno.dev"))
        );
        assert_eq!(parse_author("Team Kerno"), (Some("Team Kerno"), None));
        assert_eq!(parse_author(""), (None, None));
    }
}
