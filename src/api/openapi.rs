use super::handlers::{auth, health, sso_admin, sync};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
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
/// Routes added outside (like `/` or `OPTIONS /health`) are intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::refresh::refresh))
        .routes(routes!(auth::me::me))
        .routes(routes!(auth::me::account))
        .routes(routes!(auth::password::change_password))
        .routes(routes!(auth::password::reset_password))
        .routes(routes!(auth::sso::providers))
        .routes(routes!(auth::sso::authorize))
        .routes(routes!(auth::sso::callback))
        .routes(routes!(sso_admin::list, sso_admin::create))
        .routes(routes!(
            sso_admin::get_one,
            sso_admin::update,
            sso_admin::delete
        ))
        .routes(routes!(sso_admin::toggle))
        .routes(routes!(sso_admin::test))
        .routes(routes!(sync::callback))
        .routes(routes!(sync::admin_logs));

    // utoipa-axum 0.1 has no mutable accessor for the document, so take it
    // out, adjust it and re-unite it with the routes via an empty-doc merge.
    let mut openapi = router.to_openapi();
    let components = openapi.components.get_or_insert_with(Default::default);
    components.add_security_scheme(
        "bearer",
        SecurityScheme::Http(
            HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .build(),
        ),
    );

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Credentials, sessions and profiles".to_string());

    let mut sso_tag = Tag::new("sso");
    sso_tag.description = Some("Federated login".to_string());

    let mut sso_admin_tag = Tag::new("sso-admin");
    sso_admin_tag.description = Some("Identity provider administration".to_string());

    let mut sync_tag = Tag::new("sync");
    sync_tag.description = Some("Trusted directory sync gateway".to_string());

    openapi.tags = Some(vec![auth_tag, sso_tag, sso_admin_tag, sync_tag]);

    OpenApiRouter::with_openapi(openapi).merge(router)
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(non_empty(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // First entry of the `;` separated Cargo authors, "Name <email>" form.
    let author = env!("CARGO_PKG_AUTHORS").split(';').next()?.trim();

    let (name, email) = match author.split_once('<') {
        Some((name, rest)) => (
            non_empty_owned(name),
            non_empty_owned(rest.trim_end_matches('>')),
        ),
        None => (non_empty_owned(author), None),
    };

    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name;
    contact.email = email;
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = non_empty(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn non_empty(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn non_empty_owned(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Dejoro"));
            assert_eq!(contact.email.as_deref(), Some("team@dejoro.dev"));
        }

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
            assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        assert!(tags.iter().any(|tag| tag.name == "sync"));

        for path in [
            "/auth/login",
            "/auth/refresh",
            "/auth/me",
            "/auth/accounts/{id}",
            "/auth/change-password",
            "/auth/reset-password",
            "/auth/sso/providers",
            "/auth/sso/authorize/{provider}",
            "/auth/sso/callback/{provider}",
            "/sso",
            "/sso/{id}",
            "/sso/{id}/toggle",
            "/sso/{id}/test",
            "/sync/callback",
            "/sync/admin/logs",
            "/health",
        ] {
            assert!(
                spec.paths.paths.contains_key(path),
                "missing documented path: {path}"
            );
        }
    }

    #[test]
    fn openapi_registers_bearer_scheme() {
        let spec = openapi();
        let components = spec.components.unwrap();

        assert!(components.security_schemes.contains_key("bearer"));
    }
}
