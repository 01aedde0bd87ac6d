use super::handlers::{
    auth::{email, login, oauth, password, registration, session},
    health,
};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Router that also drives the `OpenAPI` document. Endpoints registered with
/// `.routes(routes!(...))` are both served and documented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(login::login))
        .routes(routes!(registration::register))
        .routes(routes!(registration::resend_verification))
        .routes(routes!(registration::resume_registration))
        .routes(routes!(oauth::oauth_start))
        .routes(routes!(oauth::callback))
        .routes(routes!(session::session))
        .routes(routes!(session::logout))
        .routes(routes!(password::set_password))
        .routes(routes!(password::password_reset))
        .routes(routes!(email::change_email))
        .routes(routes!(email::return_notice));

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service and dependency health".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description =
        Some("Sign-in, registration, role binding and credential setup".to_string());

    router.get_openapi_mut().tags = Some(vec![health_tag, auth_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });

    OpenApiBuilder::new().info(info).build()
}

/// First entry of the `;` separated Cargo authors, as "Name <email>".
fn cargo_contact() -> Option<Contact> {
    let primary = env!("CARGO_PKG_AUTHORS").split(';').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn optional_str(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, email)) => (
            optional_str(name),
            optional_str(email.trim_end_matches('>')),
        ),
        None => (optional_str(author), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, "staykey");
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));

        let contact = doc.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Staykey"));
            assert_eq!(contact.email.as_deref(), Some("team@staykey.dev"));
        }

        assert_eq!(
            doc.info.license.map(|license| license.name),
            Some("BSD-3-Clause".to_string())
        );
    }

    #[test]
    fn openapi_documents_auth_routes() {
        let doc = openapi();
        let tags = doc.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "health"));
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        for path in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/register",
            "/v1/auth/resend-verification",
            "/v1/auth/resume-registration",
            "/v1/auth/oauth/start",
            "/v1/auth/callback",
            "/v1/auth/session",
            "/v1/auth/logout",
            "/v1/auth/password",
            "/v1/auth/password-reset",
            "/v1/auth/email",
            "/v1/auth/return-notice",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path}");
        }
    }

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Team Staykey <team@staykey.dev>"),
            (Some("Team Staykey"), Some("team@staykey.dev"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author("<only@mail>"), (None, Some("only@mail")));
        assert_eq!(parse_author(""), (None, None));
    }
}
