//! Domain types shared by the identity engine, its collaborators, and the API.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Account role. An email is bound to at most one role for its lifetime.
#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Traveler,
    Tenant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Traveler => "traveler",
            Self::Tenant => "tenant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "traveler" => Ok(Self::Traveler),
            "tenant" => Ok(Self::Tenant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// How an identity authenticates with the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    /// Email based: password or magic link.
    Email,
    /// Federated redirect provider, e.g. `google`.
    Federated(String),
}

impl AuthMethod {
    #[must_use]
    pub fn from_provider_tag(tag: &str) -> Self {
        match tag.trim() {
            "" | "email" | "password" => Self::Email,
            other => Self::Federated(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_federated(&self) -> bool {
        matches!(self, Self::Federated(_))
    }
}

/// Provider-side principal. Only the provider mutates it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub method: AuthMethod,
    pub has_password: bool,
    pub email_verified: bool,
    /// Display name attached at signup time, if any.
    pub name: Option<String>,
    /// Role attached to provider metadata, if any.
    pub role: Option<Role>,
}

/// Private metadata answered by the provider's privileged lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityMetadata {
    pub email_verified: bool,
    pub has_password: bool,
}

/// An authenticated provider session.
#[derive(Clone, Debug)]
pub struct Session {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_in: Option<u64>,
    pub identity: Identity,
}

/// Application-side record bound 1:1 to an identity.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub role: Option<Role>,
    pub display_name: String,
    pub phone: Option<String>,
    pub has_password: bool,
}

impl Profile {
    /// Build the first profile for an identity from the metadata it carries.
    #[must_use]
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            role: identity.role,
            display_name: identity.name.clone().unwrap_or_default(),
            phone: None,
            has_password: identity.has_password,
        }
    }
}

/// Result of a directory role query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoleLookup {
    pub exists: bool,
    pub role: Option<Role>,
}

/// Metadata attached to a magic-link send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtpRequest {
    pub email: String,
    pub name: Option<String>,
    pub role: Option<Role>,
    /// `false` only sends to an identity that already exists.
    pub create_user: bool,
}

/// Client-held state created when the signup form is submitted.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RegistrationIntent {
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

/// Application routes the engine may navigate to.
#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Landing,
    TravelerHome,
    TenantDashboard,
    Login,
    VerifyEmail,
    PasswordReset,
    Profile,
    AuthCallback,
}

impl Route {
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::TravelerHome => "/explore",
            Self::TenantDashboard => "/tenant/dashboard",
            Self::Login => "/login",
            Self::VerifyEmail => "/verify-email",
            Self::PasswordReset => "/reset-password",
            Self::Profile => "/profile",
            Self::AuthCallback => "/auth/callback",
        }
    }

    /// Routes where a user may be mid-flow and must not be redirected.
    #[must_use]
    pub fn is_redirect_exempt(path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        [Self::PasswordReset, Self::Profile, Self::AuthCallback]
            .iter()
            .any(|route| route.path() == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitive() {
        assert_eq!("Tenant".parse::<Role>(), Ok(Role::Tenant));
        assert_eq!(" traveler ".parse::<Role>(), Ok(Role::Traveler));
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_lowercase() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&Role::Tenant)?, "\"tenant\"");
        Ok(())
    }

    #[test]
    fn auth_method_from_provider_tag() {
        assert_eq!(AuthMethod::from_provider_tag("email"), AuthMethod::Email);
        assert_eq!(
            AuthMethod::from_provider_tag("google"),
            AuthMethod::Federated("google".to_string())
        );
        assert!(!AuthMethod::from_provider_tag("").is_federated());
    }

    #[test]
    fn redirect_exempt_routes() {
        assert!(Route::is_redirect_exempt("/reset-password"));
        assert!(Route::is_redirect_exempt("/profile?email_changed=true"));
        assert!(Route::is_redirect_exempt("/auth/callback/"));
        assert!(!Route::is_redirect_exempt("/"));
        assert!(!Route::is_redirect_exempt("/login"));
    }
}
