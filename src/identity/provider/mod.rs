//! Identity provider adapter.
//!
//! Wraps the provider operations the engine depends on. No business logic:
//! every call returns success or a typed [`ProviderError`].

mod gotrue;

pub use gotrue::{GoTrueConfig, GoTrueProvider};

use async_trait::async_trait;
use secrecy::SecretString;
use url::Url;
use uuid::Uuid;

use super::error::ProviderError;
use super::types::{Identity, IdentityMetadata, OtpRequest, Role, Session};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn password_sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, ProviderError>;

    /// URL the browser is sent to for a federated sign-in. No direct return.
    fn federated_sign_in_url(&self, provider: &str, redirect_url: &str)
    -> Result<Url, ProviderError>;

    async fn otp_sign_in(&self, request: &OtpRequest, redirect_url: &str)
    -> Result<(), ProviderError>;

    async fn update_password(
        &self,
        identity_id: Uuid,
        new_password: &SecretString,
    ) -> Result<(), ProviderError>;

    async fn request_password_reset(
        &self,
        email: &str,
        redirect_url: &str,
    ) -> Result<(), ProviderError>;

    /// Starts the double-confirmation email change for the session's identity.
    async fn update_email(
        &self,
        access_token: &SecretString,
        new_email: &str,
        redirect_url: &str,
    ) -> Result<(), ProviderError>;

    /// Resolve the identity behind an access token.
    async fn session_identity(&self, access_token: &SecretString)
    -> Result<Identity, ProviderError>;

    /// Privileged lookup usable before full authentication.
    async fn identity_metadata(&self, identity_id: Uuid)
    -> Result<IdentityMetadata, ProviderError>;

    /// Write the role into the identity's provider metadata.
    async fn bind_role(&self, identity_id: Uuid, role: Role) -> Result<(), ProviderError>;

    async fn sign_out(&self, access_token: &SecretString) -> Result<(), ProviderError>;

    async fn health(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
