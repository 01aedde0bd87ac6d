//! The client-facing surface of the engine.

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use url::Url;

use super::config::AuthConfig;
use super::directory::{AccountDirectory, ProfileStore};
use super::email_change::EmailChange;
use super::error::{AuthError, DirectoryError, ProviderError};
use super::gate::CredentialGate;
use super::oauth::{BindOutcome, OAuthRoleBinding};
use super::password::PasswordProvisioning;
use super::pending::PendingRoleStore;
use super::provider::IdentityProvider;
use super::registration::RegistrationFlow;
use super::session::{Bootstrap, SessionEvent, SessionOrchestrator};
use super::types::{Identity, RegistrationIntent, Role, Route, Session};
use super::utils::{directory_call, provider_call};

/// External collaborators the engine runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn AccountDirectory>,
    pub profiles: Arc<dyn ProfileStore>,
    pub pending: Arc<dyn PendingRoleStore>,
    pub provider: Arc<dyn IdentityProvider>,
}

pub struct AuthService {
    config: AuthConfig,
    directory: Arc<dyn AccountDirectory>,
    provider: Arc<dyn IdentityProvider>,
    gate: CredentialGate,
    registration: RegistrationFlow,
    oauth: Arc<OAuthRoleBinding>,
    passwords: PasswordProvisioning,
    sessions: SessionOrchestrator,
    email: EmailChange,
}

impl AuthService {
    #[must_use]
    pub fn new(config: AuthConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            directory,
            profiles,
            pending,
            provider,
        } = collaborators;
        let oauth = Arc::new(OAuthRoleBinding::new(
            pending,
            profiles.clone(),
            provider.clone(),
            config.clone(),
        ));
        Self {
            gate: CredentialGate::new(directory.clone(), provider.clone(), config.call_timeout()),
            registration: RegistrationFlow::new(
                directory.clone(),
                provider.clone(),
                config.clone(),
            ),
            passwords: PasswordProvisioning::new(
                provider.clone(),
                profiles.clone(),
                config.clone(),
            ),
            sessions: SessionOrchestrator::new(profiles, oauth.clone(), config.clone()),
            email: EmailChange::new(provider.clone(), config.clone()),
            oauth,
            directory,
            provider,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn timeout(&self) -> Duration {
        self.config.call_timeout()
    }

    /// # Errors
    /// See [`CredentialGate::attempt_login`].
    pub async fn attempt_login(
        &self,
        email: &str,
        password: &SecretString,
        role: Role,
    ) -> Result<Session, AuthError> {
        self.gate.attempt_login(email, password, role).await
    }

    /// # Errors
    /// See [`RegistrationFlow::start_registration`].
    pub async fn start_registration(
        &self,
        email: &str,
        display_name: &str,
        role: Role,
    ) -> Result<RegistrationIntent, AuthError> {
        self.registration
            .start_registration(email, display_name, role)
            .await
    }

    /// # Errors
    /// See [`RegistrationFlow::resend`].
    pub async fn resend_verification(
        &self,
        intent: &RegistrationIntent,
    ) -> Result<RegistrationIntent, AuthError> {
        self.registration.resend(intent).await
    }

    pub async fn resend_available_in(&self, email: &str) -> Option<Duration> {
        self.registration.resend_available_in(email).await
    }

    /// # Errors
    /// See [`RegistrationFlow::resume_registration`].
    pub async fn resume_registration(&self, email: &str) -> Result<(), AuthError> {
        self.registration.resume_registration(email).await
    }

    /// # Errors
    /// See [`OAuthRoleBinding::begin_oauth`].
    pub async fn begin_oauth(
        &self,
        browser_key: &str,
        provider: &str,
        role: Role,
    ) -> Result<Url, AuthError> {
        self.oauth.begin_oauth(browser_key, provider, role).await
    }

    /// # Errors
    /// See [`OAuthRoleBinding::complete_oauth_callback`].
    pub async fn complete_oauth_callback(
        &self,
        browser_key: &str,
        identity: &Identity,
    ) -> Result<BindOutcome, AuthError> {
        self.oauth.complete_oauth_callback(browser_key, identity).await
    }

    pub async fn session_event(
        &self,
        event: SessionEvent,
        browser_key: Option<&str>,
        current_path: &str,
    ) -> Bootstrap {
        self.sessions.handle(event, browser_key, current_path).await
    }

    /// Build a session from tokens handed back by a provider redirect.
    ///
    /// The identity comes from the token; password and verification flags are
    /// then refreshed from the provider's privileged metadata lookup.
    ///
    /// # Errors
    /// [`AuthError::LinkExpiredOrInvalid`] when the provider refuses the
    /// token, [`AuthError::ProviderError`] otherwise.
    pub async fn resolve_session(
        &self,
        access_token: SecretString,
        refresh_token: Option<SecretString>,
        expires_in: Option<u64>,
    ) -> Result<Session, AuthError> {
        let mut identity = self.identity_for(&access_token).await?;
        match provider_call(
            "identity_metadata",
            self.timeout(),
            self.provider.identity_metadata(identity.id),
        )
        .await
        {
            Ok(metadata) => {
                identity.has_password = metadata.has_password;
                identity.email_verified = metadata.email_verified;
            }
            Err(err) => warn!(email = %identity.email, "identity metadata lookup failed: {err}"),
        }
        Ok(Session {
            access_token,
            refresh_token,
            expires_in,
            identity,
        })
    }

    /// Identity behind an access token.
    ///
    /// # Errors
    /// [`AuthError::LinkExpiredOrInvalid`] when the provider refuses the
    /// token, [`AuthError::ProviderError`] otherwise.
    pub async fn identity_for(&self, access_token: &SecretString) -> Result<Identity, AuthError> {
        provider_call(
            "session_identity",
            self.timeout(),
            self.provider.session_identity(access_token),
        )
        .await
        .map_err(|err| match err {
            ProviderError::Rejected { status, message } if (400..500).contains(&status) => {
                AuthError::LinkExpiredOrInvalid {
                    code: status.to_string(),
                    description: message,
                }
            }
            err => {
                error!(operation = "session_identity", "provider failure: {err}");
                AuthError::ProviderError
            }
        })
    }

    /// Set the first password, then sign the session out. Returns the route
    /// the client must go to next.
    ///
    /// # Errors
    /// See [`PasswordProvisioning::set_password`].
    pub async fn set_password(
        &self,
        session: &Session,
        password: &SecretString,
        confirmation: &SecretString,
    ) -> Result<Route, AuthError> {
        let route = self
            .passwords
            .set_password(session, password, confirmation)
            .await?;
        self.sessions
            .handle(
                SessionEvent::SignedOut {
                    identity_id: Some(session.identity.id),
                },
                None,
                route.path(),
            )
            .await;
        Ok(route)
    }

    /// # Errors
    /// See [`PasswordProvisioning::request_password_reset`].
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        self.passwords.request_password_reset(email).await
    }

    /// # Errors
    /// See [`EmailChange::request_email_change`].
    pub async fn request_email_change(
        &self,
        session: &Session,
        new_email: &str,
    ) -> Result<(), AuthError> {
        self.email.request_email_change(session, new_email).await
    }

    /// End the provider session and emit the signed-out event.
    pub async fn sign_out(&self, session: &Session) -> Bootstrap {
        if let Err(err) = provider_call(
            "sign_out",
            self.timeout(),
            self.provider.sign_out(&session.access_token),
        )
        .await
        {
            warn!(email = %session.identity.email, "provider sign-out failed: {err}");
        }
        self.sessions
            .handle(
                SessionEvent::SignedOut {
                    identity_id: Some(session.identity.id),
                },
                None,
                Route::Landing.path(),
            )
            .await
    }

    /// # Errors
    /// Returns the directory failure, if any.
    pub async fn directory_health(&self) -> Result<(), DirectoryError> {
        directory_call("ping", self.timeout(), self.directory.ping()).await
    }

    /// # Errors
    /// Returns the provider failure, if any.
    pub async fn provider_health(&self) -> Result<(), ProviderError> {
        provider_call("health", self.timeout(), self.provider.health()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::test_support::{harness, identity, secret};
    use crate::identity::types::{AuthMethod, Profile};
    use anyhow::Result;
    use uuid::Uuid;

    #[tokio::test]
    async fn tenant_scenario_orders_role_before_password() -> Result<()> {
        let h = harness();
        let id = Uuid::new_v4();
        h.provider
            .add_password_account(id, "a@x.com", "right-password", Some(Role::Tenant));
        h.store
            .store
            .insert(Profile {
                id,
                email: "a@x.com".to_string(),
                role: Some(Role::Tenant),
                display_name: "A".to_string(),
                phone: None,
                has_password: true,
            })
            .await;

        assert_eq!(
            h.service
                .attempt_login("a@x.com", &secret("wrong"), Role::Tenant)
                .await
                .err(),
            Some(AuthError::InvalidPassword)
        );
        assert_eq!(
            h.service
                .attempt_login("a@x.com", &secret("wrong"), Role::Traveler)
                .await
                .err(),
            Some(AuthError::RoleMismatch {
                actual: Role::Tenant
            })
        );

        let session = h
            .service
            .attempt_login("a@x.com", &secret("right-password"), Role::Tenant)
            .await?;
        let boot = h
            .service
            .session_event(SessionEvent::SignedIn(session), None, "/login")
            .await;
        assert_eq!(boot.redirect, Some(Route::TenantDashboard));
        Ok(())
    }

    #[tokio::test]
    async fn set_password_terminates_session() -> Result<()> {
        let h = harness();
        let user = identity("m@x.com", AuthMethod::Email, false);
        h.provider.add_account(user.clone(), None);
        let session = h.provider.session_for(&user);
        let boot = h
            .service
            .session_event(SessionEvent::SignedIn(session.clone()), None, "/")
            .await;
        assert!(boot.password_setup_required);

        let route = h
            .service
            .set_password(&session, &secret("new password"), &secret("new password"))
            .await?;
        assert_eq!(route, Route::Login);
        assert!(h.service.identity_for(&session.access_token).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn resolve_session_reads_provider_flags() -> Result<()> {
        let h = harness();
        let user = identity("m@x.com", AuthMethod::Email, false);
        h.provider.add_account(user.clone(), None);
        h.provider
            .update_password(user.id, &secret("already set"))
            .await?;

        let session = h
            .service
            .resolve_session(secret(&crate::identity::test_support::token_for(user.id)), None, None)
            .await?;
        assert!(session.identity.has_password);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_token_is_an_invalid_link() {
        let h = harness();
        let result = h.service.resolve_session(secret("bogus"), None, None).await;
        assert!(matches!(
            result,
            Err(AuthError::LinkExpiredOrInvalid { .. })
        ));
    }

    #[tokio::test]
    async fn health_reports_each_collaborator() {
        let h = harness();
        assert!(h.service.directory_health().await.is_ok());
        h.provider
            .fail_with(ProviderError::Unavailable("down".to_string()));
        assert!(h.service.provider_health().await.is_err());
    }
}
