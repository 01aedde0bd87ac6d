//! Password provisioning for identities that started password-less, and
//! password reset requests.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::config::AuthConfig;
use super::directory::ProfileStore;
use super::error::{AuthError, InvalidTransition, ProviderError};
use super::provider::IdentityProvider;
use super::types::{Route, Session};
use super::utils::{directory_call, normalize_email, provider_call, valid_email};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PasswordSetupState {
    #[default]
    Idle,
    FormOpen {
        error: Option<String>,
    },
    Submitting,
    Success,
    ForcedSignOut,
    RedirectToLogin,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PasswordSetupEvent {
    Open,
    Close,
    Submit,
    Failed(String),
    Succeeded,
    SignedOut,
    Redirected,
}

impl PasswordSetupState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FormOpen { .. } => "form_open",
            Self::Submitting => "submitting",
            Self::Success => "success",
            Self::ForcedSignOut => "forced_sign_out",
            Self::RedirectToLogin => "redirect_to_login",
        }
    }

    /// # Errors
    /// Returns [`InvalidTransition`] and leaves the state unchanged when the
    /// event is not legal here.
    pub fn apply(&mut self, event: PasswordSetupEvent) -> Result<(), InvalidTransition> {
        let next = match (&*self, event) {
            (Self::Idle, PasswordSetupEvent::Open) => Self::FormOpen { error: None },
            (Self::FormOpen { .. }, PasswordSetupEvent::Close) => Self::Idle,
            (Self::FormOpen { .. }, PasswordSetupEvent::Submit) => Self::Submitting,
            (Self::Submitting, PasswordSetupEvent::Failed(error)) => Self::FormOpen {
                error: Some(error),
            },
            (Self::Submitting, PasswordSetupEvent::Succeeded) => Self::Success,
            (Self::Success, PasswordSetupEvent::SignedOut) => Self::ForcedSignOut,
            (Self::ForcedSignOut, PasswordSetupEvent::Redirected) => Self::RedirectToLogin,
            (state, event) => {
                return Err(InvalidTransition {
                    state: state.name(),
                    event: event.name(),
                });
            }
        };
        *self = next;
        Ok(())
    }
}

impl PasswordSetupEvent {
    const fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Submit => "submit",
            Self::Failed(_) => "failed",
            Self::Succeeded => "succeeded",
            Self::SignedOut => "signed_out",
            Self::Redirected => "redirected",
        }
    }
}

fn advance(state: &mut PasswordSetupState, event: PasswordSetupEvent) {
    if let Err(err) = state.apply(event) {
        warn!("password setup state: {err}");
    }
}

pub struct PasswordProvisioning {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    config: AuthConfig,
}

impl PasswordProvisioning {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        config: AuthConfig,
    ) -> Self {
        Self {
            provider,
            profiles,
            config,
        }
    }

    fn validate(
        &self,
        password: &SecretString,
        confirmation: &SecretString,
    ) -> Result<(), AuthError> {
        let min = self.config.password_min_length();
        if password.expose_secret().chars().count() < min {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {min} characters"
            )));
        }
        if password.expose_secret() != confirmation.expose_secret() {
            return Err(AuthError::InvalidInput("passwords do not match".to_string()));
        }
        Ok(())
    }

    /// Set the first password for the session's identity, then end the
    /// session. The caller must send the user to the returned route.
    ///
    /// # Errors
    /// [`AuthError::InvalidInput`] for a short or mismatched password or one
    /// the provider refuses, [`AuthError::ProviderError`] otherwise.
    pub async fn set_password(
        &self,
        session: &Session,
        password: &SecretString,
        confirmation: &SecretString,
    ) -> Result<Route, AuthError> {
        self.validate(password, confirmation)?;
        let identity = &session.identity;
        let timeout = self.config.call_timeout();

        provider_call(
            "update_password",
            timeout,
            self.provider.update_password(identity.id, password),
        )
        .await
        .map_err(|err| match err {
            ProviderError::Rejected { status, message } if (400..500).contains(&status) => {
                AuthError::InvalidInput(message)
            }
            err => {
                error!(
                    operation = "update_password",
                    email = %identity.email,
                    "provider failure: {err}"
                );
                AuthError::ProviderError
            }
        })?;

        if let Err(err) = directory_call(
            "mark_password_set",
            timeout,
            self.profiles.mark_password_set(identity.id),
        )
        .await
        {
            warn!(email = %identity.email, "failed to record password on profile: {err}");
        }

        // The live session predates the credential change; end it either way.
        if let Err(err) = provider_call(
            "sign_out",
            timeout,
            self.provider.sign_out(&session.access_token),
        )
        .await
        {
            warn!(email = %identity.email, "failed to sign out after password setup: {err}");
        }

        info!(identity_id = %identity.id, "password set, session ended");
        Ok(Route::Login)
    }

    /// [`Self::set_password`], moving `state` from `FormOpen` through to
    /// `RedirectToLogin`, or back to `FormOpen` with the error.
    ///
    /// # Errors
    /// Same as [`Self::set_password`]; also [`AuthError::InvalidInput`] when
    /// the form is not open.
    pub async fn drive(
        &self,
        state: &mut PasswordSetupState,
        session: &Session,
        password: &SecretString,
        confirmation: &SecretString,
    ) -> Result<Route, AuthError> {
        state
            .apply(PasswordSetupEvent::Submit)
            .map_err(|err| AuthError::InvalidInput(err.to_string()))?;
        match self.set_password(session, password, confirmation).await {
            Ok(route) => {
                advance(state, PasswordSetupEvent::Succeeded);
                advance(state, PasswordSetupEvent::SignedOut);
                advance(state, PasswordSetupEvent::Redirected);
                Ok(route)
            }
            Err(err) => {
                advance(state, PasswordSetupEvent::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    /// Ask the provider to email a reset link. Reports success for unknown
    /// emails too, so the endpoint cannot be used to probe accounts.
    ///
    /// # Errors
    /// [`AuthError::InvalidInput`] for a malformed email only.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("invalid email".to_string()));
        }
        let redirect = self.config.route_url(Route::PasswordReset);
        if let Err(err) = provider_call(
            "request_password_reset",
            self.config.call_timeout(),
            self.provider.request_password_reset(&email, &redirect),
        )
        .await
        {
            error!(operation = "request_password_reset", email = %email, "provider failure: {err}");
        }
        Ok(())
    }
}
