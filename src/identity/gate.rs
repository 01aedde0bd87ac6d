//! Credential gate: decides how a login attempt proceeds before any
//! credential reaches the identity provider.

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::directory::AccountDirectory;
use super::error::{AuthError, DirectoryError, InvalidTransition, ProviderError};
use super::provider::IdentityProvider;
use super::types::{Role, Session};
use super::utils::{directory_call, normalize_email, provider_call, valid_email};

/// Login flow state, driven by [`LoginEvent`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LoginState {
    #[default]
    Idle,
    CheckingCredentials,
    IncompleteRegistration {
        email: String,
    },
    Authenticating,
    Authenticated,
    Error(AuthError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginEvent {
    Submit,
    ChecksPassed,
    Rejected(AuthError),
    SignedIn,
    Reset,
}

impl LoginState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingCredentials => "checking_credentials",
            Self::IncompleteRegistration { .. } => "incomplete_registration",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Error(_) => "error",
        }
    }

    /// Apply an event. Illegal events leave the state untouched.
    ///
    /// # Errors
    /// Returns [`InvalidTransition`] when the event is not legal in this state.
    pub fn apply(&mut self, event: LoginEvent) -> Result<(), InvalidTransition> {
        let next = match (&*self, event) {
            (_, LoginEvent::Reset) => Self::Idle,
            (
                Self::Idle | Self::Error(_) | Self::IncompleteRegistration { .. },
                LoginEvent::Submit,
            ) => Self::CheckingCredentials,
            (Self::CheckingCredentials, LoginEvent::ChecksPassed) => Self::Authenticating,
            (
                Self::CheckingCredentials,
                LoginEvent::Rejected(AuthError::IncompleteRegistration { email }),
            ) => Self::IncompleteRegistration { email },
            (Self::CheckingCredentials | Self::Authenticating, LoginEvent::Rejected(err)) => {
                Self::Error(err)
            }
            (Self::Authenticating, LoginEvent::SignedIn) => Self::Authenticated,
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

impl LoginEvent {
    const fn name(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::ChecksPassed => "checks_passed",
            Self::Rejected(_) => "rejected",
            Self::SignedIn => "signed_in",
            Self::Reset => "reset",
        }
    }
}

fn advance(state: &mut LoginState, event: LoginEvent) {
    if let Err(err) = state.apply(event) {
        warn!("login state: {err}");
    }
}

pub struct CredentialGate {
    directory: Arc<dyn AccountDirectory>,
    provider: Arc<dyn IdentityProvider>,
    call_timeout: Duration,
}

impl CredentialGate {
    #[must_use]
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        provider: Arc<dyn IdentityProvider>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            provider,
            call_timeout,
        }
    }

    /// Decide and, when allowed, perform a password login for `requested` role.
    ///
    /// Checks run in order and stop at the first decisive answer: unknown
    /// email, role mismatch, missing password, then the provider sign-in.
    ///
    /// # Errors
    /// Returns exactly one [`AuthError`] describing why the login did not
    /// authenticate.
    pub async fn attempt_login(
        &self,
        email: &str,
        password: &SecretString,
        requested: Role,
    ) -> Result<Session, AuthError> {
        let mut state = LoginState::Idle;
        self.drive(&mut state, email, password, requested).await
    }

    /// Same as [`Self::attempt_login`], moving `state` through the login
    /// state machine along the way.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidInput`] when a login is already in
    /// progress for `state`, otherwise the login outcome.
    pub async fn drive(
        &self,
        state: &mut LoginState,
        email: &str,
        password: &SecretString,
        requested: Role,
    ) -> Result<Session, AuthError> {
        state
            .apply(LoginEvent::Submit)
            .map_err(|err| AuthError::InvalidInput(err.to_string()))?;

        let email = match self.check(email, requested).await {
            Ok(email) => email,
            Err(err) => {
                advance(state, LoginEvent::Rejected(err.clone()));
                return Err(err);
            }
        };
        advance(state, LoginEvent::ChecksPassed);

        match self.sign_in(&email, password).await {
            Ok(session) => {
                advance(state, LoginEvent::SignedIn);
                Ok(session)
            }
            Err(err) => {
                advance(state, LoginEvent::Rejected(err.clone()));
                Err(err)
            }
        }
    }

    /// Directory checks. Returns the normalized email when sign-in may proceed.
    async fn check(&self, email: &str, requested: Role) -> Result<String, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::UnknownEmail);
        }

        let exists = directory_call(
            "email_exists",
            self.call_timeout,
            self.directory.email_exists(&email),
        )
        .await
        .map_err(|err| directory_failure("email_exists", &email, &err))?;
        if !exists {
            debug!(email = %email, "login rejected: unknown email");
            return Err(AuthError::UnknownEmail);
        }

        let lookup = directory_call("role_for", self.call_timeout, self.directory.role_for(&email))
            .await
            .map_err(|err| directory_failure("role_for", &email, &err))?;
        if !lookup.exists {
            // Removed between the two reads.
            return Err(AuthError::UnknownEmail);
        }
        if let Some(actual) = lookup.role.filter(|actual| *actual != requested) {
            info!(email = %email, %actual, %requested, "login rejected: role mismatch");
            return Err(AuthError::RoleMismatch { actual });
        }

        let has_password = directory_call(
            "has_password",
            self.call_timeout,
            self.directory.has_password(&email),
        )
        .await
        .map_err(|err| directory_failure("has_password", &email, &err))?;
        if !has_password {
            debug!(email = %email, "login rejected: registration incomplete");
            return Err(AuthError::IncompleteRegistration { email });
        }

        Ok(email)
    }

    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Session, AuthError> {
        match provider_call(
            "password_sign_in",
            self.call_timeout,
            self.provider.password_sign_in(email, password),
        )
        .await
        {
            Ok(session) => {
                info!(email, identity_id = %session.identity.id, "password login succeeded");
                Ok(session)
            }
            Err(ProviderError::InvalidCredentials) => {
                debug!(email, "login rejected: invalid password");
                Err(AuthError::InvalidPassword)
            }
            Err(err) => {
                error!(operation = "password_sign_in", email, "provider failure: {err}");
                Err(AuthError::ProviderError)
            }
        }
    }
}

pub(crate) fn directory_failure(operation: &str, email: &str, err: &DirectoryError) -> AuthError {
    error!(operation, email, "directory failure: {err}");
    AuthError::DirectoryUnavailable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::test_support::{FakeProvider, RecordingDirectory, secret};
    use crate::identity::types::Profile;
    use anyhow::Result;
    use uuid::Uuid;

    async fn gate_with(
        email: &str,
        role: Option<Role>,
        has_password: bool,
    ) -> (CredentialGate, Arc<RecordingDirectory>, Arc<FakeProvider>) {
        let directory = Arc::new(RecordingDirectory::default());
        let provider = Arc::new(FakeProvider::default());
        let id = Uuid::new_v4();
        directory
            .store
            .insert(Profile {
                id,
                email: email.to_string(),
                role,
                display_name: "A".to_string(),
                phone: None,
                has_password,
            })
            .await;
        provider.add_password_account(id, email, "correct-horse", role);
        let gate = CredentialGate::new(directory.clone(), provider.clone(), Duration::from_secs(5));
        (gate, directory, provider)
    }

    #[tokio::test]
    async fn unknown_email_never_reaches_provider() {
        let (gate, _, provider) = gate_with("a@x.com", Some(Role::Tenant), true).await;
        for email in ["nobody@x.com", "B@X.COM", "not-an-email"] {
            let result = gate
                .attempt_login(email, &secret("correct-horse"), Role::Tenant)
                .await;
            assert_eq!(result.err(), Some(AuthError::UnknownEmail));
        }
        assert_eq!(provider.count("password_sign_in"), 0);
    }

    #[tokio::test]
    async fn role_check_precedes_password_check() {
        let (gate, directory, provider) = gate_with("a@x.com", Some(Role::Tenant), true).await;

        let wrong_role = gate
            .attempt_login("a@x.com", &secret("wrong"), Role::Traveler)
            .await;
        assert_eq!(
            wrong_role.err(),
            Some(AuthError::RoleMismatch {
                actual: Role::Tenant
            })
        );
        assert_eq!(directory.count("has_password"), 0);
        assert_eq!(provider.count("password_sign_in"), 0);

        let wrong_password = gate
            .attempt_login("a@x.com", &secret("wrong"), Role::Tenant)
            .await;
        assert_eq!(wrong_password.err(), Some(AuthError::InvalidPassword));
        assert_eq!(provider.count("password_sign_in"), 1);
    }

    #[tokio::test]
    async fn missing_password_is_incomplete_for_any_password() {
        let (gate, _, provider) = gate_with("c@x.com", Some(Role::Traveler), false).await;
        for password in ["", "correct-horse", "anything"] {
            let result = gate
                .attempt_login(" C@x.com", &secret(password), Role::Traveler)
                .await;
            assert_eq!(
                result.err(),
                Some(AuthError::IncompleteRegistration {
                    email: "c@x.com".to_string()
                })
            );
        }
        assert_eq!(provider.count("password_sign_in"), 0);
    }

    #[tokio::test]
    async fn correct_password_authenticates() -> Result<()> {
        let (gate, _, _) = gate_with("a@x.com", Some(Role::Tenant), true).await;
        let session = gate
            .attempt_login("a@x.com", &secret("correct-horse"), Role::Tenant)
            .await?;
        assert_eq!(session.identity.email, "a@x.com");
        Ok(())
    }

    #[tokio::test]
    async fn unbound_role_does_not_block_login() -> Result<()> {
        let (gate, _, _) = gate_with("a@x.com", None, true).await;
        gate.attempt_login("a@x.com", &secret("correct-horse"), Role::Traveler)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn provider_outage_is_provider_error() {
        let (gate, _, provider) = gate_with("a@x.com", Some(Role::Tenant), true).await;
        provider.fail_with(ProviderError::Unavailable("down".to_string()));
        let result = gate
            .attempt_login("a@x.com", &secret("correct-horse"), Role::Tenant)
            .await;
        assert_eq!(result.err(), Some(AuthError::ProviderError));
    }

    #[tokio::test]
    async fn directory_outage_is_directory_unavailable() {
        let (gate, directory, provider) = gate_with("a@x.com", Some(Role::Tenant), true).await;
        directory.set_broken(true);
        let result = gate
            .attempt_login("a@x.com", &secret("correct-horse"), Role::Tenant)
            .await;
        assert_eq!(result.err(), Some(AuthError::DirectoryUnavailable));
        assert_eq!(provider.count("password_sign_in"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_provider_is_bounded() {
        let (gate, _, provider) = gate_with("a@x.com", Some(Role::Tenant), true).await;
        provider.set_hang(true);
        let result = gate
            .attempt_login("a@x.com", &secret("correct-horse"), Role::Tenant)
            .await;
        assert_eq!(result.err(), Some(AuthError::ProviderError));
    }

    #[tokio::test]
    async fn drive_tracks_login_state() -> Result<()> {
        let (gate, _, _) = gate_with("c@x.com", Some(Role::Traveler), false).await;
        let mut state = LoginState::Idle;
        let result = gate
            .drive(&mut state, "c@x.com", &secret("x"), Role::Traveler)
            .await;
        assert!(result.is_err());
        assert_eq!(
            state,
            LoginState::IncompleteRegistration {
                email: "c@x.com".to_string()
            }
        );

        let (gate, _, _) = gate_with("a@x.com", Some(Role::Tenant), true).await;
        let mut state = LoginState::Idle;
        gate.drive(&mut state, "a@x.com", &secret("correct-horse"), Role::Tenant)
            .await?;
        assert_eq!(state, LoginState::Authenticated);
        Ok(())
    }

    #[test]
    fn illegal_transitions_leave_state_unchanged() {
        let mut state = LoginState::Authenticating;
        let err = state.apply(LoginEvent::Submit);
        assert_eq!(
            err,
            Err(InvalidTransition {
                state: "authenticating",
                event: "submit"
            })
        );
        assert_eq!(state, LoginState::Authenticating);

        let mut state = LoginState::Idle;
        assert!(state.apply(LoginEvent::SignedIn).is_err());
        assert_eq!(state, LoginState::Idle);

        let mut state = LoginState::Error(AuthError::InvalidPassword);
        assert!(state.apply(LoginEvent::Submit).is_ok());
        assert_eq!(state, LoginState::CheckingCredentials);
        assert!(state.apply(LoginEvent::Reset).is_ok());
        assert_eq!(state, LoginState::Idle);
    }
}
