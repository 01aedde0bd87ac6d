//! Federated sign-in role binding.
//!
//! The role is captured before the browser leaves for the provider and
//! applied once the provider hands control back. The two requests share no
//! memory, only the [`PendingRoleStore`].

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use super::config::AuthConfig;
use super::directory::ProfileStore;
use super::error::{AuthError, DirectoryError};
use super::pending::PendingRoleStore;
use super::provider::IdentityProvider;
use super::types::{Identity, Profile, Role, Route};
use super::utils::{directory_call, provider_call};

/// What a callback did with the pending selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindOutcome {
    /// The pending role was bound to the identity and its profile.
    Bound(Role),
    /// A role was already bound; the pending selection was discarded.
    AlreadyBound(Role),
    /// Nothing was pending for this browser.
    NoSelection,
}

pub struct OAuthRoleBinding {
    pending: Arc<dyn PendingRoleStore>,
    profiles: Arc<dyn ProfileStore>,
    provider: Arc<dyn IdentityProvider>,
    config: AuthConfig,
}

impl OAuthRoleBinding {
    #[must_use]
    pub fn new(
        pending: Arc<dyn PendingRoleStore>,
        profiles: Arc<dyn ProfileStore>,
        provider: Arc<dyn IdentityProvider>,
        config: AuthConfig,
    ) -> Self {
        Self {
            pending,
            profiles,
            provider,
            config,
        }
    }

    fn timeout(&self) -> Duration {
        self.config.call_timeout()
    }

    /// Persist the intended role, then build the provider redirect.
    ///
    /// # Errors
    /// [`AuthError::InvalidInput`] for a provider that is not enabled,
    /// [`AuthError::DirectoryUnavailable`] when the selection cannot be
    /// stored, [`AuthError::ProviderError`] when no redirect can be built.
    pub async fn begin_oauth(
        &self,
        browser_key: &str,
        provider: &str,
        role: Role,
    ) -> Result<Url, AuthError> {
        let provider = provider.trim().to_lowercase();
        if !self.config.oauth_provider_allowed(&provider) {
            return Err(AuthError::InvalidInput(format!(
                "unsupported sign-in provider: {provider}"
            )));
        }

        directory_call(
            "set_pending_role",
            self.timeout(),
            self.pending.set(browser_key, role),
        )
        .await
        .map_err(|err| store_failure("set_pending_role", &err))?;

        let redirect = self.config.route_url(Route::AuthCallback);
        match self.provider.federated_sign_in_url(&provider, &redirect) {
            Ok(url) => {
                info!(provider = %provider, %role, "federated sign-in started");
                Ok(url)
            }
            Err(err) => {
                error!(
                    operation = "federated_sign_in",
                    provider = %provider,
                    "provider failure: {err}"
                );
                self.discard(browser_key).await;
                Err(AuthError::ProviderError)
            }
        }
    }

    /// Apply the pending selection for `browser_key` to `identity`.
    ///
    /// Safe to call any number of times for the same sign-in: once a role is
    /// bound, later calls discard the selection and report
    /// [`BindOutcome::AlreadyBound`].
    ///
    /// # Errors
    /// Infrastructure failures only. The selection is kept on failure so a
    /// replayed callback can finish the binding.
    pub async fn complete_oauth_callback(
        &self,
        browser_key: &str,
        identity: &Identity,
    ) -> Result<BindOutcome, AuthError> {
        let selection = directory_call(
            "get_pending_role",
            self.timeout(),
            self.pending.get(browser_key),
        )
        .await
        .map_err(|err| store_failure("get_pending_role", &err))?;
        let Some(role) = selection else {
            return Ok(BindOutcome::NoSelection);
        };

        let profile = directory_call("get_profile", self.timeout(), self.profiles.get(identity.id))
            .await
            .map_err(|err| store_failure("get_profile", &err))?;
        if let Some(bound) = profile.as_ref().and_then(|profile| profile.role) {
            if bound != role {
                info!(
                    identity_id = %identity.id,
                    %bound,
                    pending = %role,
                    "discarding pending role"
                );
            }
            self.discard(browser_key).await;
            return Ok(BindOutcome::AlreadyBound(bound));
        }

        provider_call(
            "bind_role",
            self.timeout(),
            self.provider.bind_role(identity.id, role),
        )
        .await
        .map_err(|err| {
            error!(operation = "bind_role", email = %identity.email, "provider failure: {err}");
            AuthError::ProviderError
        })?;

        let outcome = if profile.is_some() {
            let bound = directory_call(
                "bind_role",
                self.timeout(),
                self.profiles.bind_role(identity.id, role),
            )
            .await
            .map_err(|err| store_failure("bind_role", &err))?;
            if bound {
                BindOutcome::Bound(role)
            } else {
                // A concurrent callback won the conditional write.
                self.current_role(identity, role).await?
            }
        } else {
            let created = Profile {
                role: Some(role),
                ..Profile::from_identity(identity)
            };
            let stored = directory_call(
                "upsert_profile",
                self.timeout(),
                self.profiles.upsert(&created),
            )
            .await
            .map_err(|err| store_failure("upsert_profile", &err))?;
            match stored.role {
                Some(bound) if bound != role => BindOutcome::AlreadyBound(bound),
                _ => BindOutcome::Bound(role),
            }
        };

        self.discard(browser_key).await;
        if let BindOutcome::Bound(role) = outcome {
            info!(identity_id = %identity.id, %role, "role bound after federated sign-in");
        }
        Ok(outcome)
    }

    async fn current_role(
        &self,
        identity: &Identity,
        fallback: Role,
    ) -> Result<BindOutcome, AuthError> {
        let profile = directory_call("get_profile", self.timeout(), self.profiles.get(identity.id))
            .await
            .map_err(|err| store_failure("get_profile", &err))?;
        Ok(BindOutcome::AlreadyBound(
            profile.and_then(|profile| profile.role).unwrap_or(fallback),
        ))
    }

    async fn discard(&self, browser_key: &str) {
        if let Err(err) = directory_call(
            "delete_pending_role",
            self.timeout(),
            self.pending.delete(browser_key),
        )
        .await
        {
            warn!("failed to delete pending role selection: {err}");
        }
    }
}

fn store_failure(operation: &str, err: &DirectoryError) -> AuthError {
    error!(operation, "directory failure: {err}");
    AuthError::DirectoryUnavailable
}
