//! Session bootstrap: reacts to provider session events, loads or creates
//! the profile, and picks the landing route.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::AuthConfig;
use super::directory::ProfileStore;
use super::oauth::{BindOutcome, OAuthRoleBinding};
use super::types::{AuthMethod, Identity, Profile, Role, Route, Session};
use super::utils::directory_call;

#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// Application load, with the session found at that time.
    InitialLoad(Option<Session>),
    SignedIn(Session),
    SignedOut { identity_id: Option<Uuid> },
}

/// What the client should do after a session event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bootstrap {
    pub profile: Option<Profile>,
    /// `None` leaves the user where they are.
    pub redirect: Option<Route>,
    pub password_setup_required: bool,
    pub role_binding: Option<BindOutcome>,
}

pub struct SessionOrchestrator {
    profiles: Arc<dyn ProfileStore>,
    oauth: Arc<OAuthRoleBinding>,
    config: AuthConfig,
    cache: RwLock<HashMap<Uuid, Profile>>,
}

impl SessionOrchestrator {
    #[must_use]
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        oauth: Arc<OAuthRoleBinding>,
        config: AuthConfig,
    ) -> Self {
        Self {
            profiles,
            oauth,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Handle one session event. Never fails: profile errors degrade to the
    /// traveler default.
    ///
    /// `browser_key` scopes the pending role selection and `current_path` is
    /// the route the user is on.
    pub async fn handle(
        &self,
        event: SessionEvent,
        browser_key: Option<&str>,
        current_path: &str,
    ) -> Bootstrap {
        match event {
            SessionEvent::InitialLoad(None) => Bootstrap::default(),
            SessionEvent::InitialLoad(Some(session)) | SessionEvent::SignedIn(session) => {
                self.signed_in(&session.identity, browser_key, current_path)
                    .await
            }
            SessionEvent::SignedOut { identity_id } => {
                let mut cache = self.cache.write().await;
                match identity_id {
                    Some(id) => {
                        cache.remove(&id);
                    }
                    None => cache.clear(),
                }
                debug!("signed out");
                Bootstrap {
                    redirect: Some(Route::Landing),
                    ..Bootstrap::default()
                }
            }
        }
    }

    /// Profile cached by the last sign-in event for `id`.
    pub async fn cached_profile(&self, id: Uuid) -> Option<Profile> {
        self.cache.read().await.get(&id).cloned()
    }

    async fn signed_in(
        &self,
        identity: &Identity,
        browser_key: Option<&str>,
        current_path: &str,
    ) -> Bootstrap {
        // Role binding applies to federated sign-ins only.
        let role_binding = match (identity.method.is_federated(), browser_key) {
            (true, Some(browser_key)) => {
                match self.oauth.complete_oauth_callback(browser_key, identity).await {
                    Ok(outcome) => Some(outcome),
                    Err(err) => {
                        error!(email = %identity.email, "role binding failed: {err}");
                        None
                    }
                }
            }
            _ => None,
        };

        let profile = self.load_or_create(identity).await;
        if let Some(profile) = &profile {
            self.cache
                .write()
                .await
                .insert(profile.id, profile.clone());
        }

        let redirect = if Route::is_redirect_exempt(current_path) {
            None
        } else if profile.as_ref().and_then(|p| p.role) == Some(Role::Tenant) {
            Some(Route::TenantDashboard)
        } else {
            Some(Route::TravelerHome)
        };

        let has_password =
            identity.has_password || profile.as_ref().is_some_and(|p| p.has_password);
        let password_setup_required = identity.method == AuthMethod::Email && !has_password;

        info!(
            identity_id = %identity.id,
            redirect = redirect.map(Route::path),
            password_setup_required,
            "session bootstrapped"
        );
        Bootstrap {
            profile,
            redirect,
            password_setup_required,
            role_binding,
        }
    }

    async fn load_or_create(&self, identity: &Identity) -> Option<Profile> {
        let timeout = self.config.call_timeout();
        match directory_call("get_profile", timeout, self.profiles.get(identity.id)).await {
            Ok(Some(profile)) if !profile.email.eq_ignore_ascii_case(&identity.email) => {
                // Directory reads key on the email, so follow a confirmed change.
                let moved = Profile {
                    email: identity.email.clone(),
                    ..profile.clone()
                };
                let stored = self.profiles.upsert(&moved);
                match directory_call("upsert_profile", timeout, stored).await {
                    Ok(profile) => {
                        info!(identity_id = %identity.id, "profile email updated");
                        Some(profile)
                    }
                    Err(err) => {
                        warn!(email = %identity.email, "failed to update profile email: {err}");
                        Some(profile)
                    }
                }
            }
            Ok(Some(profile)) => Some(profile),
            Ok(None) => {
                let created = Profile::from_identity(identity);
                let stored = self.profiles.upsert(&created);
                match directory_call("upsert_profile", timeout, stored).await {
                    Ok(profile) => {
                        info!(identity_id = %identity.id, "profile created on first sign-in");
                        Some(profile)
                    }
                    Err(err) => {
                        warn!(email = %identity.email, "failed to create profile: {err}");
                        None
                    }
                }
            }
            Err(err) => {
                warn!(email = %identity.email, "failed to load profile: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::directory::AccountDirectory;
    use crate::identity::pending::PendingRoleStore;
    use crate::identity::test_support::{FakeProvider, RecordingDirectory, identity};
    use anyhow::Result;

    fn orchestrator() -> (SessionOrchestrator, Arc<RecordingDirectory>, Arc<FakeProvider>) {
        let store = Arc::new(RecordingDirectory::default());
        let provider = Arc::new(FakeProvider::default());
        let config = AuthConfig::new("https://staykey.test".to_string());
        let oauth = Arc::new(OAuthRoleBinding::new(
            store.clone(),
            store.clone(),
            provider.clone(),
            config.clone(),
        ));
        (
            SessionOrchestrator::new(store.clone(), oauth, config),
            store,
            provider,
        )
    }

    #[tokio::test]
    async fn tenant_lands_on_dashboard() {
        let (orchestrator, store, provider) = orchestrator();
        let user = identity("t@x.com", AuthMethod::Email, true);
        store
            .store
            .insert(Profile {
                role: Some(Role::Tenant),
                ..Profile::from_identity(&user)
            })
            .await;

        let boot = orchestrator
            .handle(SessionEvent::SignedIn(provider.session_for(&user)), None, "/login")
            .await;
        assert_eq!(boot.redirect, Some(Route::TenantDashboard));
        assert!(!boot.password_setup_required);
        assert!(orchestrator.cached_profile(user.id).await.is_some());
    }

    #[tokio::test]
    async fn sign_in_moves_profile_to_confirmed_email() -> Result<()> {
        let (orchestrator, store, provider) = orchestrator();
        let user = identity("new@x.com", AuthMethod::Email, true);
        store
            .store
            .insert(Profile {
                email: "old@x.com".to_string(),
                role: Some(Role::Tenant),
                ..Profile::from_identity(&user)
            })
            .await;

        let boot = orchestrator
            .handle(SessionEvent::SignedIn(provider.session_for(&user)), None, "/login")
            .await;
        let profile = boot.profile.ok_or_else(|| anyhow::anyhow!("no profile"))?;
        assert_eq!(profile.email, "new@x.com");
        assert_eq!(profile.role, Some(Role::Tenant));
        assert_eq!(boot.redirect, Some(Route::TenantDashboard));
        assert!(store.store.email_exists("new@x.com").await?);
        assert!(!store.store.email_exists("old@x.com").await?);
        assert_eq!(store.store.profile_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn exempt_routes_are_not_redirected() {
        let (orchestrator, _, provider) = orchestrator();
        let user = identity("t@x.com", AuthMethod::Email, true);
        for path in ["/reset-password", "/profile?email_changed=true", "/auth/callback"] {
            let boot = orchestrator
                .handle(SessionEvent::SignedIn(provider.session_for(&user)), None, path)
                .await;
            assert_eq!(boot.redirect, None, "{path}");
        }
    }

    #[tokio::test]
    async fn magic_link_sign_in_creates_profile_and_requires_password() -> Result<()> {
        let (orchestrator, store, provider) = orchestrator();
        let user = Identity {
            name: Some("Budi".to_string()),
            role: Some(Role::Traveler),
            ..identity("b@x.com", AuthMethod::Email, false)
        };

        let boot = orchestrator
            .handle(
                SessionEvent::InitialLoad(Some(provider.session_for(&user))),
                None,
                "/verify-email",
            )
            .await;
        assert_eq!(boot.redirect, Some(Route::TravelerHome));
        assert!(boot.password_setup_required);
        let profile = boot.profile.ok_or_else(|| anyhow::anyhow!("no profile"))?;
        assert_eq!(profile.display_name, "Budi");
        assert_eq!(profile.role, Some(Role::Traveler));
        assert_eq!(store.store.profile_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn federated_sign_in_binds_pending_role() -> Result<()> {
        let (orchestrator, store, provider) = orchestrator();
        let user = identity("g@x.com", AuthMethod::Federated("google".to_string()), false);
        provider.add_account(user.clone(), None);
        store.store.set("browser-1", Role::Tenant).await?;

        let boot = orchestrator
            .handle(
                SessionEvent::SignedIn(provider.session_for(&user)),
                Some("browser-1"),
                "/",
            )
            .await;
        assert_eq!(boot.role_binding, Some(BindOutcome::Bound(Role::Tenant)));
        assert_eq!(boot.redirect, Some(Route::TenantDashboard));
        assert!(!boot.password_setup_required);
        Ok(())
    }

    #[tokio::test]
    async fn email_sign_in_skips_role_binding() -> Result<()> {
        let (orchestrator, store, provider) = orchestrator();
        let user = identity("e@x.com", AuthMethod::Email, true);
        store.store.set("browser-1", Role::Tenant).await?;

        let boot = orchestrator
            .handle(
                SessionEvent::SignedIn(provider.session_for(&user)),
                Some("browser-1"),
                "/",
            )
            .await;
        assert_eq!(boot.role_binding, None);
        assert_eq!(store.count("get_pending_role"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn profile_errors_degrade_to_traveler_default() {
        let (orchestrator, store, provider) = orchestrator();
        store.set_broken(true);
        let user = identity("t@x.com", AuthMethod::Email, true);
        let boot = orchestrator
            .handle(SessionEvent::SignedIn(provider.session_for(&user)), None, "/")
            .await;
        assert_eq!(boot.profile, None);
        assert_eq!(boot.redirect, Some(Route::TravelerHome));
    }

    #[tokio::test]
    async fn sign_out_clears_cache_and_goes_home() {
        let (orchestrator, _, provider) = orchestrator();
        let user = identity("t@x.com", AuthMethod::Email, true);
        orchestrator
            .handle(SessionEvent::SignedIn(provider.session_for(&user)), None, "/")
            .await;
        assert!(orchestrator.cached_profile(user.id).await.is_some());

        let boot = orchestrator
            .handle(
                SessionEvent::SignedOut {
                    identity_id: Some(user.id),
                },
                None,
                "/explore",
            )
            .await;
        assert_eq!(boot.redirect, Some(Route::Landing));
        assert!(orchestrator.cached_profile(user.id).await.is_none());
    }

    #[tokio::test]
    async fn initial_load_without_session_does_nothing() {
        let (orchestrator, store, _) = orchestrator();
        let boot = orchestrator
            .handle(SessionEvent::InitialLoad(None), None, "/")
            .await;
        assert_eq!(boot, Bootstrap::default());
        assert_eq!(store.count("get_profile"), 0);
    }
}
