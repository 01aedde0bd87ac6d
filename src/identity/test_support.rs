//! In-crate fakes for engine tests.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;
use uuid::Uuid;

use super::config::AuthConfig;
use super::directory::{AccountDirectory, ProfileStore};
use super::error::{DirectoryError, ProviderError};
use super::pending::PendingRoleStore;
use super::provider::IdentityProvider;
use super::service::{AuthService, Collaborators};
use super::types::{
    AuthMethod, Identity, IdentityMetadata, OtpRequest, Profile, Role, RoleLookup, Session,
};
use crate::storage::MemoryStore;

pub(crate) fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

pub(crate) fn identity(email: &str, method: AuthMethod, has_password: bool) -> Identity {
    Identity {
        id: Uuid::new_v4(),
        email: email.to_string(),
        method,
        has_password,
        email_verified: true,
        name: None,
        role: None,
    }
}

pub(crate) fn token_for(id: Uuid) -> String {
    format!("token-{id}")
}

struct FakeAccount {
    identity: Identity,
    password: Option<String>,
}

/// Identity provider double that records every call by operation name.
#[derive(Default)]
pub(crate) struct FakeProvider {
    accounts: Mutex<Vec<FakeAccount>>,
    calls: Mutex<Vec<&'static str>>,
    otp_requests: Mutex<Vec<OtpRequest>>,
    email_changes: Mutex<Vec<String>>,
    revoked: Mutex<Vec<String>>,
    failure: Mutex<Option<ProviderError>>,
    hang: AtomicBool,
}

impl FakeProvider {
    pub(crate) fn add_account(&self, identity: Identity, password: Option<&str>) {
        self.accounts.lock().unwrap().push(FakeAccount {
            identity,
            password: password.map(ToString::to_string),
        });
    }

    pub(crate) fn add_password_account(
        &self,
        id: Uuid,
        email: &str,
        password: &str,
        role: Option<Role>,
    ) -> Identity {
        let identity = Identity {
            id,
            role,
            ..identity(email, AuthMethod::Email, true)
        };
        self.add_account(identity.clone(), Some(password));
        identity
    }

    pub(crate) fn session_for(&self, identity: &Identity) -> Session {
        Session {
            access_token: secret(&token_for(identity.id)),
            refresh_token: None,
            expires_in: Some(3600),
            identity: identity.clone(),
        }
    }

    pub(crate) fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    pub(crate) fn otp_requests(&self) -> Vec<OtpRequest> {
        self.otp_requests.lock().unwrap().clone()
    }

    pub(crate) fn email_changes(&self) -> Vec<String> {
        self.email_changes.lock().unwrap().clone()
    }

    pub(crate) fn identity(&self, id: Uuid) -> Option<Identity> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|account| account.identity.id == id)
            .map(|account| account.identity.clone())
    }

    pub(crate) fn is_revoked(&self, token: &str) -> bool {
        self.revoked.lock().unwrap().iter().any(|t| t == token)
    }

    pub(crate) fn fail_with(&self, err: ProviderError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub(crate) fn clear_failure(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub(crate) fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    fn record(&self, operation: &'static str) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(operation);
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn enter(&self, operation: &'static str) -> Result<(), ProviderError> {
        self.record(operation)?;
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn with_identity<T>(&self, id: Uuid, f: impl FnOnce(&mut FakeAccount) -> T) -> Option<T> {
        self.accounts
            .lock()
            .unwrap()
            .iter_mut()
            .find(|account| account.identity.id == id)
            .map(f)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn password_sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, ProviderError> {
        self.enter("password_sign_in").await?;
        let identity = self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|account| {
                account.identity.email == email
                    && account.password.as_deref() == Some(password.expose_secret())
            })
            .map(|account| account.identity.clone())
            .ok_or(ProviderError::InvalidCredentials)?;
        let token = token_for(identity.id);
        self.revoked.lock().unwrap().retain(|t| *t != token);
        Ok(self.session_for(&identity))
    }

    fn federated_sign_in_url(
        &self,
        provider: &str,
        redirect_url: &str,
    ) -> Result<Url, ProviderError> {
        self.record("federated_sign_in_url")?;
        Url::parse_with_params(
            "https://provider.test/authorize",
            &[("provider", provider), ("redirect_to", redirect_url)],
        )
        .map_err(|err| ProviderError::InvalidResponse(err.to_string()))
    }

    async fn otp_sign_in(
        &self,
        request: &OtpRequest,
        _redirect_url: &str,
    ) -> Result<(), ProviderError> {
        self.enter("otp_sign_in").await?;
        self.otp_requests.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn update_password(
        &self,
        identity_id: Uuid,
        new_password: &SecretString,
    ) -> Result<(), ProviderError> {
        self.enter("update_password").await?;
        let password = new_password.expose_secret().to_string();
        self.with_identity(identity_id, |account| {
            account.password = Some(password);
            account.identity.has_password = true;
        })
        .ok_or(ProviderError::Rejected {
            status: 404,
            message: "user not found".to_string(),
        })
    }

    async fn request_password_reset(
        &self,
        _email: &str,
        _redirect_url: &str,
    ) -> Result<(), ProviderError> {
        self.enter("request_password_reset").await
    }

    async fn update_email(
        &self,
        _access_token: &SecretString,
        new_email: &str,
        _redirect_url: &str,
    ) -> Result<(), ProviderError> {
        self.enter("update_email").await?;
        self.email_changes.lock().unwrap().push(new_email.to_string());
        Ok(())
    }

    async fn session_identity(
        &self,
        access_token: &SecretString,
    ) -> Result<Identity, ProviderError> {
        self.enter("session_identity").await?;
        let token = access_token.expose_secret();
        let unauthorized = ProviderError::Rejected {
            status: 401,
            message: "invalid JWT".to_string(),
        };
        if self.is_revoked(token) {
            return Err(unauthorized);
        }
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|account| token_for(account.identity.id) == token)
            .map(|account| account.identity.clone())
            .ok_or(unauthorized)
    }

    async fn identity_metadata(
        &self,
        identity_id: Uuid,
    ) -> Result<IdentityMetadata, ProviderError> {
        self.enter("identity_metadata").await?;
        self.identity(identity_id)
            .map(|identity| IdentityMetadata {
                email_verified: identity.email_verified,
                has_password: identity.has_password,
            })
            .ok_or(ProviderError::Rejected {
                status: 404,
                message: "user not found".to_string(),
            })
    }

    async fn bind_role(&self, identity_id: Uuid, role: Role) -> Result<(), ProviderError> {
        self.enter("bind_role").await?;
        self.with_identity(identity_id, |account| account.identity.role = Some(role));
        Ok(())
    }

    async fn sign_out(&self, access_token: &SecretString) -> Result<(), ProviderError> {
        self.enter("sign_out").await?;
        self.revoked
            .lock()
            .unwrap()
            .push(access_token.expose_secret().to_string());
        Ok(())
    }

    async fn health(&self) -> Result<(), ProviderError> {
        self.enter("health").await
    }
}

/// Wraps a [`MemoryStore`], recording directory reads and optionally failing
/// every call.
#[derive(Default)]
pub(crate) struct RecordingDirectory {
    pub(crate) store: MemoryStore,
    calls: Mutex<Vec<&'static str>>,
    broken: AtomicBool,
}

impl RecordingDirectory {
    pub(crate) fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    pub(crate) fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    fn record(&self, operation: &'static str) -> Result<(), DirectoryError> {
        self.calls.lock().unwrap().push(operation);
        if self.broken.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountDirectory for RecordingDirectory {
    async fn email_exists(&self, email: &str) -> Result<bool, DirectoryError> {
        self.record("email_exists")?;
        self.store.email_exists(email).await
    }

    async fn role_for(&self, email: &str) -> Result<RoleLookup, DirectoryError> {
        self.record("role_for")?;
        self.store.role_for(email).await
    }

    async fn has_password(&self, email: &str) -> Result<bool, DirectoryError> {
        self.record("has_password")?;
        self.store.has_password(email).await
    }
}

#[async_trait]
impl ProfileStore for RecordingDirectory {
    async fn get(&self, id: Uuid) -> Result<Option<Profile>, DirectoryError> {
        self.record("get_profile")?;
        ProfileStore::get(&self.store, id).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Profile>, DirectoryError> {
        self.record("get_profile_by_email")?;
        self.store.get_by_email(email).await
    }

    async fn upsert(&self, profile: &Profile) -> Result<Profile, DirectoryError> {
        self.record("upsert_profile")?;
        self.store.upsert(profile).await
    }

    async fn bind_role(&self, id: Uuid, role: Role) -> Result<bool, DirectoryError> {
        self.record("bind_role")?;
        self.store.bind_role(id, role).await
    }

    async fn mark_password_set(&self, id: Uuid) -> Result<(), DirectoryError> {
        self.record("mark_password_set")?;
        self.store.mark_password_set(id).await
    }
}

#[async_trait]
impl PendingRoleStore for RecordingDirectory {
    async fn get(&self, browser_key: &str) -> Result<Option<Role>, DirectoryError> {
        self.record("get_pending_role")?;
        PendingRoleStore::get(&self.store, browser_key).await
    }

    async fn set(&self, browser_key: &str, role: Role) -> Result<(), DirectoryError> {
        self.record("set_pending_role")?;
        self.store.set(browser_key, role).await
    }

    async fn delete(&self, browser_key: &str) -> Result<(), DirectoryError> {
        self.record("delete_pending_role")?;
        self.store.delete(browser_key).await
    }
}

/// Service wired to one recording store and a fake provider.
pub(crate) struct Harness {
    pub(crate) store: Arc<RecordingDirectory>,
    pub(crate) provider: Arc<FakeProvider>,
    pub(crate) service: AuthService,
}

pub(crate) fn harness() -> Harness {
    harness_with(AuthConfig::new("https://staykey.test".to_string()))
}

pub(crate) fn harness_with(config: AuthConfig) -> Harness {
    let store = Arc::new(RecordingDirectory::default());
    let provider = Arc::new(FakeProvider::default());
    let service = AuthService::new(
        config,
        Collaborators {
            directory: store.clone(),
            profiles: store.clone(),
            pending: store.clone(),
            provider: provider.clone(),
        },
    );
    Harness {
        store,
        provider,
        service,
    }
}
