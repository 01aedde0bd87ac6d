//! Shared handler state and the cookie-session registry.

use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::utils::{generate_session_token, hash_session_token};
use crate::identity::{AuthConfig, AuthService, Session};

pub struct AuthState {
    service: AuthService,
    sessions: SessionRegistry,
}

impl AuthState {
    #[must_use]
    pub fn new(service: AuthService) -> Self {
        let ttl = service.config().session_ttl();
        Self {
            service,
            sessions: SessionRegistry::new(ttl),
        }
    }

    #[must_use]
    pub fn service(&self) -> &AuthService {
        &self.service
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        self.service.config()
    }

    pub(super) fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }
}

struct SessionEntry {
    session: Session,
    created_at: Instant,
}

/// Provider sessions keyed by the SHA-256 of the opaque cookie token.
pub(super) struct SessionRegistry {
    ttl: Duration,
    entries: Mutex<HashMap<Vec<u8>, SessionEntry>>,
}

impl SessionRegistry {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store a session and return the raw token for the cookie.
    pub(super) async fn create(&self, session: Session) -> Result<String> {
        let token = generate_session_token()?;
        let mut entries = self.entries.lock().await;
        self.prune(&mut entries);
        entries.insert(
            hash_session_token(&token),
            SessionEntry {
                session,
                created_at: Instant::now(),
            },
        );
        Ok(token)
    }

    pub(super) async fn lookup(&self, token: &str) -> Option<Session> {
        let mut entries = self.entries.lock().await;
        self.prune(&mut entries);
        entries
            .get(&hash_session_token(token))
            .map(|entry| entry.session.clone())
    }

    pub(super) async fn revoke(&self, token: &str) -> Option<Session> {
        let mut entries = self.entries.lock().await;
        entries
            .remove(&hash_session_token(token))
            .map(|entry| entry.session)
    }

    /// Drop every session of one identity, e.g. after its credentials changed.
    pub(super) async fn revoke_identity(&self, identity_id: Uuid) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.session.identity.id != identity_id);
        before - entries.len()
    }

    fn prune(&self, entries: &mut HashMap<Vec<u8>, SessionEntry>) {
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.created_at.elapsed() < ttl);
    }
}
