//! Engine configuration.

use std::time::Duration;

use super::types::Route;

const DEFAULT_RESEND_COOLDOWN_SECONDS: u64 = 10;
const DEFAULT_CALL_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_SESSION_TTL_SECONDS: u64 = 12 * 60 * 60;
const DEFAULT_PASSWORD_MIN_LENGTH: usize = 8;
const DEFAULT_OAUTH_PROVIDER: &str = "google";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    resend_cooldown: Duration,
    call_timeout: Duration,
    session_ttl: Duration,
    password_min_length: usize,
    oauth_providers: Vec<String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            resend_cooldown: Duration::from_secs(DEFAULT_RESEND_COOLDOWN_SECONDS),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECONDS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
            password_min_length: DEFAULT_PASSWORD_MIN_LENGTH,
            oauth_providers: vec![DEFAULT_OAUTH_PROVIDER.to_string()],
        }
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: u64) -> Self {
        self.resend_cooldown = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_call_timeout_seconds(mut self, seconds: u64) -> Self {
        // A zero timeout would fail every call.
        self.call_timeout = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_password_min_length(mut self, length: usize) -> Self {
        self.password_min_length = length;
        self
    }

    #[must_use]
    pub fn with_oauth_providers(mut self, providers: Vec<String>) -> Self {
        self.oauth_providers = providers
            .into_iter()
            .map(|provider| provider.trim().to_lowercase())
            .filter(|provider| !provider.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn resend_cooldown(&self) -> Duration {
        self.resend_cooldown
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn password_min_length(&self) -> usize {
        self.password_min_length
    }

    #[must_use]
    pub fn oauth_providers(&self) -> &[String] {
        &self.oauth_providers
    }

    #[must_use]
    pub fn oauth_provider_allowed(&self, provider: &str) -> bool {
        let provider = provider.trim().to_lowercase();
        self.oauth_providers.iter().any(|allowed| *allowed == provider)
    }

    /// Absolute frontend URL for an application route.
    #[must_use]
    pub fn route_url(&self, route: Route) -> String {
        let base = self.frontend_base_url.trim_end_matches('/');
        format!("{base}{}", route.path())
    }

    pub(crate) fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}
