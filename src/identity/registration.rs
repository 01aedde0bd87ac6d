//! Magic-link registration, verification resends, and resuming an
//! incomplete registration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::config::AuthConfig;
use super::directory::AccountDirectory;
use super::error::AuthError;
use super::gate::directory_failure;
use super::provider::IdentityProvider;
use super::types::{OtpRequest, RegistrationIntent, Role, Route};
use super::utils::{directory_call, normalize_email, provider_call, valid_email};

// Entries idle for this long are pruned.
const PENDING_TTL: Duration = Duration::from_secs(60 * 60);

/// Countdown gating repeated verification sends.
#[derive(Clone, Copy, Debug)]
pub struct ResendCooldown {
    period: Duration,
    last_sent: Option<Instant>,
}

impl ResendCooldown {
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            last_sent: None,
        }
    }

    /// Time left before another send is allowed, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let last_sent = self.last_sent?;
        let remaining = self.period.saturating_sub(last_sent.elapsed());
        (!remaining.is_zero()).then_some(remaining)
    }

    /// # Errors
    /// Returns [`AuthError::CooldownActive`] while the countdown runs.
    pub fn ensure_ready(&self) -> Result<(), AuthError> {
        match self.remaining() {
            Some(retry_after) => Err(AuthError::CooldownActive { retry_after }),
            None => Ok(()),
        }
    }

    pub fn restart(&mut self) {
        self.last_sent = Some(Instant::now());
    }

    fn idle_for(&self) -> Duration {
        self.last_sent.map_or(Duration::ZERO, |sent| sent.elapsed())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SendState {
    InFlight,
    Sent,
}

#[derive(Debug)]
struct PendingRegistration {
    intent: RegistrationIntent,
    state: SendState,
    cooldown: ResendCooldown,
}

pub struct RegistrationFlow {
    directory: Arc<dyn AccountDirectory>,
    provider: Arc<dyn IdentityProvider>,
    config: AuthConfig,
    pending: Mutex<HashMap<String, PendingRegistration>>,
    resumes: Mutex<HashMap<String, ResendCooldown>>,
}

impl RegistrationFlow {
    #[must_use]
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        provider: Arc<dyn IdentityProvider>,
        config: AuthConfig,
    ) -> Self {
        Self {
            directory,
            provider,
            config,
            pending: Mutex::new(HashMap::new()),
            resumes: Mutex::new(HashMap::new()),
        }
    }

    /// Start a magic-link registration.
    ///
    /// A repeated submission for an email whose first send is still in flight
    /// or inside its cooldown returns the existing intent without sending
    /// again, so one email never requests two identities.
    ///
    /// # Errors
    /// [`AuthError::InvalidInput`] for a malformed email or empty name,
    /// [`AuthError::EmailAlreadyRegistered`] when the directory knows the
    /// email, and the infrastructure errors.
    pub async fn start_registration(
        &self,
        email: &str,
        display_name: &str,
        role: Role,
    ) -> Result<RegistrationIntent, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("invalid email".to_string()));
        }
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AuthError::InvalidInput("name is required".to_string()));
        }
        let intent = RegistrationIntent {
            email: email.clone(),
            display_name: display_name.to_string(),
            role,
        };

        {
            let mut pending = self.pending.lock().await;
            pending.retain(|_, entry| {
                entry.state == SendState::InFlight || entry.cooldown.idle_for() < PENDING_TTL
            });
            let duplicate = pending.get(&email).filter(|entry| {
                entry.state == SendState::InFlight || entry.cooldown.remaining().is_some()
            });
            if let Some(entry) = duplicate {
                debug!(email = %email, "duplicate registration submit");
                return Ok(entry.intent.clone());
            }
            pending.insert(
                email.clone(),
                PendingRegistration {
                    intent: intent.clone(),
                    state: SendState::InFlight,
                    cooldown: ResendCooldown::new(self.config.resend_cooldown()),
                },
            );
        }

        let exists = directory_call(
            "email_exists",
            self.config.call_timeout(),
            self.directory.email_exists(&email),
        )
        .await;
        let result = match exists {
            Ok(true) => Err(AuthError::EmailAlreadyRegistered),
            Ok(false) => self.send(&intent).await,
            Err(err) => Err(directory_failure("email_exists", &email, &err)),
        };

        let mut pending = self.pending.lock().await;
        match result {
            Ok(()) => {
                if let Some(entry) = pending.get_mut(&email) {
                    entry.state = SendState::Sent;
                    entry.cooldown.restart();
                }
                info!(email = %email, role = %role, "registration link sent");
                Ok(intent)
            }
            Err(err) => {
                pending.remove(&email);
                Err(err)
            }
        }
    }

    /// Re-send the verification link for a pending registration and return
    /// the intent it was sent for.
    ///
    /// The link always carries the intent recorded when the registration
    /// started; the caller's name and role are only used for an email
    /// unknown to this process (e.g. after a restart), and only once the
    /// directory confirms the email is not registered.
    ///
    /// # Errors
    /// [`AuthError::EmailAlreadyRegistered`] for an email the directory
    /// knows, [`AuthError::CooldownActive`] while the cooldown runs,
    /// otherwise the provider outcome.
    pub async fn resend(
        &self,
        intent: &RegistrationIntent,
    ) -> Result<RegistrationIntent, AuthError> {
        let email = normalize_email(&intent.email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("invalid email".to_string()));
        }

        let known = self.pending.lock().await.contains_key(&email);
        if !known {
            let exists = directory_call(
                "email_exists",
                self.config.call_timeout(),
                self.directory.email_exists(&email),
            )
            .await
            .map_err(|err| directory_failure("email_exists", &email, &err))?;
            if exists {
                debug!(email = %email, "resend for registered email");
                return Err(AuthError::EmailAlreadyRegistered);
            }
        }

        let (stored, previous) = {
            let mut pending = self.pending.lock().await;
            let entry = pending
                .entry(email.clone())
                .or_insert_with(|| PendingRegistration {
                    intent: RegistrationIntent {
                        email: email.clone(),
                        ..intent.clone()
                    },
                    state: SendState::Sent,
                    cooldown: ResendCooldown::new(self.config.resend_cooldown()),
                });
            if entry.state == SendState::InFlight {
                return Err(AuthError::CooldownActive {
                    retry_after: self.config.resend_cooldown(),
                });
            }
            entry.cooldown.ensure_ready()?;
            let previous = entry.cooldown;
            // Claimed up front so a concurrent resend sees the cooldown.
            entry.cooldown.restart();
            (entry.intent.clone(), previous)
        };

        match self.send(&stored).await {
            Ok(()) => Ok(stored),
            Err(err) => {
                if let Some(entry) = self.pending.lock().await.get_mut(&email) {
                    entry.cooldown = previous;
                }
                Err(err)
            }
        }
    }

    /// Time left before `email` may receive another verification send.
    pub async fn resend_available_in(&self, email: &str) -> Option<Duration> {
        let email = normalize_email(email);
        self.pending
            .lock()
            .await
            .get(&email)
            .and_then(|entry| entry.cooldown.remaining())
    }

    /// Re-send a sign-in link to an identity that exists but never set a
    /// password. Never creates an identity.
    ///
    /// # Errors
    /// [`AuthError::UnknownEmail`] for emails the directory does not know,
    /// [`AuthError::InvalidInput`] when the account already has a password,
    /// [`AuthError::CooldownActive`] while the per-email cooldown runs.
    pub async fn resume_registration(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("invalid email".to_string()));
        }
        let timeout = self.config.call_timeout();

        let exists = directory_call("email_exists", timeout, self.directory.email_exists(&email))
            .await
            .map_err(|err| directory_failure("email_exists", &email, &err))?;
        if !exists {
            return Err(AuthError::UnknownEmail);
        }
        let has_password =
            directory_call("has_password", timeout, self.directory.has_password(&email))
                .await
                .map_err(|err| directory_failure("has_password", &email, &err))?;
        if has_password {
            return Err(AuthError::InvalidInput(
                "account already has a password".to_string(),
            ));
        }

        let previous = {
            let mut resumes = self.resumes.lock().await;
            resumes.retain(|_, cooldown| cooldown.idle_for() < PENDING_TTL);
            let cooldown = resumes
                .entry(email.clone())
                .or_insert_with(|| ResendCooldown::new(self.config.resend_cooldown()));
            cooldown.ensure_ready()?;
            let previous = *cooldown;
            cooldown.restart();
            previous
        };

        let request = OtpRequest {
            email: email.clone(),
            name: None,
            role: None,
            create_user: false,
        };
        let result = self.send_otp(&request).await;
        match result {
            Ok(()) => info!(email = %email, "resume registration link sent"),
            Err(_) => {
                if let Some(cooldown) = self.resumes.lock().await.get_mut(&email) {
                    *cooldown = previous;
                }
            }
        }
        result
    }

    async fn send(&self, intent: &RegistrationIntent) -> Result<(), AuthError> {
        let request = OtpRequest {
            email: intent.email.clone(),
            name: Some(intent.display_name.clone()),
            role: Some(intent.role),
            create_user: true,
        };
        self.send_otp(&request).await
    }

    async fn send_otp(&self, request: &OtpRequest) -> Result<(), AuthError> {
        let redirect = self.config.route_url(Route::VerifyEmail);
        provider_call(
            "otp_sign_in",
            self.config.call_timeout(),
            self.provider.otp_sign_in(request, &redirect),
        )
        .await
        .map_err(|err| {
            error!(operation = "otp_sign_in", email = %request.email, "provider failure: {err}");
            AuthError::ProviderError
        })
    }
}
