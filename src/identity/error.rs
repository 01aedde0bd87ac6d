//! Error taxonomy for the identity engine and its collaborators.

use std::time::Duration;
use thiserror::Error;

use super::types::Role;

/// Failures reported by directory, profile and pending-role storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
    #[error("directory call timed out")]
    Timeout,
}

/// Failures reported by the identity provider adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider call timed out")]
    Timeout,
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Typed outcomes surfaced to the UI layer. None of these escape as panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no account exists for this email")]
    UnknownEmail,
    #[error("this email is registered as a {actual}")]
    RoleMismatch { actual: Role },
    #[error("registration for {email} is incomplete")]
    IncompleteRegistration { email: String },
    #[error("invalid password")]
    InvalidPassword,
    #[error("email is already registered")]
    EmailAlreadyRegistered,
    #[error("please wait {}s before requesting another email", retry_after.as_secs())]
    CooldownActive { retry_after: Duration },
    #[error("identity provider error")]
    ProviderError,
    #[error("account directory temporarily unavailable")]
    DirectoryUnavailable,
    #[error("link is invalid or has expired: {description}")]
    LinkExpiredOrInvalid { code: String, description: String },
    #[error("{0}")]
    InvalidInput(String),
}

impl AuthError {
    /// Stable snake_case tag used on the wire.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownEmail => "unknown_email",
            Self::RoleMismatch { .. } => "role_mismatch",
            Self::IncompleteRegistration { .. } => "incomplete_registration",
            Self::InvalidPassword => "invalid_password",
            Self::EmailAlreadyRegistered => "email_already_registered",
            Self::CooldownActive { .. } => "cooldown_active",
            Self::ProviderError => "provider_error",
            Self::DirectoryUnavailable => "directory_unavailable",
            Self::LinkExpiredOrInvalid { .. } => "link_expired_or_invalid",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    /// Only these two represent infrastructure failure rather than a decision.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::ProviderError | Self::DirectoryUnavailable)
    }
}

/// A state machine event that is not legal in the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply {event} while {state}")]
pub struct InvalidTransition {
    pub state: &'static str,
    pub event: &'static str,
}

impl From<DirectoryError> for AuthError {
    fn from(_: DirectoryError) -> Self {
        Self::DirectoryUnavailable
    }
}

impl From<ProviderError> for AuthError {
    fn from(_: ProviderError) -> Self {
        Self::ProviderError
    }
}
