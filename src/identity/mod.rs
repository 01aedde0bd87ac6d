//! Account identity resolution and credential provisioning.
//!
//! Given an email and the role a user is trying to act as, the engine decides
//! whether to authenticate with a password, send the user to a federated
//! provider, resume an interrupted registration, or require a password before
//! granting full access. Every decision is returned as a value; nothing here
//! panics or throws across the boundary.
//!
//! The [`AccountDirectory`] is a cache consulted for fast UX decisions. The
//! [`IdentityProvider`] stays the final authority at sign-in time.

mod config;
mod directory;
mod email_change;
mod error;
mod gate;
mod oauth;
mod password;
mod pending;
pub mod provider;
mod registration;
mod service;
mod session;
mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AuthConfig;
pub use directory::{AccountDirectory, ProfileStore};
pub use email_change::{EMAIL_CHANGED_PARAM, EmailChange, ReturnNotice, take_email_changed_flag};
pub use error::{AuthError, DirectoryError, InvalidTransition, ProviderError};
pub use gate::{CredentialGate, LoginEvent, LoginState};
pub use oauth::{BindOutcome, OAuthRoleBinding};
pub use password::{PasswordProvisioning, PasswordSetupEvent, PasswordSetupState};
pub use pending::PendingRoleStore;
pub use provider::IdentityProvider;
pub use registration::{RegistrationFlow, ResendCooldown};
pub use service::{AuthService, Collaborators};
pub use session::{Bootstrap, SessionEvent, SessionOrchestrator};
pub use types::{
    AuthMethod, Identity, IdentityMetadata, OtpRequest, Profile, RegistrationIntent, Role,
    RoleLookup, Route, Session,
};
