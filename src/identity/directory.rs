//! Account directory and profile store collaborators.
//!
//! The directory is a fast, read-only cache consulted for UX decisions before
//! any credential is checked. The identity provider stays the final authority
//! at sign-in time, so directory answers may briefly disagree with it while a
//! record is being finalized.

use async_trait::async_trait;
use uuid::Uuid;

use super::error::DirectoryError;
use super::types::{Profile, Role, RoleLookup};

/// Read-only queries against the user-profile store. No branching logic.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn email_exists(&self, email: &str) -> Result<bool, DirectoryError>;

    async fn role_for(&self, email: &str) -> Result<RoleLookup, DirectoryError>;

    async fn has_password(&self, email: &str) -> Result<bool, DirectoryError>;

    /// Cheap liveness probe used by `/health`.
    async fn ping(&self) -> Result<(), DirectoryError> {
        Ok(())
    }
}

/// Application-side profile records.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Profile>, DirectoryError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<Profile>, DirectoryError>;

    /// Insert or update a profile. An already-bound role is never overwritten.
    async fn upsert(&self, profile: &Profile) -> Result<Profile, DirectoryError>;

    /// Bind a role only when none is bound yet. Returns `false` when a role
    /// was already present.
    async fn bind_role(&self, id: Uuid, role: Role) -> Result<bool, DirectoryError>;

    /// Record that a password credential now exists.
    async fn mark_password_set(&self, id: Uuid) -> Result<(), DirectoryError>;
}
