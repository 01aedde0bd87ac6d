//! Cross-navigation storage for the role chosen before a federated redirect.
//!
//! The selection must outlive a full page navigation away from and back to the
//! application, so it lives behind this small key/value interface instead of in
//! process memory. Keys are scoped to one browser.

use async_trait::async_trait;

use super::error::DirectoryError;
use super::types::Role;

#[async_trait]
pub trait PendingRoleStore: Send + Sync {
    async fn get(&self, browser_key: &str) -> Result<Option<Role>, DirectoryError>;

    async fn set(&self, browser_key: &str, role: Role) -> Result<(), DirectoryError>;

    async fn delete(&self, browser_key: &str) -> Result<(), DirectoryError>;
}
