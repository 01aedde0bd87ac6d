//! In-memory collaborators for embedding and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::identity::{
    AccountDirectory, DirectoryError, PendingRoleStore, Profile, ProfileStore, Role, RoleLookup,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: RwLock<HashMap<Uuid, Profile>>,
    pending: RwLock<HashMap<String, Role>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a profile directly, bypassing the bind-once rule.
    pub async fn insert(&self, profile: Profile) {
        self.profiles.write().await.insert(profile.id, profile);
    }

    pub async fn profile_count(&self) -> usize {
        self.profiles.read().await.len()
    }

    async fn find_by_email(&self, email: &str) -> Option<Profile> {
        self.profiles
            .read()
            .await
            .values()
            .find(|profile| profile.email.eq_ignore_ascii_case(email))
            .cloned()
    }
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn email_exists(&self, email: &str) -> Result<bool, DirectoryError> {
        Ok(self.find_by_email(email).await.is_some())
    }

    async fn role_for(&self, email: &str) -> Result<RoleLookup, DirectoryError> {
        Ok(self
            .find_by_email(email)
            .await
            .map_or(RoleLookup { exists: false, role: None }, |profile| RoleLookup {
                exists: true,
                role: profile.role,
            }))
    }

    async fn has_password(&self, email: &str) -> Result<bool, DirectoryError> {
        Ok(self
            .find_by_email(email)
            .await
            .is_some_and(|profile| profile.has_password))
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Profile>, DirectoryError> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Profile>, DirectoryError> {
        Ok(self.find_by_email(email).await)
    }

    async fn upsert(&self, profile: &Profile) -> Result<Profile, DirectoryError> {
        let mut profiles = self.profiles.write().await;
        let stored = match profiles.get(&profile.id) {
            Some(existing) => Profile {
                role: existing.role.or(profile.role),
                has_password: existing.has_password || profile.has_password,
                ..profile.clone()
            },
            None => profile.clone(),
        };
        profiles.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn bind_role(&self, id: Uuid, role: Role) -> Result<bool, DirectoryError> {
        let mut profiles = self.profiles.write().await;
        match profiles.get_mut(&id) {
            Some(profile) if profile.role.is_none() => {
                profile.role = Some(role);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_password_set(&self, id: Uuid) -> Result<(), DirectoryError> {
        if let Some(profile) = self.profiles.write().await.get_mut(&id) {
            profile.has_password = true;
        }
        Ok(())
    }
}

#[async_trait]
impl PendingRoleStore for MemoryStore {
    async fn get(&self, browser_key: &str) -> Result<Option<Role>, DirectoryError> {
        Ok(self.pending.read().await.get(browser_key).copied())
    }

    async fn set(&self, browser_key: &str, role: Role) -> Result<(), DirectoryError> {
        self.pending
            .write()
            .await
            .insert(browser_key.to_string(), role);
        Ok(())
    }

    async fn delete(&self, browser_key: &str) -> Result<(), DirectoryError> {
        self.pending.write().await.remove(browser_key);
        Ok(())
    }
}
