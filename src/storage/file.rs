//! File-backed pending role storage: one small JSON document per browser key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

use crate::identity::{DirectoryError, PendingRoleStore, Role};

#[derive(Serialize, Deserialize)]
struct Selection {
    role: Role,
}

#[derive(Clone, Debug)]
pub struct FilePendingRoleStore {
    dir: PathBuf,
}

impl FilePendingRoleStore {
    /// Create the store, creating the directory if needed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, browser_key: &str) -> Result<PathBuf, DirectoryError> {
        let valid = !browser_key.is_empty()
            && browser_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(DirectoryError::Unavailable(format!(
                "invalid browser key: {browser_key:?}"
            )));
        }
        Ok(self.dir.join(format!("{browser_key}.json")))
    }
}

fn io_error(err: &std::io::Error) -> DirectoryError {
    DirectoryError::Unavailable(err.to_string())
}

#[async_trait]
impl PendingRoleStore for FilePendingRoleStore {
    async fn get(&self, browser_key: &str) -> Result<Option<Role>, DirectoryError> {
        let path = self.path_for(browser_key)?;
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Selection>(&bytes)
                .map(|selection| Some(selection.role))
                .map_err(|err| DirectoryError::Unavailable(err.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&err)),
        }
    }

    async fn set(&self, browser_key: &str, role: Role) -> Result<(), DirectoryError> {
        let path = self.path_for(browser_key)?;
        let bytes = serde_json::to_vec(&Selection { role })
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        // Write-then-rename so a concurrent reader never sees a partial file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await.map_err(|err| io_error(&err))?;
        fs::rename(&tmp, &path).await.map_err(|err| io_error(&err))
    }

    async fn delete(&self, browser_key: &str) -> Result<(), DirectoryError> {
        let path = self.path_for(browser_key)?;
        match fs::remove_file(&path).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(io_error(&err)),
            _ => Ok(()),
        }
    }
}
