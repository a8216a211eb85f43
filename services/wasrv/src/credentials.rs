//! Per-device credential storage
//!
//! A device "has credentials" when its directory exists under the session
//! root. The protocol client owns the directory's contents.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::utils::is_valid_device_id;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// True when stored credentials exist for the device
    async fn load_credentials(&self, device_id: &str) -> bool;

    /// Remove stored credentials; `io::ErrorKind::NotFound` when already absent
    async fn clear_credentials(&self, device_id: &str) -> io::Result<()>;
}

/// One directory per device under `root`
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    root: PathBuf,
}

impl FileCredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn device_dir(&self, device_id: &str) -> io::Result<PathBuf> {
        if !is_valid_device_id(device_id) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid device id: {:?}", device_id),
            ));
        }
        Ok(self.root.join(device_id))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load_credentials(&self, device_id: &str) -> bool {
        let Ok(dir) = self.device_dir(device_id) else {
            return false;
        };
        let exists = tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        debug!("[{}] stored credentials: {}", device_id, exists);
        exists
    }

    async fn clear_credentials(&self, device_id: &str) -> io::Result<()> {
        let dir = self.device_dir(device_id)?;
        tokio::fs::remove_dir_all(&dir).await?;
        debug!("[{}] credential directory removed: {:?}", device_id, dir);
        Ok(())
    }
}
