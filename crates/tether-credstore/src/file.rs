// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem credential store.
//!
//! Layout: `{root}/{tenant}/{channel}/{sanitized key}.json`. A channel must be
//! bound to its tenant with [`CredentialStore::bind_tenant`] before use.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tether_core::{
    AdapterType, ChannelId, CredentialStore, HealthStatus, PluginAdapter, TenantId, TetherError,
    with_timeout,
};
use tracing::{debug, warn};

use crate::codec;
use crate::sanitize::sanitize;

fn io_err(message: impl Into<String>, e: std::io::Error) -> TetherError {
    TetherError::Credential {
        message: message.into(),
        source: Some(Box::new(e)),
    }
}

/// One JSON document per credential key on the local filesystem.
pub struct FileCredentialStore {
    root: PathBuf,
    tenants: DashMap<ChannelId, TenantId>,
    io_timeout: Duration,
}

impl FileCredentialStore {
    pub fn new(root: impl Into<PathBuf>, io_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            tenants: DashMap::new(),
            io_timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every record of `channel_id`.
    pub fn channel_dir(&self, channel_id: &ChannelId) -> Result<PathBuf, TetherError> {
        let tenant = self.tenants.get(channel_id).ok_or_else(|| {
            TetherError::Misconfigured(format!(
                "channel {channel_id} has no tenant bound in the file credential store"
            ))
        })?;
        Ok(self
            .root
            .join(sanitize(tenant.as_str()))
            .join(sanitize(channel_id.as_str())))
    }

    /// Whether the root volume treats names differing only in case as one file.
    async fn folds_case(&self) -> std::io::Result<bool> {
        let marker = self.root.join(".Tether-Case-Check");
        tokio::fs::write(&marker, b"").await?;
        let folded = tokio::fs::try_exists(self.root.join(".tether-case-check")).await;
        if let Err(e) = tokio::fs::remove_file(&marker).await {
            warn!(path = %marker.display(), error = %e, "failed to remove case check marker");
        }
        folded
    }

    fn record_path(&self, channel_id: &ChannelId, key: &str) -> Result<PathBuf, TetherError> {
        if key.is_empty() {
            return Err(TetherError::Misconfigured(
                "credential key must not be empty".into(),
            ));
        }
        Ok(self
            .channel_dir(channel_id)?
            .join(format!("{}.json", sanitize(key))))
    }
}

#[async_trait]
impl PluginAdapter for FileCredentialStore {
    fn name(&self) -> &str {
        "file"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::CredentialStore
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
            return Ok(HealthStatus::Unhealthy(format!(
                "credential root {} is not writable: {e}",
                self.root.display()
            )));
        }
        match self.folds_case().await {
            Ok(false) => Ok(HealthStatus::Healthy),
            Ok(true) => Ok(HealthStatus::Degraded(format!(
                "credential root {} is case-insensitive; keys differing only in case share a file",
                self.root.display()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "credential root {} is not writable: {e}",
                self.root.display()
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), TetherError> {
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    fn bind_tenant(&self, channel_id: &ChannelId, tenant_id: &TenantId) {
        self.tenants.insert(channel_id.clone(), tenant_id.clone());
    }

    async fn read(&self, channel_id: &ChannelId, key: &str) -> Result<Option<Vec<u8>>, TetherError> {
        let path = self.record_path(channel_id, key)?;
        with_timeout(self.io_timeout, async {
            match tokio::fs::read_to_string(&path).await {
                Ok(doc) => codec::decode(&doc).map(Some),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(io_err(format!("failed to read {}", path.display()), e)),
            }
        })
        .await
    }

    async fn write(
        &self,
        channel_id: &ChannelId,
        key: &str,
        value: &[u8],
    ) -> Result<(), TetherError> {
        let path = self.record_path(channel_id, key)?;
        let doc = codec::encode(value);
        with_timeout(self.io_timeout, async {
            let dir = path
                .parent()
                .ok_or_else(|| TetherError::Internal("record path has no parent".into()))?;
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_err(format!("failed to create {}", dir.display()), e))?;

            let tmp = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
            if let Err(e) = tokio::fs::write(&tmp, doc.as_bytes()).await {
                return Err(io_err(format!("failed to write {}", tmp.display()), e));
            }
            if let Err(e) = tokio::fs::rename(&tmp, &path).await {
                if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                    warn!(path = %tmp.display(), error = %cleanup, "failed to remove temp credential file");
                }
                return Err(io_err(format!("failed to replace {}", path.display()), e));
            }
            debug!(channel_id = %channel_id, key, "credential written");
            Ok(())
        })
        .await
    }

    async fn delete(&self, channel_id: &ChannelId, key: &str) -> Result<(), TetherError> {
        let path = self.record_path(channel_id, key)?;
        with_timeout(self.io_timeout, async {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_err(format!("failed to delete {}", path.display()), e)),
            }
        })
        .await
    }

    async fn clear(&self, channel_id: &ChannelId) -> Result<(), TetherError> {
        let dir = self.channel_dir(channel_id)?;
        with_timeout(self.io_timeout, async {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_err(format!("failed to clear {}", dir.display()), e)),
            }
        })
        .await
    }
}
