// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential store trait for pairing material persistence.

use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

use crate::error::TetherError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelId, TenantId};

/// One member of a credential batch. `value: None` deletes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialEntry {
    pub channel_id: ChannelId,
    pub key: String,
    pub value: Option<Vec<u8>>,
}

impl CredentialEntry {
    pub fn set(channel_id: ChannelId, key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            channel_id,
            key: key.into(),
            value: Some(value),
        }
    }

    pub fn delete(channel_id: ChannelId, key: impl Into<String>) -> Self {
        Self {
            channel_id,
            key: key.into(),
            value: None,
        }
    }
}

/// Result of a batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every member succeeded.
    Complete { applied: usize },
    /// Some members failed; the store is in a degraded state for these keys.
    Partial { applied: usize, failed: Vec<String> },
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, BatchOutcome::Complete { .. })
    }

    pub fn applied(&self) -> usize {
        match self {
            BatchOutcome::Complete { applied } | BatchOutcome::Partial { applied, .. } => *applied,
        }
    }
}

/// Byte-exact key/value persistence for pairing credentials.
///
/// Implementations must round-trip arbitrary binary values: `read` after
/// `write(k, b)` returns exactly `b`.
#[async_trait]
pub trait CredentialStore: PluginAdapter {
    /// Associates a channel with its tenant. Backends that scope storage by
    /// tenant require this before any other call for the channel.
    fn bind_tenant(&self, _channel_id: &ChannelId, _tenant_id: &TenantId) {}

    /// Reads a record, returning `None` when it does not exist.
    async fn read(&self, channel_id: &ChannelId, key: &str) -> Result<Option<Vec<u8>>, TetherError>;

    /// Writes a record, replacing any previous value.
    async fn write(&self, channel_id: &ChannelId, key: &str, value: &[u8])
    -> Result<(), TetherError>;

    /// Deletes a record. Deleting a missing record succeeds.
    async fn delete(&self, channel_id: &ChannelId, key: &str) -> Result<(), TetherError>;

    /// Deletes every record of a channel.
    async fn clear(&self, channel_id: &ChannelId) -> Result<(), TetherError>;

    /// Applies all entries concurrently and waits for every one of them.
    ///
    /// Individual failures are logged and reported in [`BatchOutcome::Partial`];
    /// the batch itself never fails.
    async fn batch_write(&self, entries: Vec<CredentialEntry>) -> BatchOutcome {
        let total = entries.len();
        let results = join_all(entries.iter().map(|entry| async move {
            let result = match &entry.value {
                Some(value) => self.write(&entry.channel_id, &entry.key, value).await,
                None => self.delete(&entry.channel_id, &entry.key).await,
            };
            (entry, result)
        }))
        .await;

        let mut failed = Vec::new();
        for (entry, result) in results {
            if let Err(e) = result {
                warn!(
                    channel_id = %entry.channel_id,
                    key = %entry.key,
                    backend = self.name(),
                    error = %e,
                    "credential batch member failed"
                );
                failed.push(entry.key.clone());
            }
        }

        if failed.is_empty() {
            BatchOutcome::Complete { applied: total }
        } else {
            BatchOutcome::Partial {
                applied: total - failed.len(),
                failed,
            }
        }
    }
}
