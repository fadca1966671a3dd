// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process credential store for tests and ephemeral deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use tether_core::{
    AdapterType, ChannelId, CredentialStore, HealthStatus, PluginAdapter, TetherError,
};
use tokio::sync::RwLock;

/// Credentials held in a map keyed by `(channel, key)`. Lost on restart.
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<(ChannelId, String), Vec<u8>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held for `channel_id`.
    pub async fn len_for(&self, channel_id: &ChannelId) -> usize {
        self.records
            .read()
            .await
            .keys()
            .filter(|(channel, _)| channel == channel_id)
            .count()
    }
}

#[async_trait]
impl PluginAdapter for MemoryCredentialStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::CredentialStore
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TetherError> {
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn read(&self, channel_id: &ChannelId, key: &str) -> Result<Option<Vec<u8>>, TetherError> {
        let records = self.records.read().await;
        Ok(records.get(&(channel_id.clone(), key.to_string())).cloned())
    }

    async fn write(
        &self,
        channel_id: &ChannelId,
        key: &str,
        value: &[u8],
    ) -> Result<(), TetherError> {
        if key.is_empty() {
            return Err(TetherError::Misconfigured("credential key must not be empty".into()));
        }
        self.records
            .write()
            .await
            .insert((channel_id.clone(), key.to_string()), value.to_vec());
        Ok(())
    }

    async fn delete(&self, channel_id: &ChannelId, key: &str) -> Result<(), TetherError> {
        self.records
            .write()
            .await
            .remove(&(channel_id.clone(), key.to_string()));
        Ok(())
    }

    async fn clear(&self, channel_id: &ChannelId) -> Result<(), TetherError> {
        self.records
            .write()
            .await
            .retain(|(channel, _), _| channel != channel_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::CredentialEntry;

    #[tokio::test]
    async fn clear_only_touches_one_channel() {
        let store = MemoryCredentialStore::new();
        let a = ChannelId::from("a");
        let b = ChannelId::from("b");
        store.write(&a, "creds", b"x").await.unwrap();
        store.write(&a, "pre-key-1", b"y").await.unwrap();
        store.write(&b, "creds", b"z").await.unwrap();

        store.clear(&a).await.unwrap();
        assert_eq!(store.len_for(&a).await, 0);
        assert_eq!(store.read(&b, "creds").await.unwrap(), Some(b"z".to_vec()));
    }

    #[tokio::test]
    async fn empty_key_is_misuse() {
        let store = MemoryCredentialStore::new();
        let err = store.write(&ChannelId::from("a"), "", b"x").await.unwrap_err();
        assert!(matches!(err, TetherError::Misconfigured(_)));
    }

    #[tokio::test]
    async fn batch_reports_empty_key_as_partial() {
        let store = MemoryCredentialStore::new();
        let ch = ChannelId::from("a");
        let outcome = store
            .batch_write(vec![
                CredentialEntry::set(ch.clone(), "pre-key-1", vec![1]),
                CredentialEntry::set(ch.clone(), "", vec![2]),
            ])
            .await;
        assert_eq!(outcome.applied(), 1);
        assert!(!outcome.is_complete());
    }
}
