// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis-backed credential store.
//!
//! Records live under `sessions:{channel}:{key}` with the same buffer document
//! encoding as the file backend. Keys are used verbatim.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tether_core::{
    AdapterType, ChannelId, CredentialStore, HealthStatus, PluginAdapter, TetherError,
    with_timeout,
};
use tracing::{debug, info};

use crate::codec;

const KEY_PREFIX: &str = "sessions";
const SCAN_BATCH: usize = 200;

fn redis_err(message: impl Into<String>, e: redis::RedisError) -> TetherError {
    TetherError::Credential {
        message: message.into(),
        source: Some(Box::new(e)),
    }
}

/// Storage key for one credential record.
pub fn record_key(channel_id: &ChannelId, key: &str) -> String {
    format!("{KEY_PREFIX}:{channel_id}:{key}")
}

/// `SCAN MATCH` pattern for every record of one channel.
///
/// Glob metacharacters in the id are escaped so the pattern only ever matches
/// that channel's own prefix.
pub fn channel_pattern(channel_id: &ChannelId) -> String {
    let mut pattern = String::with_capacity(KEY_PREFIX.len() + channel_id.as_str().len() + 4);
    pattern.push_str(KEY_PREFIX);
    pattern.push(':');
    for ch in channel_id.as_str().chars() {
        if matches!(ch, '\\' | '*' | '?' | '[' | ']') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push_str(":*");
    pattern
}

/// Credential store on a shared Redis instance.
pub struct RedisCredentialStore {
    conn: ConnectionManager,
    url: String,
    io_timeout: Duration,
}

impl std::fmt::Debug for RedisCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCredentialStore")
            .field("url", &self.url)
            .field("conn", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCredentialStore {
    /// Connect to `url`, giving up after `io_timeout`.
    pub async fn connect(url: &str, io_timeout: Duration) -> Result<Self, TetherError> {
        let client = redis::Client::open(url).map_err(|e| redis_err("invalid redis url", e))?;
        let conn = tokio::time::timeout(io_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| TetherError::Timeout {
                duration: io_timeout,
            })?
            .map_err(|e| redis_err("failed to connect to redis", e))?;
        info!(url, "redis credential store connected");
        Ok(Self {
            conn,
            url: url.to_string(),
            io_timeout,
        })
    }

    async fn scan_channel(&self, channel_id: &ChannelId) -> Result<Vec<String>, TetherError> {
        let pattern = channel_pattern(channel_id);
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_err("failed to scan credential keys", e))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

#[async_trait]
impl PluginAdapter for RedisCredentialStore {
    fn name(&self) -> &str {
        "redis"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::CredentialStore
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        let mut conn = self.conn.clone();
        let ping = with_timeout(self.io_timeout, async {
            redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .map_err(|e| redis_err("ping failed", e))
        })
        .await;
        match ping {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), TetherError> {
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn read(&self, channel_id: &ChannelId, key: &str) -> Result<Option<Vec<u8>>, TetherError> {
        let mut conn = self.conn.clone();
        let record = record_key(channel_id, key);
        with_timeout(self.io_timeout, async {
            let doc: Option<String> = conn
                .get(&record)
                .await
                .map_err(|e| redis_err(format!("failed to read {record}"), e))?;
            doc.map(|d| codec::decode(&d)).transpose()
        })
        .await
    }

    async fn write(
        &self,
        channel_id: &ChannelId,
        key: &str,
        value: &[u8],
    ) -> Result<(), TetherError> {
        if key.is_empty() {
            return Err(TetherError::Misconfigured(
                "credential key must not be empty".into(),
            ));
        }
        let mut conn = self.conn.clone();
        let record = record_key(channel_id, key);
        let doc = codec::encode(value);
        with_timeout(self.io_timeout, async {
            let _: () = conn
                .set(&record, doc)
                .await
                .map_err(|e| redis_err(format!("failed to write {record}"), e))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, channel_id: &ChannelId, key: &str) -> Result<(), TetherError> {
        let mut conn = self.conn.clone();
        let record = record_key(channel_id, key);
        with_timeout(self.io_timeout, async {
            let _: () = conn
                .del(&record)
                .await
                .map_err(|e| redis_err(format!("failed to delete {record}"), e))?;
            Ok(())
        })
        .await
    }

    async fn clear(&self, channel_id: &ChannelId) -> Result<(), TetherError> {
        with_timeout(self.io_timeout, async {
            let keys = self.scan_channel(channel_id).await?;
            if keys.is_empty() {
                return Ok(());
            }
            let mut conn = self.conn.clone();
            let _: () = conn
                .del(&keys)
                .await
                .map_err(|e| redis_err("failed to clear channel credentials", e))?;
            debug!(channel_id = %channel_id, removed = keys.len(), "redis credentials cleared");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_sessions_pattern() {
        assert_eq!(
            record_key(&ChannelId::from("ch-9"), "session-1@s.whatsapp.net"),
            "sessions:ch-9:session-1@s.whatsapp.net"
        );
    }

    #[test]
    fn scan_pattern_is_literal_for_the_channel() {
        assert_eq!(channel_pattern(&ChannelId::from("wa-1")), "sessions:wa-1:*");
        assert_eq!(
            channel_pattern(&ChannelId::from("a*b?[c]\\")),
            "sessions:a\\*b\\?\\[c\\]\\\\:*"
        );
    }

    /// Requires a Redis server at `TETHER_TEST_REDIS_URL` (default `redis://127.0.0.1:6379/15`).
    #[tokio::test]
    #[ignore]
    async fn round_trip_against_live_server() {
        let url = std::env::var("TETHER_TEST_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string());
        let store = RedisCredentialStore::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();
        let ch = ChannelId::from("redis-test");
        let payload: Vec<u8> = (0..=255).collect();

        store.write(&ch, "creds", &payload).await.unwrap();
        store.write(&ch, "pre-key-1", b"k").await.unwrap();
        assert_eq!(store.read(&ch, "creds").await.unwrap(), Some(payload));

        store.clear(&ch).await.unwrap();
        assert!(store.read(&ch, "creds").await.unwrap().is_none());
        assert!(store.read(&ch, "pre-key-1").await.unwrap().is_none());
    }
}
