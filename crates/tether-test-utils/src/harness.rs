// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end lifecycle testing.
//!
//! `TestHarness` assembles a registry over a temp SQLite database, an
//! in-memory credential store, and a [`MockTransportFactory`], with the
//! event loop already running.

use std::sync::Arc;
use std::time::Duration;

use tether_audit::SessionRecorder;
use tether_config::model::RegistryConfig;
use tether_core::{Channel, ChannelId, ChannelStatus, CredentialStore, TetherError};
use tether_credstore::MemoryCredentialStore;
use tether_registry::AdapterRegistry;
use tether_storage::Database;
use tether_storage::queries::channels;
use tokio_util::sync::CancellationToken;

use crate::mock_transport::{InitScript, MockTransportFactory};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    script: InitScript,
    init_delay: Duration,
    registry: RegistryConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            script: InitScript::ShowQr,
            init_delay: Duration::ZERO,
            registry: RegistryConfig {
                initialize_timeout_secs: 1,
                backoff_base_ms: 20,
                backoff_factor: 2.0,
                backoff_max_ms: 200,
                max_retries: 3,
                clear_credentials_on_ban: true,
                connect_on_startup: false,
            },
        }
    }

    /// How mock handles behave on `initialize()`.
    pub fn with_script(mut self, script: InitScript) -> Self {
        self.script = script;
        self
    }

    /// Slow down `initialize()` on every mock handle.
    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    /// Override the registry settings wholesale.
    pub fn with_registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.registry.max_retries = max_retries;
        self
    }

    /// Build the test harness and start the registry event loop.
    pub async fn build(self) -> Result<TestHarness, TetherError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| TetherError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");
        let db = Arc::new(Database::open(&db_path.to_string_lossy()).await?);

        let store = Arc::new(MemoryCredentialStore::new());
        let recorder = Arc::new(SessionRecorder::new(None, Duration::from_secs(1)));
        let factory =
            Arc::new(MockTransportFactory::new(self.script).with_init_delay(self.init_delay));

        let registry = AdapterRegistry::new(
            db.clone(),
            factory.clone(),
            store.clone() as Arc<dyn CredentialStore>,
            recorder.clone(),
            self.registry,
        );
        let cancel = CancellationToken::new();
        registry.spawn_event_loop(cancel.clone());

        Ok(TestHarness {
            registry,
            factory,
            store,
            recorder,
            db,
            cancel,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete lifecycle environment with mock transports and temp storage.
pub struct TestHarness {
    /// The registry under test, with its event loop running.
    pub registry: Arc<AdapterRegistry>,
    /// Factory that created every mock handle.
    pub factory: Arc<MockTransportFactory>,
    pub store: Arc<MemoryCredentialStore>,
    pub recorder: Arc<SessionRecorder>,
    /// SQLite database (temp file, cleaned up on drop).
    pub db: Arc<Database>,
    cancel: CancellationToken,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Persist a channel so the registry can find it.
    pub async fn add_channel(&self, channel: &Channel) -> Result<(), TetherError> {
        channels::create_channel(&self.db, channel).await
    }

    pub async fn channel(&self, id: &ChannelId) -> Result<Channel, TetherError> {
        channels::get_channel(&self.db, id)
            .await?
            .ok_or_else(|| TetherError::NotFound {
                entity: "channel",
                id: id.to_string(),
            })
    }

    /// Poll the stored status until it equals `expected` or `timeout` elapses.
    pub async fn wait_for_status(
        &self,
        id: &ChannelId,
        expected: ChannelStatus,
        timeout: Duration,
    ) -> Result<Channel, TetherError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let channel = self.channel(id).await?;
            if channel.status == expected {
                return Ok(channel);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TetherError::Timeout { duration: timeout });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until at least `count` events are stored for the channel.
    pub async fn wait_for_events(
        &self,
        id: &ChannelId,
        count: usize,
        timeout: Duration,
    ) -> Result<usize, TetherError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let stored = tether_storage::queries::events::recent_for_channel(
                &self.db,
                id,
                (count as u32).max(1) * 2,
            )
            .await?
            .len();
            if stored >= count {
                return Ok(stored);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TetherError::Timeout { duration: timeout });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop the event loop and disconnect every live handle.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.registry.shutdown().await;
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
