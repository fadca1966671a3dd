// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairing credential persistence.
//!
//! Three interchangeable [`CredentialStore`] backends share one binary-safe
//! encoding ([`codec`]) so a deployment can move between them without
//! rewriting records.

pub mod codec;
pub mod file;
pub mod memory;
pub mod redis_store;
pub mod sanitize;

use std::sync::Arc;

use tether_config::model::{CredentialBackend, CredentialsConfig};
use tether_core::{CredentialStore, TetherError};
use tracing::info;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;
pub use redis_store::RedisCredentialStore;

/// Build the backend selected by `[credentials] backend`.
pub async fn build_store(
    config: &CredentialsConfig,
) -> Result<Arc<dyn CredentialStore>, TetherError> {
    let store: Arc<dyn CredentialStore> = match config.backend {
        CredentialBackend::File => Arc::new(FileCredentialStore::new(
            &config.root_dir,
            config.io_timeout(),
        )),
        CredentialBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                TetherError::Config("credentials.redis_url is required for the redis backend".into())
            })?;
            Arc::new(RedisCredentialStore::connect(url, config.io_timeout()).await?)
        }
        CredentialBackend::Memory => Arc::new(MemoryCredentialStore::new()),
    };
    info!(backend = store.name(), "credential store ready");
    Ok(store)
}
