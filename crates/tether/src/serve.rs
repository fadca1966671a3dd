// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tether serve`: run the registry, the event purge, and the read API.

use std::sync::Arc;

use tether_audit::SessionRecorder;
use tether_config::TetherConfig;
use tether_core::{CredentialStore, TetherError};
use tether_gateway::{GatewayState, HealthState};
use tether_metrics::PrometheusExporter;
use tether_registry::{AdapterRegistry, DefaultTransportFactory};
use tether_storage::Database;
use tracing::{info, warn};

use crate::purge::spawn_purge_task;
use crate::shutdown;

/// Open the database, creating its directory when needed.
pub async fn open_database(config: &TetherConfig) -> Result<Database, TetherError> {
    let path = std::path::Path::new(&config.storage.database_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| TetherError::Storage {
                source: Box::new(e),
            })?;
        }
    }
    Database::open_with(&config.storage.database_path, config.storage.wal_mode).await
}

/// Run until SIGINT/SIGTERM.
pub async fn run_serve(config: TetherConfig) -> Result<(), TetherError> {
    let db = Arc::new(open_database(&config).await?);
    let store: Arc<dyn CredentialStore> = tether_credstore::build_store(&config.credentials).await?;
    let recorder = Arc::new(SessionRecorder::from_config(&config.audit));

    let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> =
        if config.prometheus.enabled {
            let exporter = PrometheusExporter::install()?;
            Some(Arc::new(move || exporter.render()))
        } else {
            info!("prometheus exporter disabled");
            None
        };

    let factory = Arc::new(DefaultTransportFactory::new(
        store.clone(),
        config.cloud_api.clone(),
        config.pairing.clone(),
    ));
    let registry = AdapterRegistry::new(
        db.clone(),
        factory,
        store,
        recorder,
        config.registry.clone(),
    );

    let cancel = shutdown::install_signal_handler();
    let event_loop = registry.spawn_event_loop(cancel.child_token());
    let purge = spawn_purge_task(db.clone(), &config.events, cancel.child_token());

    if config.registry.connect_on_startup {
        let startup = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = startup.connect_active().await {
                warn!(error = %e, "startup connect failed");
            }
        });
    }

    if config.gateway.enabled {
        let state = GatewayState::new(
            registry.clone(),
            &config.gateway,
            config.events.clone(),
            HealthState::new(prometheus_render),
        );
        if let Err(e) = tether_gateway::start_server(&config.gateway, state, cancel.clone()).await {
            cancel.cancel();
            registry.shutdown().await;
            return Err(e);
        }
    } else {
        info!("gateway disabled; running until signalled");
        cancel.cancelled().await;
    }

    registry.shutdown().await;
    cancel.cancel();
    if let Some(event_loop) = event_loop {
        let _ = event_loop.await;
    }
    let _ = purge.await;

    info!(agent = %config.agent.name, "tether serve shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_database_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TetherConfig::default();
        config.storage.database_path = dir
            .path()
            .join("nested/state/tether.db")
            .display()
            .to_string();

        let db = open_database(&config).await.unwrap();
        db.close().await.unwrap();
        assert!(dir.path().join("nested/state/tether.db").exists());
    }
}
