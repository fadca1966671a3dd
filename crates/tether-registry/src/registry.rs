// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live transport handles and the connection lifecycle.
//!
//! At most one live handle exists per channel. Concurrent `get_or_create`
//! calls for the same channel share a single in-flight initialization.
//! Connection events flow through `handle_event`, which persists them,
//! records them, and drives the channel's status.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use tether_audit::SessionRecorder;
use tether_config::model::RegistryConfig;
use tether_core::types::Diagnosis;
use tether_core::{
    Channel, ChannelId, ChannelStatus, ConnectionEvent, CredentialStore, DiagnosisKind,
    EventSender, TetherError, TransportAdapter,
};
use tether_diagnostics::{EventInput, EventShape, classify, event_shape, is_tenant_facing};
use tether_storage::Database;
use tether_storage::queries::{channels, events};
use tokio::sync::{OnceCell, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::factory::TransportFactory;

#[derive(Default)]
struct Slot {
    handle: OnceCell<Arc<dyn TransportAdapter>>,
}

/// What the registry knows about one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelState {
    pub channel_id: ChannelId,
    pub status: ChannelStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub active: bool,
    /// The live handle's own view, when one exists.
    pub live_status: Option<ChannelStatus>,
}

/// Owns every live transport handle.
pub struct AdapterRegistry {
    db: Arc<Database>,
    factory: Arc<dyn TransportFactory>,
    store: Arc<dyn CredentialStore>,
    recorder: Arc<SessionRecorder>,
    config: RegistryConfig,
    backoff: BackoffPolicy,
    slots: DashMap<ChannelId, Arc<Slot>>,
    reconnects: DashMap<ChannelId, JoinHandle<()>>,
    events_tx: EventSender,
    events_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<ConnectionEvent>>>,
}

impl AdapterRegistry {
    pub fn new(
        db: Arc<Database>,
        factory: Arc<dyn TransportFactory>,
        store: Arc<dyn CredentialStore>,
        recorder: Arc<SessionRecorder>,
        config: RegistryConfig,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            db,
            factory,
            store,
            recorder,
            backoff: BackoffPolicy::from_config(&config),
            config,
            slots: DashMap::new(),
            reconnects: DashMap::new(),
            events_tx,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
        })
    }

    /// Sender that transports publish their connection events to.
    pub fn event_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Start consuming transport events until `cancel` fires.
    ///
    /// Events are handled one at a time, in arrival order. Only the first
    /// call starts a loop; later calls return `None`.
    pub fn spawn_event_loop(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let mut rx = match self.events_rx.lock() {
            Ok(mut guard) => guard.take()?,
            Err(poisoned) => poisoned.into_inner().take()?,
        };
        let registry = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        if let Err(e) = registry.handle_event(event).await {
                            warn!(error = %e, "connection event dropped");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
            debug!("registry event loop stopped");
        }))
    }

    /// Return the channel's live handle, opening one if needed.
    pub async fn get_or_create(
        self: &Arc<Self>,
        channel: &Channel,
    ) -> Result<Arc<dyn TransportAdapter>, TetherError> {
        if !channel.active {
            return Err(TetherError::Misconfigured(format!(
                "channel {} is inactive",
                channel.id
            )));
        }

        loop {
            let slot = self
                .slots
                .entry(channel.id.clone())
                .or_insert_with(|| Arc::new(Slot::default()))
                .clone();

            if let Some(handle) = slot.handle.get() {
                let live = handle.connection_status().await;
                if matches!(live, ChannelStatus::Connected | ChannelStatus::QrPending) {
                    return Ok(handle.clone());
                }
                debug!(channel_id = %channel.id, status = %live, "replacing stale handle");
                self.evict_slot(&channel.id, &slot).await;
                continue;
            }

            let result = slot.handle.get_or_try_init(|| self.open(channel)).await;
            return match result {
                Ok(handle) => Ok(handle.clone()),
                Err(e) => {
                    self.slots
                        .remove_if(&channel.id, |_, s| Arc::ptr_eq(s, &slot));
                    Err(e)
                }
            };
        }
    }

    /// Look up a channel by id and return its live handle.
    pub async fn connect(
        self: &Arc<Self>,
        channel_id: &ChannelId,
    ) -> Result<Arc<dyn TransportAdapter>, TetherError> {
        let channel = self.load(channel_id).await?;
        self.get_or_create(&channel).await
    }

    /// Connect every active, non-banned channel. Failures are logged.
    pub async fn connect_active(self: &Arc<Self>) -> Result<usize, TetherError> {
        let mut opened = 0;
        for channel in channels::list_active_channels(&self.db).await? {
            if channel.status.is_terminal() {
                debug!(channel_id = %channel.id, "skipping banned channel");
                continue;
            }
            match self.get_or_create(&channel).await {
                Ok(_) => opened += 1,
                Err(e) => warn!(channel_id = %channel.id, error = %e, "startup connect failed"),
            }
        }
        info!(opened, "active channels connected");
        Ok(opened)
    }

    async fn open(&self, channel: &Channel) -> Result<Arc<dyn TransportAdapter>, TetherError> {
        let stored = self.load(&channel.id).await?;
        if stored.status.is_terminal() {
            return Err(TetherError::Initialization {
                channel_id: channel.id.clone(),
                status: stored.status,
                message: "channel is banned; reset it before reconnecting".into(),
            });
        }

        let handle = self.factory.create(&stored, self.events_tx.clone())?;
        let kind = handle.transport_kind().to_string();

        if !stored.status.can_transition_to(ChannelStatus::Opening) {
            channels::update_status(
                &self.db,
                &stored.id,
                ChannelStatus::Disconnected,
                stored.retry_count,
                stored.last_error.as_deref(),
            )
            .await?;
        }
        channels::update_status(
            &self.db,
            &stored.id,
            ChannelStatus::Opening,
            stored.retry_count,
            stored.last_error.as_deref(),
        )
        .await?;
        self.recorder
            .init(&stored.id, stored.tenant_id.as_str())
            .await;
        info!(channel_id = %stored.id, transport = %kind, "opening channel");

        let timeout = self.config.initialize_timeout();
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, handle.initialize()).await;
        let message = match outcome {
            Ok(Ok(status)) => {
                tether_metrics::record_initialize_latency(&kind, started.elapsed().as_secs_f64());
                if let Err(e) = self.apply(&stored.id, status, None, None).await {
                    // Events seen during initialize already moved the channel on.
                    let _ = handle.disconnect().await;
                    return Err(e);
                }
                self.publish_live_count();
                return Ok(handle);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => {
                let _ = handle.disconnect().await;
                TetherError::Timeout { duration: timeout }.to_string()
            }
        };

        tether_metrics::record_initialize_failure(&kind);
        let current = self.load(&stored.id).await?;
        let retry_count = current.retry_count.saturating_add(1);
        let status = if current.status.can_transition_to(ChannelStatus::Disconnected) {
            ChannelStatus::Disconnected
        } else {
            current.status
        };
        let last_error = if status == ChannelStatus::Disconnected {
            Some(message.as_str())
        } else {
            current.last_error.as_deref()
        };
        channels::update_status(&self.db, &stored.id, status, retry_count, last_error).await?;
        warn!(
            channel_id = %stored.id,
            retry_count,
            status = %status,
            error = %message,
            "channel failed to initialize"
        );
        Err(TetherError::Initialization {
            channel_id: stored.id.clone(),
            status,
            message,
        })
    }

    /// Classify, persist, record, and act on one connection event.
    pub async fn handle_event(
        self: &Arc<Self>,
        event: ConnectionEvent,
    ) -> Result<Diagnosis, TetherError> {
        let input = EventInput::from(&event);
        let diagnosis = classify(&input);
        let shape = event_shape(&input);

        events::insert_event(&self.db, &event, Some(&diagnosis)).await?;
        self.recorder
            .append(
                &event.channel_id,
                &event.event_type,
                json!({
                    "statusCode": event.status_code,
                    "error": event.error_message,
                    "data": event.event_data,
                    "severity": diagnosis.severity,
                    "diagnosis": diagnosis.diagnosis,
                }),
                None,
            )
            .await;
        tether_metrics::record_connection_event(&event.event_type, diagnosis.severity);
        debug!(
            channel_id = %event.channel_id,
            event_type = %event.event_type,
            severity = %diagnosis.severity,
            "connection event"
        );

        if let Err(e) = self.drive_lifecycle(&event, &diagnosis, shape).await {
            warn!(channel_id = %event.channel_id, error = %e, "lifecycle transition skipped");
        }
        Ok(diagnosis)
    }

    async fn drive_lifecycle(
        self: &Arc<Self>,
        event: &ConnectionEvent,
        diagnosis: &Diagnosis,
        shape: EventShape,
    ) -> Result<(), TetherError> {
        let id = &event.channel_id;
        match diagnosis.kind {
            DiagnosisKind::AwaitingScan => {
                self.apply(id, ChannelStatus::QrPending, None, None).await?;
            }
            DiagnosisKind::Connected => {
                self.cancel_reconnect(id);
                self.apply(id, ChannelStatus::Connected, Some(0), None).await?;
                info!(channel_id = %id, "channel connected");
            }
            DiagnosisKind::DeviceRemoved => {
                self.cancel_reconnect(id);
                self.evict(id).await;
                self.apply(
                    id,
                    ChannelStatus::Banned,
                    None,
                    Some(&diagnosis.user_friendly_message),
                )
                .await?;
                warn!(channel_id = %id, "device removed, channel banned");
                if self.config.clear_credentials_on_ban {
                    self.purge_credentials(id).await;
                }
                self.recorder.finish(id).await;
            }
            DiagnosisKind::ManualLogout => {
                self.cancel_reconnect(id);
                self.evict(id).await;
                self.apply(id, ChannelStatus::Disconnected, None, None).await?;
                info!(channel_id = %id, "channel logged out");
            }
            DiagnosisKind::RestartRequired
            | DiagnosisKind::ConnectionTerminated
            | DiagnosisKind::ConnectionClosed => {
                if shape != EventShape::Closed && diagnosis.kind != DiagnosisKind::RestartRequired {
                    return Ok(());
                }
                self.evict(id).await;
                let current = self.load(id).await?;
                let last_error = is_tenant_facing(diagnosis.severity)
                    .then_some(diagnosis.user_friendly_message.as_str());
                let attempt = current.retry_count;
                self.apply(
                    id,
                    ChannelStatus::Disconnected,
                    Some(attempt.saturating_add(1)),
                    last_error,
                )
                .await?;
                self.schedule_reconnect(id.clone(), attempt);
            }
            DiagnosisKind::Generic => {}
        }
        Ok(())
    }

    /// Persist a status change if the state machine allows it.
    ///
    /// `None` keeps the stored counter or error. Connecting always clears the error.
    async fn apply(
        &self,
        id: &ChannelId,
        next: ChannelStatus,
        retry_count: Option<u32>,
        last_error: Option<&str>,
    ) -> Result<(), TetherError> {
        let current = self.load(id).await?;
        if !current.status.can_transition_to(next) {
            return Err(TetherError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }
        let last_error = match next {
            ChannelStatus::Connected => None,
            _ => last_error.or(current.last_error.as_deref()),
        };
        channels::update_status(
            &self.db,
            id,
            next,
            retry_count.unwrap_or(current.retry_count),
            last_error,
        )
        .await
    }

    async fn load(&self, id: &ChannelId) -> Result<Channel, TetherError> {
        channels::get_channel(&self.db, id)
            .await?
            .ok_or_else(|| TetherError::NotFound {
                entity: "channel",
                id: id.to_string(),
            })
    }

    fn schedule_reconnect(self: &Arc<Self>, id: ChannelId, attempt: u32) {
        if !self.backoff.should_retry(attempt) {
            warn!(channel_id = %id, attempt, "reconnect budget exhausted");
            return;
        }
        let delay = self.backoff.delay(attempt);
        info!(channel_id = %id, attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");

        let registry = Arc::clone(self);
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.reconnects.remove(&task_id);
            let channel = match registry.load(&task_id).await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(channel_id = %task_id, error = %e, "reconnect lookup failed");
                    return;
                }
            };
            if !channel.active || channel.status != ChannelStatus::Disconnected {
                debug!(channel_id = %task_id, status = %channel.status, "reconnect no longer needed");
                return;
            }
            match registry.get_or_create(&channel).await {
                Ok(_) => {}
                Err(TetherError::Initialization { status, message, .. })
                    if status == ChannelStatus::Disconnected =>
                {
                    warn!(channel_id = %task_id, attempt, error = %message, "reconnect failed");
                    registry.schedule_reconnect(task_id, attempt.saturating_add(1));
                }
                Err(e) => warn!(channel_id = %task_id, error = %e, "reconnect failed"),
            }
        });
        if let Some(previous) = self.reconnects.insert(id, task) {
            previous.abort();
        }
    }

    fn cancel_reconnect(&self, id: &ChannelId) {
        if let Some((_, task)) = self.reconnects.remove(id) {
            task.abort();
        }
    }

    /// Drop a live handle, leaving in-flight initializations alone.
    async fn evict(&self, id: &ChannelId) {
        let removed = self.slots.remove_if(id, |_, slot| slot.handle.initialized());
        if let Some((_, slot)) = removed {
            if let Some(handle) = slot.handle.get() {
                if let Err(e) = handle.disconnect().await {
                    debug!(channel_id = %id, error = %e, "disconnect during eviction failed");
                }
            }
            self.publish_live_count();
        }
    }

    async fn evict_slot(&self, id: &ChannelId, slot: &Arc<Slot>) {
        if self
            .slots
            .remove_if(id, |_, s| Arc::ptr_eq(s, slot))
            .is_some()
        {
            if let Some(handle) = slot.handle.get() {
                let _ = handle.disconnect().await;
            }
            self.publish_live_count();
        }
    }

    async fn purge_credentials(&self, id: &ChannelId) {
        if let Ok(channel) = self.load(id).await {
            self.store.bind_tenant(id, &channel.tenant_id);
        }
        match self.store.clear(id).await {
            Ok(()) => info!(channel_id = %id, "pairing credentials cleared"),
            Err(e) => warn!(channel_id = %id, error = %e, "failed to clear credentials"),
        }
    }

    fn publish_live_count(&self) {
        tether_metrics::set_live_handles(self.live_count());
    }

    /// Close the channel's session without logging the device out.
    pub async fn disconnect(&self, id: &ChannelId) -> Result<(), TetherError> {
        self.cancel_reconnect(id);
        self.evict(id).await;
        let current = self.load(id).await?;
        if current.status != ChannelStatus::Disconnected
            && current.status.can_transition_to(ChannelStatus::Disconnected)
        {
            channels::update_status(
                &self.db,
                id,
                ChannelStatus::Disconnected,
                current.retry_count,
                current.last_error.as_deref(),
            )
            .await?;
        }
        info!(channel_id = %id, "channel disconnected");
        Ok(())
    }

    /// Soft-delete the channel and purge its credentials.
    pub async fn remove(&self, id: &ChannelId) -> Result<(), TetherError> {
        self.cancel_reconnect(id);
        self.evict(id).await;
        channels::deactivate_channel(&self.db, id).await?;
        self.purge_credentials(id).await;
        self.recorder.finish(id).await;
        info!(channel_id = %id, "channel removed");
        Ok(())
    }

    /// Clear a ban so the channel can be paired again.
    pub async fn reset(&self, id: &ChannelId) -> Result<(), TetherError> {
        let current = self.load(id).await?;
        if !current.status.can_transition_to(ChannelStatus::Uninitialized) {
            return Err(TetherError::InvalidTransition {
                from: current.status,
                to: ChannelStatus::Uninitialized,
            });
        }
        self.cancel_reconnect(id);
        channels::update_status(&self.db, id, ChannelStatus::Uninitialized, 0, None).await?;
        info!(channel_id = %id, "channel reset");
        Ok(())
    }

    /// Number of channels with a live handle.
    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().handle.initialized())
            .count()
    }

    /// The channel's stored status plus its live handle's view.
    pub async fn status(&self, id: &ChannelId) -> Result<ChannelState, TetherError> {
        let channel = self.load(id).await?;
        let handle = self
            .slots
            .get(id)
            .and_then(|slot| slot.handle.get().cloned());
        let live_status = match handle {
            Some(handle) => Some(handle.connection_status().await),
            None => None,
        };
        Ok(ChannelState {
            channel_id: channel.id,
            status: channel.status,
            retry_count: channel.retry_count,
            last_error: channel.last_error,
            active: channel.active,
            live_status,
        })
    }

    /// Disconnect every live handle and cancel pending reconnects.
    pub async fn shutdown(&self) {
        let pending: Vec<ChannelId> = self.reconnects.iter().map(|e| e.key().clone()).collect();
        for id in pending {
            self.cancel_reconnect(&id);
        }
        let ids: Vec<ChannelId> = self.slots.iter().map(|e| e.key().clone()).collect();
        for id in &ids {
            self.evict(id).await;
        }
        info!(count = ids.len(), "registry shut down");
    }
}
