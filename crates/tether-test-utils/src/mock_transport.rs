// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport for deterministic lifecycle testing.
//!
//! `MockTransport` implements `TransportAdapter` with a scripted
//! `initialize()` outcome and lets tests push connection events the way a
//! real protocol session would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tether_core::types::event_types;
use tether_core::{
    AdapterType, Channel, ChannelId, ChannelStatus, ConnectionEvent, EventSender, HealthStatus,
    MessageId, OutboundMessage, PluginAdapter, TenantId, TetherError, TransportAdapter,
    TransportKind,
};
use tether_registry::TransportFactory;

/// How a mock handle's `initialize()` behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitScript {
    /// Emit `connection_open` and settle as connected.
    Connect,
    /// Emit `qr_code_generated` and settle as awaiting a scan.
    ShowQr,
    /// Emit `connection_failed` and return an error.
    Fail(String),
    /// Never resolve.
    Hang,
    /// Report the device removed mid-handshake, then fail.
    RemovedThenFail,
    /// Show a QR, lose the session at once, and still report awaiting a scan.
    QrThenClose,
}

/// Pause after scripted mid-handshake events so the registry sees them first.
const SETTLE: Duration = Duration::from_millis(150);

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A scripted transport handle.
pub struct MockTransport {
    channel_id: ChannelId,
    tenant_id: TenantId,
    kind: TransportKind,
    events: EventSender,
    script: InitScript,
    init_delay: Duration,
    status: Mutex<ChannelStatus>,
    sent: Mutex<Vec<OutboundMessage>>,
    init_calls: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockTransport {
    pub fn new(channel: &Channel, script: InitScript, events: EventSender) -> Self {
        Self {
            channel_id: channel.id.clone(),
            tenant_id: channel.tenant_id.clone(),
            kind: channel.transport_kind,
            events,
            script,
            init_delay: Duration::ZERO,
            status: Mutex::new(ChannelStatus::Uninitialized),
            sent: Mutex::new(Vec::new()),
            init_calls: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Delay `initialize()` so concurrent callers overlap.
    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    /// Build an event for this handle's channel.
    pub fn event(&self, event_type: &str) -> ConnectionEvent {
        ConnectionEvent::new(self.channel_id.clone(), self.tenant_id.clone(), event_type)
    }

    /// Publish an event and update the handle's own status like a real session would.
    pub fn emit(&self, event: ConnectionEvent) {
        let next = match event.event_type.as_str() {
            event_types::QR_CODE_GENERATED => Some(ChannelStatus::QrPending),
            event_types::CONNECTION_OPEN => Some(ChannelStatus::Connected),
            event_types::CONNECTION_CLOSE => Some(ChannelStatus::Disconnected),
            _ => None,
        };
        if let Some(next) = next {
            *lock(&self.status) = next;
        }
        let _ = self.events.send(event);
    }

    pub fn emit_qr(&self) {
        self.emit(
            self.event(event_types::QR_CODE_GENERATED)
                .with_data(json!({"qr": format!("2@{}", uuid::Uuid::new_v4())})),
        );
    }

    pub fn emit_open(&self) {
        self.emit(
            self.event(event_types::CONNECTION_OPEN)
                .with_data(json!({"connection": "open"})),
        );
    }

    /// Close the session with an optional status code and reason.
    pub fn emit_close(&self, status_code: Option<u16>, reason: Option<&str>) {
        let mut event = self
            .event(event_types::CONNECTION_CLOSE)
            .with_data(json!({"connection": "close", "reason": reason}));
        if let Some(code) = status_code {
            event = event.with_status(code);
        }
        if let Some(reason) = reason {
            event = event.with_error(reason);
        }
        self.emit(event);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TetherError> {
        self.disconnect().await
    }
}

#[async_trait]
impl TransportAdapter for MockTransport {
    fn transport_kind(&self) -> TransportKind {
        self.kind
    }

    fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    async fn initialize(&self) -> Result<ChannelStatus, TetherError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.status) = ChannelStatus::Opening;
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        self.emit(self.event(event_types::CONNECTION_ATTEMPT));
        match &self.script {
            InitScript::Connect => {
                self.emit_open();
                Ok(ChannelStatus::Connected)
            }
            InitScript::ShowQr => {
                self.emit_qr();
                Ok(ChannelStatus::QrPending)
            }
            InitScript::Fail(message) => {
                *lock(&self.status) = ChannelStatus::Disconnected;
                self.emit(
                    self.event(event_types::CONNECTION_FAILED)
                        .with_error(message.clone()),
                );
                Err(TetherError::transport(message.clone()))
            }
            InitScript::Hang => std::future::pending().await,
            InitScript::RemovedThenFail => {
                self.emit_close(Some(401), Some("device_removed"));
                tokio::time::sleep(SETTLE).await;
                Err(TetherError::transport("stream errored after device removal"))
            }
            InitScript::QrThenClose => {
                self.emit_qr();
                self.emit_close(Some(408), Some("connection lost"));
                tokio::time::sleep(SETTLE).await;
                Ok(ChannelStatus::QrPending)
            }
        }
    }

    async fn connection_status(&self) -> ChannelStatus {
        *lock(&self.status)
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, TetherError> {
        if *lock(&self.status) != ChannelStatus::Connected {
            return Err(TetherError::transport("mock channel is not connected"));
        }
        lock(&self.sent).push(msg);
        Ok(MessageId(format!("mock-msg-{}", uuid::Uuid::new_v4())))
    }

    async fn disconnect(&self) -> Result<(), TetherError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        *lock(&self.status) = ChannelStatus::Disconnected;
        Ok(())
    }
}

/// Factory handing out [`MockTransport`]s and remembering them.
pub struct MockTransportFactory {
    script: Mutex<InitScript>,
    init_delay: Duration,
    created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockTransportFactory {
    pub fn new(script: InitScript) -> Self {
        Self {
            script: Mutex::new(script),
            init_delay: Duration::ZERO,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    /// Change the script used by handles created from now on.
    pub fn set_script(&self, script: InitScript) {
        *lock(&self.script) = script;
    }

    /// Number of handles created so far.
    pub fn created_count(&self) -> usize {
        lock(&self.created).len()
    }

    /// The most recent handle created for `channel_id`.
    pub fn latest(&self, channel_id: &ChannelId) -> Option<Arc<MockTransport>> {
        lock(&self.created)
            .iter()
            .rev()
            .find(|t| &t.channel_id == channel_id)
            .cloned()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(
        &self,
        channel: &Channel,
        events: EventSender,
    ) -> Result<Arc<dyn TransportAdapter>, TetherError> {
        if channel.config.is_none() {
            return Err(TetherError::Misconfigured(format!(
                "channel {} has no {} settings",
                channel.id, channel.transport_kind
            )));
        }
        let script = lock(&self.script).clone();
        let transport = Arc::new(
            MockTransport::new(channel, script, events).with_init_delay(self.init_delay),
        );
        lock(&self.created).push(transport.clone());
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::pairing_channel;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn connect_script_emits_attempt_then_open() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = pairing_channel("ch-1", "t-1");
        let transport = MockTransport::new(&channel, InitScript::Connect, tx);

        assert_eq!(transport.initialize().await.unwrap(), ChannelStatus::Connected);
        assert_eq!(rx.recv().await.unwrap().event_type, "connection_attempt");
        assert_eq!(rx.recv().await.unwrap().event_type, "connection_open");
        assert_eq!(transport.init_calls(), 1);
    }

    #[tokio::test]
    async fn send_captures_messages_when_connected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let channel = pairing_channel("ch-1", "t-1");
        let transport = MockTransport::new(&channel, InitScript::Connect, tx);
        let msg = OutboundMessage {
            to: "15550101".into(),
            text: "hi".into(),
        };
        assert!(transport.send(msg.clone()).await.is_err());

        transport.initialize().await.unwrap();
        let id = transport.send(msg).await.unwrap();
        assert!(id.0.starts_with("mock-msg-"));
        assert_eq!(transport.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn factory_tracks_latest_handle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let factory = MockTransportFactory::new(InitScript::ShowQr);
        let channel = pairing_channel("ch-2", "t-1");
        factory.create(&channel, tx.clone()).unwrap();
        factory.create(&channel, tx).unwrap();
        assert_eq!(factory.created_count(), 2);
        assert!(factory.latest(&channel.id).is_some());
        assert!(factory.latest(&ChannelId::from("other")).is_none());
    }
}
