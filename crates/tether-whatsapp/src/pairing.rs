// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-device pairing transport driven through a pairing bridge.
//!
//! The bridge owns the protocol session; this side owns the credentials. On
//! `initialize` every stored credential is sent in a `resume` frame, and every
//! `creds` frame the bridge emits is written back to the credential store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use tether_core::types::{PairingSettings, event_types};
use tether_core::{
    AdapterType, BatchOutcome, Channel, ChannelId, ChannelStatus, ConnectionEvent,
    CredentialEntry, CredentialStore, EventSender, HealthStatus, MessageId, OutboundMessage,
    PluginAdapter, TenantId, TetherError, TransportAdapter, TransportKind,
};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeConnector, InboundFrame, OutboundFrame};

/// Credential key holding the list of every other stored key.
pub const MANIFEST_KEY: &str = "creds";

/// Parse a stored manifest. A missing or corrupt manifest means no credentials.
fn parse_manifest(bytes: &[u8]) -> BTreeSet<String> {
    serde_json::from_slice::<Vec<String>>(bytes)
        .map(|keys| keys.into_iter().collect())
        .unwrap_or_default()
}

fn encode_manifest(keys: &BTreeSet<String>) -> Vec<u8> {
    serde_json::to_vec(keys).unwrap_or_else(|_| b"[]".to_vec())
}

/// State shared between the transport handle and its session task.
struct Session {
    channel_id: ChannelId,
    tenant_id: TenantId,
    store: Arc<dyn CredentialStore>,
    events: EventSender,
    status: watch::Sender<ChannelStatus>,
    keys: Mutex<BTreeSet<String>>,
}

impl Session {
    fn emit(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            debug!(channel_id = %self.channel_id, "event receiver dropped");
        }
    }

    fn event(&self, event_type: &str) -> ConnectionEvent {
        ConnectionEvent::new(self.channel_id.clone(), self.tenant_id.clone(), event_type)
    }

    /// Load every stored credential for the `resume` frame.
    ///
    /// Read failures degrade to missing keys, which makes the bridge fall back to pairing.
    async fn load_credentials(&self) -> BTreeMap<String, String> {
        let manifest = match self.store.read(&self.channel_id, MANIFEST_KEY).await {
            Ok(Some(bytes)) => parse_manifest(&bytes),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                warn!(channel_id = %self.channel_id, error = %e, "credential manifest unreadable");
                BTreeSet::new()
            }
        };

        let mut creds = BTreeMap::new();
        let mut present = BTreeSet::new();
        for key in manifest {
            match self.store.read(&self.channel_id, &key).await {
                Ok(Some(value)) => {
                    creds.insert(key.clone(), STANDARD.encode(value));
                    present.insert(key);
                }
                Ok(None) => debug!(channel_id = %self.channel_id, key = %key, "listed credential missing"),
                Err(e) => {
                    warn!(channel_id = %self.channel_id, key = %key, error = %e, "credential unreadable")
                }
            }
        }
        *self.keys.lock().await = present;
        creds
    }

    /// Persist a `creds` frame as one batch, manifest included.
    async fn apply_creds(&self, set: BTreeMap<String, String>, delete: Vec<String>) {
        let mut entries = Vec::with_capacity(set.len() + delete.len() + 1);
        let mut set_keys = Vec::new();
        let mut deleted_keys = Vec::new();
        let mut keys = self.keys.lock().await;

        for (key, value) in set {
            if key == MANIFEST_KEY {
                warn!(channel_id = %self.channel_id, "bridge tried to overwrite the credential manifest");
                continue;
            }
            match STANDARD.decode(value.as_bytes()) {
                Ok(bytes) => {
                    keys.insert(key.clone());
                    entries.push(CredentialEntry::set(self.channel_id.clone(), key.clone(), bytes));
                    set_keys.push(key);
                }
                Err(e) => {
                    warn!(channel_id = %self.channel_id, key = %key, error = %e, "dropping undecodable credential")
                }
            }
        }
        for key in delete {
            if key == MANIFEST_KEY {
                continue;
            }
            keys.remove(&key);
            entries.push(CredentialEntry::delete(self.channel_id.clone(), key.clone()));
            deleted_keys.push(key);
        }
        entries.push(CredentialEntry::set(
            self.channel_id.clone(),
            MANIFEST_KEY,
            encode_manifest(&keys),
        ));
        drop(keys);

        let outcome = self.store.batch_write(entries).await;
        tether_metrics::record_credential_batch(self.store.name(), &outcome);
        let (label, failed) = match &outcome {
            BatchOutcome::Complete { .. } => ("complete", Vec::new()),
            BatchOutcome::Partial { failed, .. } => ("partial", failed.clone()),
        };
        self.emit(self.event(event_types::CREDS_UPDATE).with_data(json!({
            "set": set_keys,
            "delete": deleted_keys,
            "outcome": label,
            "failed": failed,
        })));
    }

    /// Consume bridge frames until the session closes.
    async fn run(self: Arc<Self>, mut incoming: mpsc::UnboundedReceiver<InboundFrame>) {
        while let Some(frame) = incoming.recv().await {
            match frame {
                InboundFrame::Qr { qr } => {
                    self.status.send_replace(ChannelStatus::QrPending);
                    self.emit(self.event(event_types::QR_CODE_GENERATED).with_data(json!({"qr": qr})));
                }
                InboundFrame::Open { me } => {
                    self.status.send_replace(ChannelStatus::Connected);
                    info!(channel_id = %self.channel_id, "pairing session open");
                    self.emit(
                        self.event(event_types::CONNECTION_OPEN)
                            .with_data(json!({"connection": "open", "me": me})),
                    );
                }
                InboundFrame::Creds { set, delete } => self.apply_creds(set, delete).await,
                InboundFrame::Close {
                    status_code,
                    reason,
                    is_device_removed,
                } => {
                    self.status.send_replace(ChannelStatus::Disconnected);
                    let mut event = self.event(event_types::CONNECTION_CLOSE).with_data(json!({
                        "connection": "close",
                        "reason": reason,
                        "isDeviceRemoved": is_device_removed,
                    }));
                    if let Some(code) = status_code {
                        event = event.with_status(code);
                    }
                    if let Some(reason) = reason {
                        event = event.with_error(reason);
                    }
                    info!(channel_id = %self.channel_id, ?status_code, "pairing session closed");
                    self.emit(event);
                    return;
                }
            }
        }
        self.status.send_replace(ChannelStatus::Disconnected);
    }
}

/// A channel connected through a pairing bridge.
pub struct PairingTransport {
    session: Arc<Session>,
    bridge_url: String,
    phone_number: Option<String>,
    connector: Arc<dyn BridgeConnector>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl PairingTransport {
    /// `default_bridge_url` applies when the channel does not set its own.
    pub fn new(
        channel: &Channel,
        settings: &PairingSettings,
        default_bridge_url: &str,
        store: Arc<dyn CredentialStore>,
        connector: Arc<dyn BridgeConnector>,
        events: EventSender,
    ) -> Self {
        store.bind_tenant(&channel.id, &channel.tenant_id);
        let (status, _) = watch::channel(ChannelStatus::Uninitialized);
        Self {
            session: Arc::new(Session {
                channel_id: channel.id.clone(),
                tenant_id: channel.tenant_id.clone(),
                store,
                events,
                status,
                keys: Mutex::new(BTreeSet::new()),
            }),
            bridge_url: settings
                .bridge_url
                .clone()
                .unwrap_or_else(|| default_bridge_url.to_string()),
            phone_number: settings.phone_number.clone(),
            connector,
            outgoing: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    pub fn bridge_url(&self) -> &str {
        &self.bridge_url
    }

    async fn stop_session(&self) {
        if let Some(tx) = self.outgoing.lock().await.take() {
            let _ = tx.send(OutboundFrame::Close);
        }
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
    }
}

#[async_trait]
impl PluginAdapter for PairingTransport {
    fn name(&self) -> &str {
        "pairing"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        Ok(match *self.session.status.borrow() {
            ChannelStatus::Connected => HealthStatus::Healthy,
            ChannelStatus::QrPending => HealthStatus::Degraded("awaiting QR scan".into()),
            other => HealthStatus::Unhealthy(format!("channel is {other}")),
        })
    }

    async fn shutdown(&self) -> Result<(), TetherError> {
        self.disconnect().await
    }
}

#[async_trait]
impl TransportAdapter for PairingTransport {
    fn transport_kind(&self) -> TransportKind {
        TransportKind::UnofficialPairing
    }

    fn channel_id(&self) -> &ChannelId {
        &self.session.channel_id
    }

    async fn initialize(&self) -> Result<ChannelStatus, TetherError> {
        self.stop_session().await;
        let session = &self.session;
        session.status.send_replace(ChannelStatus::Opening);
        session.emit(
            session
                .event(event_types::CONNECTION_ATTEMPT)
                .with_data(json!({"transport": "unofficial-pairing", "bridge": self.bridge_url})),
        );

        let creds = session.load_credentials().await;
        let resuming = !creds.is_empty();

        let link = match self.connector.connect(&self.bridge_url).await {
            Ok(link) => link,
            Err(e) => {
                session.status.send_replace(ChannelStatus::Disconnected);
                session.emit(
                    session
                        .event(event_types::CONNECTION_FAILED)
                        .with_error(e.to_string()),
                );
                return Err(e);
            }
        };

        let mut status_rx = session.status.subscribe();
        link.outgoing
            .send(OutboundFrame::Resume {
                creds,
                phone_number: self.phone_number.clone(),
            })
            .map_err(|_| TetherError::transport("bridge closed before resume"))?;
        *self.outgoing.lock().await = Some(link.outgoing);
        *self.reader.lock().await = Some(tokio::spawn(session.clone().run(link.incoming)));
        debug!(channel_id = %session.channel_id, resuming, "resume frame sent");

        let settled = *status_rx
            .wait_for(|s| {
                matches!(
                    s,
                    ChannelStatus::QrPending
                        | ChannelStatus::Connected
                        | ChannelStatus::Disconnected
                        | ChannelStatus::Banned
                )
            })
            .await
            .map_err(|_| TetherError::Internal("pairing status channel closed".into()))?;

        match settled {
            ChannelStatus::QrPending | ChannelStatus::Connected => Ok(settled),
            other => Err(TetherError::transport(format!(
                "bridge ended the session while opening (status: {other})"
            ))),
        }
    }

    async fn connection_status(&self) -> ChannelStatus {
        *self.session.status.borrow()
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, TetherError> {
        if *self.session.status.borrow() != ChannelStatus::Connected {
            return Err(TetherError::transport(format!(
                "channel {} is not connected",
                self.session.channel_id
            )));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let outgoing = self.outgoing.lock().await;
        let tx = outgoing
            .as_ref()
            .ok_or_else(|| TetherError::transport("no bridge session"))?;
        tx.send(OutboundFrame::Send {
            id: id.clone(),
            to: msg.to,
            text: msg.text,
        })
        .map_err(|_| TetherError::transport("bridge session closed"))?;
        Ok(MessageId(id))
    }

    async fn disconnect(&self) -> Result<(), TetherError> {
        self.stop_session().await;
        self.session.status.send_replace(ChannelStatus::Disconnected);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeLink;
    use std::time::Duration;
    use tether_core::TransportConfig;
    use tether_credstore::MemoryCredentialStore;

    struct FakeConnector {
        link: std::sync::Mutex<Option<BridgeLink>>,
    }

    #[async_trait]
    impl BridgeConnector for FakeConnector {
        async fn connect(&self, _url: &str) -> Result<BridgeLink, TetherError> {
            self.link
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| TetherError::transport("bridge unavailable"))
        }
    }

    struct Bridge {
        from_transport: mpsc::UnboundedReceiver<OutboundFrame>,
        to_transport: mpsc::UnboundedSender<InboundFrame>,
    }

    fn fake_bridge() -> (Arc<FakeConnector>, Bridge) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let connector = FakeConnector {
            link: std::sync::Mutex::new(Some(BridgeLink {
                outgoing: out_tx,
                incoming: in_rx,
            })),
        };
        (
            Arc::new(connector),
            Bridge {
                from_transport: out_rx,
                to_transport: in_tx,
            },
        )
    }

    fn channel() -> Channel {
        Channel::new(
            "ch-pair",
            "tenant-a",
            "sales",
            TransportConfig::UnofficialPairing(PairingSettings::default()),
        )
    }

    fn transport(
        store: Arc<MemoryCredentialStore>,
        connector: Arc<FakeConnector>,
    ) -> (PairingTransport, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = PairingTransport::new(
            &channel(),
            &PairingSettings::default(),
            "ws://bridge.test/pairing",
            store,
            connector,
            tx,
        );
        (transport, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn initialize_leaves_lifecycle_metrics_to_the_registry() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                let store = Arc::new(MemoryCredentialStore::new());
                let (connector, _bridge) = fake_bridge();
                connector.link.lock().unwrap().take();
                let (transport, _rx) = transport(store, connector);
                assert!(transport.initialize().await.is_err());
            })
        });
        assert!(!handle.render().contains("tether_initialize"));
    }

    #[tokio::test]
    async fn fresh_channel_settles_in_qr_pending() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (connector, mut bridge) = fake_bridge();
        let (transport, mut events) = transport(store, connector);

        bridge
            .to_transport
            .send(InboundFrame::Qr { qr: "2@abc".into() })
            .unwrap();
        assert_eq!(transport.initialize().await.unwrap(), ChannelStatus::QrPending);

        let resume = bridge.from_transport.recv().await.unwrap();
        assert_eq!(
            resume,
            OutboundFrame::Resume {
                creds: BTreeMap::new(),
                phone_number: None
            }
        );
        assert_eq!(next_event(&mut events).await.event_type, "connection_attempt");
        let qr = next_event(&mut events).await;
        assert_eq!(qr.event_type, "qr_code_generated");
        assert_eq!(qr.event_data["qr"], "2@abc");
    }

    #[tokio::test]
    async fn stored_credentials_are_resumed() {
        let store = Arc::new(MemoryCredentialStore::new());
        let ch = channel().id;
        store.write(&ch, "pre-key-1", &[0xff, 0x00, 0x80]).await.unwrap();
        store.write(&ch, "session-9@s", b"abc").await.unwrap();
        store
            .write(&ch, MANIFEST_KEY, br#"["pre-key-1","session-9@s","gone"]"#)
            .await
            .unwrap();

        let (connector, mut bridge) = fake_bridge();
        let (transport, _events) = transport(store, connector);
        bridge
            .to_transport
            .send(InboundFrame::Open { me: Some("15550100@s".into()) })
            .unwrap();
        assert_eq!(transport.initialize().await.unwrap(), ChannelStatus::Connected);

        match bridge.from_transport.recv().await.unwrap() {
            OutboundFrame::Resume { creds, .. } => {
                assert_eq!(creds.len(), 2);
                assert_eq!(creds["pre-key-1"], STANDARD.encode([0xffu8, 0x00, 0x80]));
            }
            other => panic!("expected resume, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn creds_frames_are_persisted_with_manifest() {
        let store = Arc::new(MemoryCredentialStore::new());
        let ch = channel().id;
        let (connector, bridge) = fake_bridge();
        let (transport, mut events) = transport(store.clone(), connector);

        bridge.to_transport.send(InboundFrame::Open { me: None }).unwrap();
        transport.initialize().await.unwrap();
        bridge
            .to_transport
            .send(InboundFrame::Creds {
                set: BTreeMap::from([
                    ("pre-key-2".to_string(), STANDARD.encode([1u8, 2, 3])),
                    ("bad".to_string(), "%%%".to_string()),
                ]),
                delete: vec![],
            })
            .unwrap();

        loop {
            let event = next_event(&mut events).await;
            if event.event_type == "creds_update" {
                assert_eq!(event.event_data["outcome"], "complete");
                assert_eq!(event.event_data["set"], json!(["pre-key-2"]));
                break;
            }
        }
        assert_eq!(store.read(&ch, "pre-key-2").await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.read(&ch, "bad").await.unwrap(), None);
        let manifest = store.read(&ch, MANIFEST_KEY).await.unwrap().unwrap();
        assert_eq!(parse_manifest(&manifest), BTreeSet::from(["pre-key-2".to_string()]));
    }

    #[tokio::test]
    async fn close_frame_reports_status_and_reason() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (connector, bridge) = fake_bridge();
        let (transport, mut events) = transport(store, connector);

        bridge.to_transport.send(InboundFrame::Open { me: None }).unwrap();
        transport.initialize().await.unwrap();
        bridge
            .to_transport
            .send(InboundFrame::Close {
                status_code: Some(401),
                reason: Some("device_removed".into()),
                is_device_removed: true,
            })
            .unwrap();

        loop {
            let event = next_event(&mut events).await;
            if event.event_type == "connection_close" {
                assert_eq!(event.status_code, Some(401));
                assert_eq!(event.error_message.as_deref(), Some("device_removed"));
                assert_eq!(event.event_data["isDeviceRemoved"], true);
                break;
            }
        }
        assert_eq!(transport.connection_status().await, ChannelStatus::Disconnected);
    }

    #[tokio::test]
    async fn close_while_opening_fails_initialize() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (connector, bridge) = fake_bridge();
        let (transport, _events) = transport(store, connector);
        bridge
            .to_transport
            .send(InboundFrame::Close {
                status_code: Some(515),
                reason: None,
                is_device_removed: false,
            })
            .unwrap();
        assert!(transport.initialize().await.is_err());
    }

    #[tokio::test]
    async fn unreachable_bridge_emits_connection_failed() {
        let store = Arc::new(MemoryCredentialStore::new());
        let connector = Arc::new(FakeConnector {
            link: std::sync::Mutex::new(None),
        });
        let (transport, mut events) = transport(store, connector);
        assert!(transport.initialize().await.is_err());
        assert_eq!(next_event(&mut events).await.event_type, "connection_attempt");
        assert_eq!(next_event(&mut events).await.event_type, "connection_failed");
    }

    #[tokio::test]
    async fn send_forwards_to_bridge_once_connected() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (connector, mut bridge) = fake_bridge();
        let (transport, _events) = transport(store, connector);
        bridge.to_transport.send(InboundFrame::Open { me: None }).unwrap();
        transport.initialize().await.unwrap();
        let _resume = bridge.from_transport.recv().await.unwrap();

        let id = transport
            .send(OutboundMessage {
                to: "15550101".into(),
                text: "hi".into(),
            })
            .await
            .unwrap();
        match bridge.from_transport.recv().await.unwrap() {
            OutboundFrame::Send { id: sent, to, text } => {
                assert_eq!(MessageId(sent), id);
                assert_eq!(to, "15550101");
                assert_eq!(text, "hi");
            }
            other => panic!("expected send, got {other:?}"),
        }

        transport.disconnect().await.unwrap();
        assert_eq!(bridge.from_transport.recv().await.unwrap(), OutboundFrame::Close);
        assert!(transport
            .send(OutboundMessage {
                to: "1".into(),
                text: "x".into()
            })
            .await
            .is_err());
    }
}
