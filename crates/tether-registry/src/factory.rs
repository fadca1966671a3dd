// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Construction of transport handles from channel records.

use std::sync::Arc;
use std::time::Duration;

use tether_config::model::{CloudApiConfig, PairingConfig};
use tether_core::{
    Channel, CredentialStore, EventSender, TetherError, TransportAdapter, TransportConfig,
    TransportKind,
};
use tether_whatsapp::{BridgeConnector, CloudApiTransport, PairingTransport, WsBridgeConnector};

/// Builds an unopened transport handle for a channel.
pub trait TransportFactory: Send + Sync + 'static {
    fn create(
        &self,
        channel: &Channel,
        events: EventSender,
    ) -> Result<Arc<dyn TransportAdapter>, TetherError>;
}

/// Dispatches on the channel's transport kind.
///
/// A channel whose settings are missing or belong to the other kind is
/// rejected; it never falls back to a different transport.
pub struct DefaultTransportFactory {
    store: Arc<dyn CredentialStore>,
    connector: Arc<dyn BridgeConnector>,
    cloud_api: CloudApiConfig,
    pairing: PairingConfig,
}

impl DefaultTransportFactory {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cloud_api: CloudApiConfig,
        pairing: PairingConfig,
    ) -> Self {
        let connector = Arc::new(WsBridgeConnector::new(Duration::from_secs(
            pairing.connect_timeout_secs,
        )));
        Self::with_connector(store, connector, cloud_api, pairing)
    }

    /// Use a specific bridge connector, e.g. an in-memory one.
    pub fn with_connector(
        store: Arc<dyn CredentialStore>,
        connector: Arc<dyn BridgeConnector>,
        cloud_api: CloudApiConfig,
        pairing: PairingConfig,
    ) -> Self {
        Self {
            store,
            connector,
            cloud_api,
            pairing,
        }
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(
        &self,
        channel: &Channel,
        events: EventSender,
    ) -> Result<Arc<dyn TransportAdapter>, TetherError> {
        match (channel.transport_kind, &channel.config) {
            (TransportKind::UnofficialPairing, Some(TransportConfig::UnofficialPairing(settings))) => {
                Ok(Arc::new(PairingTransport::new(
                    channel,
                    settings,
                    &self.pairing.bridge_url,
                    self.store.clone(),
                    self.connector.clone(),
                    events,
                )))
            }
            (
                TransportKind::OfficialBusinessApi,
                Some(TransportConfig::OfficialBusinessApi(settings)),
            ) => Ok(Arc::new(CloudApiTransport::new(
                channel,
                settings,
                &self.cloud_api,
                events,
            )?)),
            (kind, Some(other)) => Err(TetherError::Misconfigured(format!(
                "channel {} is {kind} but carries {} settings",
                channel.id,
                other.kind()
            ))),
            (kind, None) => Err(TetherError::Misconfigured(format!(
                "channel {} has no {kind} settings",
                channel.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::types::{CloudApiSettings, PairingSettings};
    use tether_credstore::MemoryCredentialStore;
    use tokio::sync::mpsc;

    fn factory() -> DefaultTransportFactory {
        DefaultTransportFactory::new(
            Arc::new(MemoryCredentialStore::new()),
            CloudApiConfig::default(),
            PairingConfig::default(),
        )
    }

    fn cloud_settings() -> TransportConfig {
        TransportConfig::OfficialBusinessApi(CloudApiSettings {
            access_token: "t".into(),
            phone_number_id: "1".into(),
            business_account_id: None,
        })
    }

    #[tokio::test]
    async fn dispatches_on_kind() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let pairing = Channel::new(
            "a",
            "t",
            "a",
            TransportConfig::UnofficialPairing(PairingSettings::default()),
        );
        let handle = factory().create(&pairing, tx.clone()).unwrap();
        assert_eq!(handle.transport_kind(), TransportKind::UnofficialPairing);

        let cloud = Channel::new("b", "t", "b", cloud_settings());
        let handle = factory().create(&cloud, tx).unwrap();
        assert_eq!(handle.transport_kind(), TransportKind::OfficialBusinessApi);
        assert_eq!(handle.channel_id().as_str(), "b");
    }

    #[test]
    fn mismatched_settings_are_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut channel = Channel::new("c", "t", "c", cloud_settings());
        channel.transport_kind = TransportKind::UnofficialPairing;
        let err = factory().create(&channel, tx).err().unwrap();
        assert!(matches!(err, TetherError::Misconfigured(_)));
        assert!(err.to_string().contains("official-business-api settings"));
    }

    #[test]
    fn missing_settings_are_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut channel = Channel::new("d", "t", "d", cloud_settings());
        channel.config = None;
        let err = factory().create(&channel, tx).err().unwrap();
        assert!(matches!(err, TetherError::Misconfigured(_)));
    }
}
