// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Business API transport over HTTPS.
//!
//! Stateless on the wire: `initialize` verifies the access token by fetching
//! the phone-number object, and every send is an independent request.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tether_config::model::CloudApiConfig;
use tether_core::types::{CloudApiSettings, event_types};
use tether_core::{
    AdapterType, Channel, ChannelId, ChannelStatus, ConnectionEvent, EventSender, HealthStatus,
    MessageId, OutboundMessage, PluginAdapter, TenantId, TetherError, TransportAdapter,
    TransportKind,
};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct GraphErrorResponse {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(rename = "type", default)]
    type_: Option<String>,
    #[serde(default)]
    code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PhoneNumber {
    #[serde(default)]
    display_phone_number: Option<String>,
    #[serde(default)]
    verified_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

/// A channel connected through the hosted business messaging API.
pub struct CloudApiTransport {
    channel_id: ChannelId,
    tenant_id: TenantId,
    phone_number_id: String,
    client: reqwest::Client,
    api_base: String,
    status: RwLock<ChannelStatus>,
    events: EventSender,
}

impl CloudApiTransport {
    pub fn new(
        channel: &Channel,
        settings: &CloudApiSettings,
        config: &CloudApiConfig,
        events: EventSender,
    ) -> Result<Self, TetherError> {
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", settings.access_token))
            .map_err(|e| TetherError::Misconfigured(format!("invalid access token header: {e}")))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TetherError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            channel_id: channel.id.clone(),
            tenant_id: channel.tenant_id.clone(),
            phone_number_id: settings.phone_number_id.clone(),
            client,
            api_base: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.api_version
            ),
            status: RwLock::new(ChannelStatus::Uninitialized),
            events,
        })
    }

    fn emit(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            debug!(channel_id = %self.channel_id, "event receiver dropped");
        }
    }

    fn event(&self, event_type: &str) -> ConnectionEvent {
        ConnectionEvent::new(self.channel_id.clone(), self.tenant_id.clone(), event_type)
    }

    fn set_status(&self, status: ChannelStatus) {
        match self.status.write() {
            Ok(mut guard) => *guard = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }

    fn current_status(&self) -> ChannelStatus {
        match self.status.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Turn a non-success response into a transport error carrying the Graph message.
    async fn api_error(response: reqwest::Response) -> (u16, String) {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<GraphErrorResponse>(&body) {
            Ok(parsed) => match (parsed.error.type_, parsed.error.code) {
                (Some(kind), Some(code)) => format!("{kind} ({code}): {}", parsed.error.message),
                _ => parsed.error.message,
            },
            Err(_) => format!("API returned {status}: {body}"),
        };
        (status, message)
    }

    fn request_failed(e: reqwest::Error) -> TetherError {
        TetherError::Transport {
            message: format!("HTTP request failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

#[async_trait]
impl PluginAdapter for CloudApiTransport {
    fn name(&self) -> &str {
        "cloud-api"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        Ok(match self.current_status() {
            ChannelStatus::Connected => HealthStatus::Healthy,
            other => HealthStatus::Degraded(format!("channel is {other}")),
        })
    }

    async fn shutdown(&self) -> Result<(), TetherError> {
        self.disconnect().await
    }
}

#[async_trait]
impl TransportAdapter for CloudApiTransport {
    fn transport_kind(&self) -> TransportKind {
        TransportKind::OfficialBusinessApi
    }

    fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    async fn initialize(&self) -> Result<ChannelStatus, TetherError> {
        self.set_status(ChannelStatus::Opening);
        self.emit(
            self.event(event_types::CONNECTION_ATTEMPT)
                .with_data(json!({"transport": "official-business-api"})),
        );

        let url = format!("{}/{}", self.api_base, self.phone_number_id);
        let response = match self
            .client
            .get(&url)
            .query(&[("fields", "display_phone_number,verified_name")])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.set_status(ChannelStatus::Disconnected);
                self.emit(
                    self.event(event_types::CONNECTION_FAILED)
                        .with_error(format!("HTTP request failed: {e}")),
                );
                return Err(Self::request_failed(e));
            }
        };

        if !response.status().is_success() {
            let (status, message) = Self::api_error(response).await;
            warn!(channel_id = %self.channel_id, status, %message, "access token verification failed");
            self.set_status(ChannelStatus::Disconnected);
            self.emit(
                self.event(event_types::CONNECTION_FAILED)
                    .with_status(status)
                    .with_error(message.clone()),
            );
            return Err(TetherError::transport(message));
        }

        let phone: PhoneNumber = response.json().await.map_err(Self::request_failed)?;
        self.set_status(ChannelStatus::Connected);
        self.emit(self.event(event_types::CONNECTION_OPEN).with_data(json!({
            "connection": "open",
            "display_phone_number": phone.display_phone_number,
            "verified_name": phone.verified_name,
        })));
        info!(channel_id = %self.channel_id, "business API channel verified");
        Ok(ChannelStatus::Connected)
    }

    async fn connection_status(&self) -> ChannelStatus {
        self.current_status()
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, TetherError> {
        if self.current_status() != ChannelStatus::Connected {
            return Err(TetherError::transport(format!(
                "channel {} is not connected",
                self.channel_id
            )));
        }

        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);
        let body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": msg.to,
            "type": "text",
            "text": {"body": msg.text},
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::request_failed)?;

        if !response.status().is_success() {
            let (status, message) = Self::api_error(response).await;
            warn!(channel_id = %self.channel_id, status, %message, "business API send failed");
            return Err(TetherError::transport(message));
        }

        let sent: SendResponse = response.json().await.map_err(Self::request_failed)?;
        let id = sent
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| TetherError::transport("send response carried no message id"))?;
        debug!(channel_id = %self.channel_id, message_id = %id, "message accepted");
        Ok(MessageId(id))
    }

    async fn disconnect(&self) -> Result<(), TetherError> {
        self.set_status(ChannelStatus::Disconnected);
        Ok(())
    }
}
