// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Tether workspace.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a tenant-owned messaging channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

/// Identifier of a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

/// Identifier of a message accepted by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        ChannelId(s.to_string())
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId(s.to_string())
    }
}

/// Longest channel id accepted at creation.
pub const MAX_CHANNEL_ID_LEN: usize = 128;

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the id can be used as a directory name and a cache key segment.
    ///
    /// Allowed: ASCII letters, digits, `-`, `_` and `.`, except `.` and `..`.
    pub fn validate(&self) -> Result<(), crate::error::TetherError> {
        let id = self.0.as_str();
        let well_formed = !id.is_empty()
            && id.len() <= MAX_CHANNEL_ID_LEN
            && id != "."
            && id != ".."
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        if well_formed {
            Ok(())
        } else {
            Err(crate::error::TetherError::Misconfigured(format!(
                "invalid channel id {id:?}: use 1-{MAX_CHANNEL_ID_LEN} ASCII letters, digits, '-', '_' or '.'"
            )))
        }
    }
}

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of pluggable component.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Transport,
    CredentialStore,
    Storage,
    Observability,
}

/// Which wire protocol a channel speaks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum TransportKind {
    /// Multi-device pairing session driven through a pairing bridge.
    #[strum(serialize = "unofficial-pairing")]
    #[serde(rename = "unofficial-pairing")]
    UnofficialPairing,
    /// Hosted business messaging API over HTTPS.
    #[strum(serialize = "official-business-api")]
    #[serde(rename = "official-business-api")]
    OfficialBusinessApi,
}

/// Lifecycle status of a channel.
///
/// `uninitialized -> opening -> {qr_pending | connected} -> {disconnected | banned}`,
/// with `disconnected -> opening` for retries. `banned` only leaves via an explicit reset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Uninitialized,
    Opening,
    QrPending,
    Connected,
    Disconnected,
    Banned,
}

impl ChannelStatus {
    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Re-entering the current status is always allowed.
    pub fn can_transition_to(self, next: ChannelStatus) -> bool {
        use ChannelStatus::*;
        if self == next {
            return true;
        }
        match self {
            Uninitialized => matches!(next, Opening),
            Opening => matches!(next, QrPending | Connected | Disconnected | Banned),
            QrPending => matches!(next, Connected | Disconnected | Banned),
            Connected => matches!(next, Disconnected | Banned),
            Disconnected => matches!(next, Opening | Banned | Uninitialized),
            Banned => matches!(next, Uninitialized),
        }
    }

    /// Statuses the registry will not leave without operator action.
    pub fn is_terminal(self) -> bool {
        matches!(self, ChannelStatus::Banned)
    }
}

/// Settings for a pairing-bridge channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingSettings {
    /// Per-channel bridge URL; falls back to the deployment default when unset.
    #[serde(default)]
    pub bridge_url: Option<String>,
    /// Phone number to pair by code instead of QR, if the bridge supports it.
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Settings for a business API channel.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudApiSettings {
    pub access_token: String,
    pub phone_number_id: String,
    #[serde(default)]
    pub business_account_id: Option<String>,
}

impl fmt::Debug for CloudApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudApiSettings")
            .field("access_token", &"[redacted]")
            .field("phone_number_id", &self.phone_number_id)
            .field("business_account_id", &self.business_account_id)
            .finish()
    }
}

/// Opaque per-transport configuration stored with a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransportConfig {
    UnofficialPairing(PairingSettings),
    OfficialBusinessApi(CloudApiSettings),
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::UnofficialPairing(_) => TransportKind::UnofficialPairing,
            TransportConfig::OfficialBusinessApi(_) => TransportKind::OfficialBusinessApi,
        }
    }
}

/// A tenant-owned messaging identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub tenant_id: TenantId,
    pub name: String,
    pub transport_kind: TransportKind,
    /// `None` when the tenant has not supplied transport settings yet.
    pub config: Option<TransportConfig>,
    pub status: ChannelStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Soft-delete flag; inactive channels are never connected.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    /// Create a fresh, uninitialized channel.
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        config: TransportConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ChannelId(id.into()),
            tenant_id: TenantId(tenant_id.into()),
            name: name.into(),
            transport_kind: config.kind(),
            config: Some(config),
            status: ChannelStatus::Uninitialized,
            retry_count: 0,
            last_error: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Well-known connection event types.
pub mod event_types {
    pub const CONNECTION_ATTEMPT: &str = "connection_attempt";
    pub const QR_CODE_GENERATED: &str = "qr_code_generated";
    pub const CONNECTION_OPEN: &str = "connection_open";
    pub const CONNECTION_CLOSE: &str = "connection_close";
    pub const CONNECTION_UPDATE: &str = "connection_update";
    pub const CONNECTION_FAILED: &str = "connection_failed";
    pub const CREDS_UPDATE: &str = "creds_update";
}

/// An immutable fact about a channel's connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    /// Row id once persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub channel_id: ChannelId,
    pub tenant_id: TenantId,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub event_data: serde_json::Value,
}

impl ConnectionEvent {
    pub fn new(channel_id: ChannelId, tenant_id: TenantId, event_type: impl Into<String>) -> Self {
        Self {
            id: None,
            channel_id,
            tenant_id,
            timestamp: Utc::now(),
            event_type: event_type.into(),
            status_code: None,
            error_message: None,
            event_data: serde_json::Value::Null,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.event_data = data;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Severity assigned by the diagnostic classifier.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Machine-readable outcome of a classification, used to drive lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisKind {
    DeviceRemoved,
    ManualLogout,
    ConnectionTerminated,
    RestartRequired,
    AwaitingScan,
    Connected,
    ConnectionClosed,
    Generic,
}

/// Structured explanation of a connection event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub kind: DiagnosisKind,
    pub diagnosis: String,
    pub severity: Severity,
    pub user_friendly_message: String,
    pub suggestions: Vec<String>,
}

/// A text message handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Recipient address in the transport's native format.
    pub to: String,
    pub text: String,
}

/// Format a timestamp the way every persisted record stores it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
