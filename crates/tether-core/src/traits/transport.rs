// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport capability trait shared by both wire protocols.

use async_trait::async_trait;

use crate::error::TetherError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelId, ChannelStatus, ConnectionEvent, MessageId, OutboundMessage, TransportKind};

/// Where transports publish the connection events they observe.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<ConnectionEvent>;

/// A live connection handle for one channel.
///
/// Handles are shared behind `Arc` by the registry, so every method takes
/// `&self` and implementations keep their mutable state internally.
#[async_trait]
pub trait TransportAdapter: PluginAdapter {
    /// The wire protocol this handle speaks.
    fn transport_kind(&self) -> TransportKind;

    /// The channel this handle belongs to.
    fn channel_id(&self) -> &ChannelId;

    /// Opens the session and returns the status it settled in
    /// (`qr_pending` or `connected`).
    async fn initialize(&self) -> Result<ChannelStatus, TetherError>;

    /// The handle's own view of its connection.
    async fn connection_status(&self) -> ChannelStatus;

    /// Sends a message through the channel.
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, TetherError>;

    /// Closes the session without logging the device out.
    async fn disconnect(&self) -> Result<(), TetherError>;
}
