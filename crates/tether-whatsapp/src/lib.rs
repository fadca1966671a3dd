// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging transports for Tether channels.
//!
//! Two implementations of [`tether_core::TransportAdapter`]:
//! - [`CloudApiTransport`] for the hosted business API (HTTPS).
//! - [`PairingTransport`] for multi-device pairing through a bridge (WebSocket).

pub mod bridge;
pub mod cloud;
pub mod pairing;

pub use bridge::{BridgeConnector, BridgeLink, InboundFrame, OutboundFrame, WsBridgeConnector};
pub use cloud::CloudApiTransport;
pub use pairing::{MANIFEST_KEY, PairingTransport};
