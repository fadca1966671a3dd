// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage entity types.
//!
//! Channels and events are the core domain types; this module re-exports them
//! and adds the row shape the event log keeps alongside each event.

use tether_core::types::{ConnectionEvent, Severity};

pub use tether_core::types::{Channel, ChannelStatus, TransportConfig};

/// A persisted connection event with the classification captured at write time.
///
/// `severity` and `diagnosis` are a filtering aid; readers that need an
/// authoritative diagnosis reclassify `event`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub event: ConnectionEvent,
    pub severity: Option<Severity>,
    pub diagnosis: Option<String>,
}
