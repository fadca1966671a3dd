// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tether connection core.
//!
//! This crate provides the domain types, the error taxonomy, and the capability
//! traits (transports and credential stores) used throughout the workspace.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{TetherError, with_timeout};
pub use types::{
    AdapterType, Channel, ChannelId, ChannelStatus, ConnectionEvent, Diagnosis, DiagnosisKind,
    HealthStatus, MessageId, OutboundMessage, Severity, TenantId, TransportConfig, TransportKind,
};

pub use traits::{
    BatchOutcome, CredentialEntry, CredentialStore, EventSender, PluginAdapter, TransportAdapter,
};
