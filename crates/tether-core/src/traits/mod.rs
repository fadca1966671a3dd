// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits for the Tether connection core.
//!
//! All pluggable components extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod credentials;
pub mod transport;

pub use adapter::PluginAdapter;
pub use credentials::{BatchOutcome, CredentialEntry, CredentialStore};
pub use transport::{EventSender, TransportAdapter};
