// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter registry and connection lifecycle for Tether channels.
//!
//! The [`AdapterRegistry`] caches one live transport handle per channel,
//! opens handles through a [`TransportFactory`], and turns the connection
//! events those handles publish into status transitions and reconnects.

pub mod backoff;
pub mod factory;
pub mod registry;

pub use backoff::BackoffPolicy;
pub use factory::{DefaultTransportFactory, TransportFactory};
pub use registry::{AdapterRegistry, ChannelState};
