// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant-scoped HTTP read API over the connection event log.
//!
//! Serves recent events, per-channel health metrics and channel status behind
//! bearer tokens that each map to one tenant, plus public `/health` and
//! `/metrics` endpoints for probes and Prometheus.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::{AuthenticatedTenant, TenantTokens};
pub use error::{ApiError, ErrorResponse};
pub use server::{GatewayState, HealthState, router, start_server};
