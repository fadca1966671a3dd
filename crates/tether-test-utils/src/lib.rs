// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tether integration tests.
//!
//! Provides mock transports and harness infrastructure for fast,
//! deterministic, CI-runnable tests without a bridge or the business API.
//!
//! # Components
//!
//! - [`MockTransport`] - Scripted transport handle with event injection and send capture
//! - [`MockTransportFactory`] - Registry factory that hands out mock handles
//! - [`TestHarness`] - Registry wired to temp storage with the event loop running

pub mod fixtures;
pub mod harness;
pub mod mock_transport;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_transport::{InitScript, MockTransport, MockTransportFactory};
