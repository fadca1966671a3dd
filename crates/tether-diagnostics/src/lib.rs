// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diagnostic classification of connection events.
//!
//! Turns raw protocol status codes and close reasons into a severity, a short
//! diagnosis, a tenant-readable message, and remediation suggestions.

pub mod classifier;

pub use classifier::{
    EventInput, EventShape, RULES, Rule, classify, classify_event, event_shape, is_tenant_facing,
    matching_rule,
};
