// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder collects these.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use tether_core::{BatchOutcome, Severity};

/// Register all Tether metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "tether_connection_events_total",
        "Connection events observed, by type and severity"
    );
    describe_counter!(
        "tether_credential_writes_total",
        "Credential batch members written, by backend and outcome"
    );
    describe_counter!(
        "tether_initialize_failures_total",
        "Transport initializations that failed or timed out"
    );
    describe_gauge!("tether_live_handles", "Channels with a live transport handle");
    describe_histogram!(
        "tether_initialize_seconds",
        "Time spent opening a transport session"
    );
}

/// Record an observed connection event.
pub fn record_connection_event(event_type: &str, severity: Severity) {
    metrics::counter!(
        "tether_connection_events_total",
        "event_type" => event_type.to_string(),
        "severity" => severity.to_string()
    )
    .increment(1);
}

/// Record the members of a credential batch.
pub fn record_credential_batch(backend: &str, outcome: &BatchOutcome) {
    let applied = outcome.applied() as u64;
    metrics::counter!("tether_credential_writes_total", "backend" => backend.to_string(), "outcome" => "ok")
        .increment(applied);
    if let BatchOutcome::Partial { failed, .. } = outcome {
        metrics::counter!("tether_credential_writes_total", "backend" => backend.to_string(), "outcome" => "failed")
            .increment(failed.len() as u64);
    }
}

/// Set the number of live transport handles.
pub fn set_live_handles(count: usize) {
    metrics::gauge!("tether_live_handles").set(count as f64);
}

/// Record a failed or timed out initialization.
pub fn record_initialize_failure(transport: &str) {
    metrics::counter!("tether_initialize_failures_total", "transport" => transport.to_string())
        .increment(1);
}

/// Record how long an initialization took.
pub fn record_initialize_latency(transport: &str, seconds: f64) {
    metrics::histogram!("tether_initialize_seconds", "transport" => transport.to_string())
        .record(seconds);
}
