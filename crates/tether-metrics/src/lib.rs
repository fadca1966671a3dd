// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection health metrics for Tether.
//!
//! Two halves: [`aggregator`] computes per-channel health summaries from the
//! persisted event log, and [`recording`] feeds live counters to the
//! Prometheus exporter rendered on the gateway's `/metrics` endpoint.

pub mod aggregator;
pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use tether_core::{AdapterType, HealthStatus, PluginAdapter, TetherError};

pub use aggregator::{
    DEFAULT_TOP_ERRORS, ErrorSummary, MetricsSnapshot, MetricsWindow, TimelineEntry, aggregate,
};
pub use recording::{
    record_connection_event, record_credential_batch, record_initialize_failure,
    record_initialize_latency, register_metrics, set_live_handles,
};

/// Prometheus exporter.
///
/// Holds the handle used to render collected metrics in the text exposition format.
#[derive(Clone)]
pub struct PrometheusExporter {
    handle: PrometheusHandle,
}

impl PrometheusExporter {
    /// Install the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call fails.
    pub fn install() -> Result<Self, TetherError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| TetherError::Internal(format!("failed to install Prometheus recorder: {e}")))?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Wrap an existing handle, e.g. from a recorder that is not installed globally.
    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusExporter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TetherError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{BatchOutcome, Severity};

    // The global recorder can only be installed once per process, so these
    // tests record through a thread-local one.
    fn local() -> (metrics_exporter_prometheus::PrometheusRecorder, PrometheusExporter) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let exporter = PrometheusExporter::from_handle(recorder.handle());
        (recorder, exporter)
    }

    #[test]
    fn connection_events_are_labelled() {
        let (recorder, exporter) = local();
        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            record_connection_event("connection_close", Severity::Critical);
            record_connection_event("connection_close", Severity::Critical);
        });
        let text = exporter.render();
        assert!(text.contains("tether_connection_events_total"));
        assert!(text.contains("event_type=\"connection_close\""));
        assert!(text.contains("severity=\"critical\""));
    }

    #[test]
    fn partial_batches_count_failures() {
        let (recorder, exporter) = local();
        metrics::with_local_recorder(&recorder, || {
            record_credential_batch(
                "file",
                &BatchOutcome::Partial {
                    applied: 3,
                    failed: vec!["pre-key-1".into()],
                },
            );
            set_live_handles(4);
        });
        let text = exporter.render();
        assert!(text.contains("outcome=\"failed\"} 1"));
        assert!(text.contains("outcome=\"ok\"} 3"));
        assert!(text.contains("tether_live_handles 4"));
    }

    #[tokio::test]
    async fn exporter_is_an_observability_adapter() {
        let (_recorder, exporter) = local();
        assert_eq!(exporter.adapter_type(), AdapterType::Observability);
        assert_eq!(exporter.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
