// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection health summaries computed from the raw event stream.
//!
//! Pure functions: the same events and window always produce the same snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tether_core::types::{ConnectionEvent, Severity, event_types};
use tether_diagnostics::{EventInput, EventShape, classify, event_shape};

/// Number of distinct errors reported when the caller does not choose.
pub const DEFAULT_TOP_ERRORS: usize = 10;

/// Inclusive time range a snapshot covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MetricsWindow {
    /// The `days` days ending at `now`.
    ///
    /// `None` when the start would fall outside the representable calendar.
    pub fn last_days(days: u32, now: DateTime<Utc>) -> Option<Self> {
        let span = Duration::try_days(i64::from(days))?;
        Some(Self {
            start: now.checked_sub_signed(span)?,
            end: now,
        })
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts <= self.end
    }
}

/// One distinct error and how often it occurred.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub status_code: Option<u16>,
    pub message: String,
    pub count: u64,
    pub last_occurrence: DateTime<Utc>,
}

/// A run of consecutive, equivalent events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
    pub event_type: String,
    pub severity: Severity,
    pub status_code: Option<u16>,
    pub diagnosis: String,
    pub count: u64,
}

/// Aggregate connection health over a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub window: MetricsWindow,
    pub total_events: u64,
    pub connection_attempts: u64,
    pub successful_connections: u64,
    pub failed_connections: u64,
    /// Percentage of attempts that opened, two decimals.
    pub success_rate: f64,
    /// Mean open-to-close time in seconds, two decimals.
    pub average_connection_duration_secs: f64,
    pub most_common_errors: Vec<ErrorSummary>,
    pub events_by_type: BTreeMap<String, u64>,
    pub events_by_severity: BTreeMap<Severity, u64>,
    pub timeline: Vec<TimelineEntry>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Summarize the events of `events` that fall inside `window`.
///
/// Input order does not matter. Events are ordered by timestamp; ties fall back to
/// row id, then event type, status code and error message.
pub fn aggregate(
    events: &[ConnectionEvent],
    window: MetricsWindow,
    top_errors: usize,
) -> MetricsSnapshot {
    let mut in_window: Vec<&ConnectionEvent> =
        events.iter().filter(|e| window.contains(&e.timestamp)).collect();
    in_window.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.id.cmp(&b.id))
            .then_with(|| a.event_type.cmp(&b.event_type))
            .then(a.status_code.cmp(&b.status_code))
            .then_with(|| a.error_message.cmp(&b.error_message))
    });

    let mut attempts = 0u64;
    let mut successes = 0u64;
    let mut failures = 0u64;
    let mut events_by_type: BTreeMap<String, u64> = BTreeMap::new();
    let mut events_by_severity: BTreeMap<Severity, u64> = BTreeMap::new();
    let mut errors: BTreeMap<(Option<u16>, String), ErrorSummary> = BTreeMap::new();
    let mut timeline: Vec<TimelineEntry> = Vec::new();
    let mut open_since: Option<DateTime<Utc>> = None;
    let mut durations: Vec<f64> = Vec::new();

    for event in &in_window {
        let input = EventInput::from(*event);
        let diagnosis = classify(&input);
        let shape = event_shape(&input);

        *events_by_type.entry(event.event_type.clone()).or_default() += 1;
        *events_by_severity.entry(diagnosis.severity).or_default() += 1;

        if event.event_type == event_types::CONNECTION_ATTEMPT {
            attempts += 1;
        }
        match shape {
            EventShape::Opened => {
                successes += 1;
                // A second open without a close restarts the measurement.
                open_since = Some(event.timestamp);
            }
            EventShape::Closed => {
                if diagnosis.severity >= Severity::Error {
                    failures += 1;
                }
                if let Some(opened) = open_since.take() {
                    let secs = (event.timestamp - opened).num_milliseconds() as f64 / 1000.0;
                    durations.push(secs);
                }
            }
            EventShape::Other => {}
        }
        if event.event_type == event_types::CONNECTION_FAILED {
            failures += 1;
        }

        let is_error = (diagnosis.severity >= Severity::Warning
            || event.event_type == event_types::CONNECTION_FAILED)
            && (event.error_message.is_some() || event.status_code.is_some());
        if is_error {
            let message = event
                .error_message
                .clone()
                .unwrap_or_else(|| diagnosis.diagnosis.clone());
            let summary = errors
                .entry((event.status_code, message.clone()))
                .or_insert_with(|| ErrorSummary {
                    status_code: event.status_code,
                    message,
                    count: 0,
                    last_occurrence: event.timestamp,
                });
            summary.count += 1;
            summary.last_occurrence = summary.last_occurrence.max(event.timestamp);
        }

        match timeline.last_mut() {
            Some(last)
                if last.event_type == event.event_type
                    && last.severity == diagnosis.severity
                    && last.status_code == event.status_code =>
            {
                last.count += 1;
                last.last_timestamp = event.timestamp;
            }
            _ => timeline.push(TimelineEntry {
                timestamp: event.timestamp,
                last_timestamp: event.timestamp,
                event_type: event.event_type.clone(),
                severity: diagnosis.severity,
                status_code: event.status_code,
                diagnosis: diagnosis.diagnosis,
                count: 1,
            }),
        }
    }

    let success_rate = if attempts == 0 {
        0.0
    } else {
        round2(successes as f64 * 100.0 / attempts as f64)
    };
    let average_connection_duration_secs = if durations.is_empty() {
        0.0
    } else {
        round2(durations.iter().sum::<f64>() / durations.len() as f64)
    };

    let mut most_common_errors: Vec<ErrorSummary> = errors.into_values().collect();
    most_common_errors.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(b.last_occurrence.cmp(&a.last_occurrence))
            .then(a.status_code.cmp(&b.status_code))
            .then(a.message.cmp(&b.message))
    });
    most_common_errors.truncate(top_errors);

    MetricsSnapshot {
        window,
        total_events: in_window.len() as u64,
        connection_attempts: attempts,
        successful_connections: successes,
        failed_connections: failures,
        success_rate,
        average_connection_duration_secs,
        most_common_errors,
        events_by_type,
        events_by_severity,
        timeline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tether_core::types::{ChannelId, TenantId};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn ev(kind: &str, offset_secs: i64) -> ConnectionEvent {
        ConnectionEvent::new(ChannelId::from("ch"), TenantId::from("t"), kind)
            .at(base() + Duration::seconds(offset_secs))
    }

    fn window() -> MetricsWindow {
        MetricsWindow::last_days(30, base() + Duration::days(1)).unwrap()
    }

    #[test]
    fn window_past_the_calendar_is_rejected() {
        assert!(MetricsWindow::last_days(u32::MAX, base()).is_none());
        let widest = MetricsWindow::last_days(36_500, base()).unwrap();
        assert_eq!(widest.end, base());
        assert!(widest.start < base());
    }

    #[test]
    fn same_instant_events_summarize_identically_in_any_order() {
        let events = vec![
            ev("connection_attempt", 0),
            ev("connection_open", 5),
            ev("connection_close", 5).with_status(428).with_error("terminated"),
            ev("connection_update", 5).with_data(json!({"connection": "open"})),
            ev("connection_close", 60).with_status(408),
        ];
        let mut reversed = events.clone();
        reversed.reverse();
        let mut rotated = events.clone();
        rotated.rotate_left(2);

        let expected = aggregate(&events, window(), DEFAULT_TOP_ERRORS);
        assert_eq!(aggregate(&reversed, window(), DEFAULT_TOP_ERRORS), expected);
        assert_eq!(aggregate(&rotated, window(), DEFAULT_TOP_ERRORS), expected);
    }

    #[test]
    fn seventy_percent_success_rate() {
        let mut events = Vec::new();
        for i in 0..10 {
            events.push(ev("connection_attempt", i * 10));
        }
        for i in 0..7 {
            events.push(ev("connection_open", i * 10 + 1));
        }
        let snapshot = aggregate(&events, window(), DEFAULT_TOP_ERRORS);
        assert_eq!(snapshot.connection_attempts, 10);
        assert_eq!(snapshot.successful_connections, 7);
        assert_eq!(snapshot.success_rate, 70.0);
    }

    #[test]
    fn zero_attempts_means_zero_rate() {
        let events = vec![ev("connection_open", 0)];
        let snapshot = aggregate(&events, window(), DEFAULT_TOP_ERRORS);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.average_connection_duration_secs, 0.0);
    }

    #[test]
    fn rate_is_rounded_to_two_decimals() {
        let events = vec![
            ev("connection_attempt", 0),
            ev("connection_attempt", 1),
            ev("connection_attempt", 2),
            ev("connection_open", 3),
        ];
        let snapshot = aggregate(&events, window(), DEFAULT_TOP_ERRORS);
        assert_eq!(snapshot.success_rate, 33.33);
    }

    #[test]
    fn duration_pairs_open_with_next_close() {
        let events = vec![
            ev("connection_open", 0),
            ev("connection_close", 90),
            ev("connection_update", 100).with_data(json!({"connection": "open"})),
            ev("connection_update", 130).with_data(json!({"connection": "close"})),
            ev("connection_close", 200),
        ];
        let snapshot = aggregate(&events, window(), DEFAULT_TOP_ERRORS);
        assert_eq!(snapshot.successful_connections, 2);
        assert_eq!(snapshot.average_connection_duration_secs, 60.0);
    }

    #[test]
    fn failures_count_failed_and_severe_closes() {
        let events = vec![
            ev("connection_failed", 0).with_error("token expired"),
            ev("connection_close", 10).with_status(401),
            ev("connection_close", 20).with_status(428),
            ev("connection_close", 30).with_status(515),
            ev("connection_close", 40).with_status(401).with_error("Intentional Logout"),
        ];
        let snapshot = aggregate(&events, window(), DEFAULT_TOP_ERRORS);
        assert_eq!(snapshot.failed_connections, 3);
        assert_eq!(snapshot.events_by_severity[&Severity::Critical], 1);
        assert_eq!(snapshot.events_by_severity[&Severity::Info], 2);
    }

    #[test]
    fn events_outside_window_are_ignored() {
        let events = vec![
            ev("connection_attempt", 0),
            ev("connection_attempt", 0).at(base() - Duration::days(60)),
        ];
        let snapshot = aggregate(&events, window(), DEFAULT_TOP_ERRORS);
        assert_eq!(snapshot.total_events, 1);
    }

    #[test]
    fn top_errors_rank_by_count_then_recency() {
        let events = vec![
            ev("connection_close", 0).with_status(428).with_error("terminated"),
            ev("connection_close", 10).with_status(408).with_error("timed out"),
            ev("connection_close", 20).with_status(428).with_error("terminated"),
            ev("connection_close", 30).with_status(500).with_error("stream error"),
        ];
        let snapshot = aggregate(&events, window(), 2);
        assert_eq!(snapshot.most_common_errors.len(), 2);
        assert_eq!(snapshot.most_common_errors[0].message, "terminated");
        assert_eq!(snapshot.most_common_errors[0].count, 2);
        assert_eq!(
            snapshot.most_common_errors[0].last_occurrence,
            base() + Duration::seconds(20)
        );
        // Tie on count: the more recent one comes first.
        assert_eq!(snapshot.most_common_errors[1].message, "stream error");
    }

    #[test]
    fn timeline_compacts_repeats() {
        let events = vec![
            ev("connection_attempt", 0),
            ev("connection_close", 5).with_status(515),
            ev("connection_close", 6).with_status(515),
            ev("connection_close", 7).with_status(515),
            ev("connection_open", 8),
        ];
        let snapshot = aggregate(&events, window(), DEFAULT_TOP_ERRORS);
        assert_eq!(snapshot.timeline.len(), 3);
        assert_eq!(snapshot.timeline[1].count, 3);
        assert_eq!(snapshot.timeline[1].timestamp, base() + Duration::seconds(5));
        assert_eq!(snapshot.timeline[1].last_timestamp, base() + Duration::seconds(7));
        assert_eq!(snapshot.events_by_type["connection_close"], 3);
    }

    #[test]
    fn input_order_does_not_matter() {
        let events = vec![
            ev("connection_attempt", 0),
            ev("connection_open", 5),
            ev("connection_close", 50).with_status(428),
        ];
        let mut reversed = events.clone();
        reversed.reverse();
        assert_eq!(
            aggregate(&events, window(), DEFAULT_TOP_ERRORS),
            aggregate(&reversed, window(), DEFAULT_TOP_ERRORS)
        );
    }

    #[test]
    fn snapshot_serializes_severity_keys_as_names() {
        let snapshot = aggregate(&[ev("connection_open", 0)], window(), DEFAULT_TOP_ERRORS);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["events_by_severity"]["info"], 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_event() -> impl Strategy<Value = ConnectionEvent> {
            let kinds = prop::sample::select(vec![
                "connection_attempt",
                "connection_open",
                "connection_close",
                "connection_failed",
                "qr_code_generated",
            ]);
            let codes = prop::option::of(prop::sample::select(vec![401u16, 408, 428, 515]));
            (kinds, codes, 0i64..86_400).prop_map(|(kind, code, offset)| {
                let event = ev(kind, offset);
                match code {
                    Some(code) => event.with_status(code),
                    None => event,
                }
            })
        }

        proptest! {
            #[test]
            fn counters_partition_the_window(events in prop::collection::vec(arb_event(), 0..60)) {
                let snapshot = aggregate(&events, window(), 3);
                prop_assert_eq!(snapshot.total_events, events.len() as u64);
                prop_assert_eq!(snapshot.events_by_type.values().sum::<u64>(), snapshot.total_events);
                prop_assert_eq!(snapshot.events_by_severity.values().sum::<u64>(), snapshot.total_events);
                prop_assert_eq!(
                    snapshot.timeline.iter().map(|t| t.count).sum::<u64>(),
                    snapshot.total_events
                );
                prop_assert!(snapshot.most_common_errors.len() <= 3);
                prop_assert!(snapshot.average_connection_duration_secs >= 0.0);
            }
        }
    }
}
