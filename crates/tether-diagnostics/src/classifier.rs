// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered rule table mapping connection events to diagnoses.
//!
//! Rules are evaluated top to bottom and the first match wins. The last rule
//! matches everything, so classification is total. No I/O, no state.

use serde_json::Value;
use tether_core::types::{ConnectionEvent, Diagnosis, DiagnosisKind, Severity, event_types};

const UNAUTHORIZED: u16 = 401;
const CONNECTION_TERMINATED: u16 = 428;
const RESTART_REQUIRED: u16 = 515;

/// Error message markers meaning the network unlinked the device (lowercase).
const DEVICE_REMOVED_MARKERS: &[&str] = &["device_removed", "device removed"];

/// Error message marker for a logout the user asked for (lowercase).
const INTENTIONAL_LOGOUT_MARKER: &str = "intentional logout";

/// The fields of a connection event the classifier looks at.
#[derive(Debug, Clone, Copy)]
pub struct EventInput<'a> {
    pub event_type: &'a str,
    pub status_code: Option<u16>,
    pub error_message: Option<&'a str>,
    pub event_data: Option<&'a Value>,
}

impl<'a> EventInput<'a> {
    pub fn new(event_type: &'a str) -> Self {
        Self {
            event_type,
            status_code: None,
            error_message: None,
            event_data: None,
        }
    }

    pub fn status(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn error(mut self, message: &'a str) -> Self {
        self.error_message = Some(message);
        self
    }

    pub fn data(mut self, data: &'a Value) -> Self {
        self.event_data = Some(data);
        self
    }

    fn message_contains(&self, marker: &str) -> bool {
        self.error_message
            .is_some_and(|m| m.to_lowercase().contains(marker))
    }

    fn data_field(&self, field: &str) -> Option<&'a Value> {
        self.event_data.and_then(|d| d.get(field))
    }

    fn close_reason(&self) -> Option<&'a str> {
        self.error_message
            .filter(|m| !m.trim().is_empty())
            .or_else(|| self.data_field("reason").and_then(Value::as_str))
    }
}

impl<'a> From<&'a ConnectionEvent> for EventInput<'a> {
    fn from(event: &'a ConnectionEvent) -> Self {
        Self {
            event_type: &event.event_type,
            status_code: event.status_code,
            error_message: event.error_message.as_deref(),
            event_data: (!event.event_data.is_null()).then_some(&event.event_data),
        }
    }
}

/// Whether an event opened or closed the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventShape {
    Opened,
    Closed,
    Other,
}

/// Detect open/close events, including `connection_update` carrying
/// `event_data.connection` of `"open"` or `"close"`.
pub fn event_shape(input: &EventInput<'_>) -> EventShape {
    match input.event_type {
        event_types::CONNECTION_OPEN => EventShape::Opened,
        event_types::CONNECTION_CLOSE => EventShape::Closed,
        event_types::CONNECTION_UPDATE => {
            match input.data_field("connection").and_then(Value::as_str) {
                Some("open") => EventShape::Opened,
                Some("close") => EventShape::Closed,
                _ => EventShape::Other,
            }
        }
        _ => EventShape::Other,
    }
}

/// One entry of the classification table.
pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&EventInput<'_>) -> bool,
    pub outcome: fn(&EventInput<'_>) -> Diagnosis,
}

/// The classification table, in precedence order.
pub const RULES: &[Rule] = &[
    Rule {
        name: "device_removed",
        matches: is_device_removed,
        outcome: |_| device_removed(),
    },
    Rule {
        name: "intentional_logout",
        matches: |e| e.status_code == Some(UNAUTHORIZED) && e.message_contains(INTENTIONAL_LOGOUT_MARKER),
        outcome: |_| manual_logout(),
    },
    Rule {
        name: "connection_terminated",
        matches: |e| e.status_code == Some(CONNECTION_TERMINATED),
        outcome: |_| connection_terminated(),
    },
    Rule {
        name: "restart_required",
        matches: |e| e.status_code == Some(RESTART_REQUIRED),
        outcome: |_| restart_required(),
    },
    Rule {
        name: "qr_code",
        matches: |e| e.event_type == event_types::QR_CODE_GENERATED,
        outcome: |_| awaiting_scan(),
    },
    Rule {
        name: "connection_open",
        matches: |e| event_shape(e) == EventShape::Opened,
        outcome: |_| connected(),
    },
    Rule {
        name: "connection_close",
        matches: |e| event_shape(e) == EventShape::Closed,
        outcome: closed,
    },
    Rule {
        name: "fallback",
        matches: |_| true,
        outcome: generic,
    },
];

/// Classify an event. Total and deterministic.
pub fn classify(input: &EventInput<'_>) -> Diagnosis {
    RULES
        .iter()
        .find(|rule| (rule.matches)(input))
        .map(|rule| (rule.outcome)(input))
        .unwrap_or_else(|| generic(input))
}

/// Classify a stored or freshly observed event.
pub fn classify_event(event: &ConnectionEvent) -> Diagnosis {
    classify(&EventInput::from(event))
}

/// Name of the rule that decides `input`.
pub fn matching_rule(input: &EventInput<'_>) -> &'static str {
    RULES
        .iter()
        .find(|rule| (rule.matches)(input))
        .map_or("fallback", |rule| rule.name)
}

/// Severities that change the tenant-facing channel status.
pub fn is_tenant_facing(severity: Severity) -> bool {
    matches!(severity, Severity::Error | Severity::Critical)
}

fn is_device_removed(e: &EventInput<'_>) -> bool {
    if e.status_code != Some(UNAUTHORIZED) {
        return false;
    }
    let flagged = e
        .data_field("isDeviceRemoved")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    flagged || DEVICE_REMOVED_MARKERS.iter().any(|m| e.message_contains(m))
}

fn diagnosis(
    kind: DiagnosisKind,
    severity: Severity,
    diagnosis: &str,
    message: impl Into<String>,
    suggestions: &[&str],
) -> Diagnosis {
    Diagnosis {
        kind,
        diagnosis: diagnosis.to_string(),
        severity,
        user_friendly_message: message.into(),
        suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
    }
}

fn device_removed() -> Diagnosis {
    diagnosis(
        DiagnosisKind::DeviceRemoved,
        Severity::Critical,
        "Device removed by the network",
        "The messaging network removed this device from the account. The number may have been flagged or banned.",
        &[
            "Wait about 48 hours before trying to reconnect this number",
            "Check whether the number was reported or flagged for spam",
            "Consider connecting a different phone number",
        ],
    )
}

/// Device removal detected from a bare 401 close; worded for the close path.
fn device_removed_on_close() -> Diagnosis {
    diagnosis(
        DiagnosisKind::DeviceRemoved,
        Severity::Critical,
        "Device removed by the network",
        "The connection was closed because this device is no longer linked to the account.",
        &[
            "Pair the channel again by scanning a new QR code",
            "If pairing fails, wait about 48 hours before retrying",
            "Check the phone's linked devices list for unexpected removals",
        ],
    )
}

fn manual_logout() -> Diagnosis {
    diagnosis(
        DiagnosisKind::ManualLogout,
        Severity::Info,
        "Manual disconnect",
        "The session was logged out on purpose.",
        &["Scan a new QR code when you want to reconnect"],
    )
}

fn connection_terminated() -> Diagnosis {
    diagnosis(
        DiagnosisKind::ConnectionTerminated,
        Severity::Error,
        "Connection terminated, credentials may be invalid",
        "The network terminated the connection. The stored credentials may no longer be valid.",
        &[
            "Reconnection is retried automatically",
            "If the problem persists, remove the session and pair the device again",
        ],
    )
}

fn restart_required() -> Diagnosis {
    diagnosis(
        DiagnosisKind::RestartRequired,
        Severity::Warning,
        "Restart requested by the network",
        "The network asked the session to restart. This is handled automatically.",
        &["No action needed unless this repeats frequently"],
    )
}

fn awaiting_scan() -> Diagnosis {
    diagnosis(
        DiagnosisKind::AwaitingScan,
        Severity::Info,
        "Awaiting QR code scan",
        "Scan the QR code with the phone to link this channel.",
        &[
            "Open the messaging app on the phone",
            "Go to Settings > Linked devices > Link a device",
            "Point the camera at the QR code before it expires",
        ],
    )
}

fn connected() -> Diagnosis {
    diagnosis(
        DiagnosisKind::Connected,
        Severity::Info,
        "Connected successfully",
        "The channel is connected.",
        &[],
    )
}

fn closed(e: &EventInput<'_>) -> Diagnosis {
    if e.status_code == Some(UNAUTHORIZED) {
        return device_removed_on_close();
    }
    let message = match e.close_reason() {
        Some(reason) => format!("The connection was closed: {reason}"),
        None => "The connection was closed.".to_string(),
    };
    diagnosis(
        DiagnosisKind::ConnectionClosed,
        Severity::Warning,
        "Connection closed",
        message,
        &["Reconnection is attempted automatically"],
    )
}

fn generic(e: &EventInput<'_>) -> Diagnosis {
    diagnosis(
        DiagnosisKind::Generic,
        Severity::Info,
        "Connection event",
        e.event_type,
        &[],
    )
}
