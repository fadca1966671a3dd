// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::ChannelId;

/// Identity used when a record is created implicitly by an append.
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// One step in a connection's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    /// Wall-clock time, millisecond precision.
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since the record started.
    pub elapsed_ms: i64,
    pub event_type: String,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// Append-only history of one connection attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub channel_id: ChannelId,
    /// Who the session belongs to (usually the tenant id or phone number).
    pub identity: String,
    pub start_time: DateTime<Utc>,
    /// Most recent entries, oldest first.
    pub entries: Vec<RecordEntry>,
    /// Entries discarded to keep the record bounded.
    #[serde(default)]
    pub dropped_entries: u64,
}

impl SessionRecord {
    pub fn new(channel_id: ChannelId, identity: impl Into<String>) -> Self {
        Self {
            channel_id,
            identity: identity.into(),
            start_time: now_millis(),
            entries: Vec::new(),
            dropped_entries: 0,
        }
    }

    pub(crate) fn push(
        &mut self,
        event_type: &str,
        data: serde_json::Value,
        stack_trace: Option<String>,
        max_entries: usize,
    ) {
        let timestamp = now_millis();
        let elapsed_ms = (timestamp - self.start_time).num_milliseconds();
        self.entries.push(RecordEntry {
            timestamp,
            elapsed_ms,
            event_type: event_type.to_string(),
            data,
            stack_trace,
        });
        let excess = self.entries.len().saturating_sub(max_entries.max(1));
        if excess > 0 {
            self.entries.drain(..excess);
            self.dropped_entries += excess as u64;
        }
    }
}

/// Current time truncated to whole milliseconds.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
