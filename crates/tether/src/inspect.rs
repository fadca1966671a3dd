// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only commands over the local database: `channels`, `events`, `metrics`.

use std::fmt::Write as _;

use chrono::Utc;
use tether_core::types::format_timestamp;
use tether_core::{Channel, ChannelId, TenantId, TetherError};
use tether_diagnostics::classify_event;
use tether_metrics::{DEFAULT_TOP_ERRORS, MetricsSnapshot, MetricsWindow, aggregate};
use tether_storage::queries::{channels, events};
use tether_storage::{Database, StoredEvent};

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, TetherError> {
    serde_json::to_string_pretty(value).map_err(|e| TetherError::Internal(e.to_string()))
}

pub fn render_channels(list: &[Channel]) -> String {
    if list.is_empty() {
        return "no channels\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<24} {:<22} {:<14} {:>7}  LAST ERROR",
        "CHANNEL", "TRANSPORT", "STATUS", "RETRIES"
    );
    for channel in list {
        let _ = writeln!(
            out,
            "{:<24} {:<22} {:<14} {:>7}  {}",
            channel.id,
            channel.transport_kind.to_string(),
            channel.status.to_string(),
            channel.retry_count,
            channel.last_error.as_deref().unwrap_or("-"),
        );
    }
    out
}

pub fn render_events(stored: &[StoredEvent]) -> String {
    if stored.is_empty() {
        return "no events\n".to_string();
    }
    let mut out = String::new();
    for entry in stored {
        let diagnosis = classify_event(&entry.event);
        let status = entry
            .event
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "{}  {:<20} {:>4}  {:<8} {}",
            format_timestamp(&entry.event.timestamp),
            entry.event.event_type,
            status,
            diagnosis.severity.to_string(),
            diagnosis.diagnosis,
        );
    }
    out
}

pub fn render_metrics(channel_id: &ChannelId, snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{channel_id}: {} -> {}",
        format_timestamp(&snapshot.window.start),
        format_timestamp(&snapshot.window.end)
    );
    let _ = writeln!(out, "  events:        {}", snapshot.total_events);
    let _ = writeln!(out, "  attempts:      {}", snapshot.connection_attempts);
    let _ = writeln!(out, "  successes:     {}", snapshot.successful_connections);
    let _ = writeln!(out, "  failures:      {}", snapshot.failed_connections);
    let _ = writeln!(out, "  success rate:  {:.2}%", snapshot.success_rate);
    let _ = writeln!(
        out,
        "  avg duration:  {:.2}s",
        snapshot.average_connection_duration_secs
    );
    if !snapshot.most_common_errors.is_empty() {
        let _ = writeln!(out, "  top errors:");
        for error in &snapshot.most_common_errors {
            let code = error
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".into());
            let _ = writeln!(out, "    {:>5}x [{code}] {}", error.count, error.message);
        }
    }
    out
}

pub async fn channels_command(
    db: &Database,
    tenant: &str,
    json: bool,
) -> Result<String, TetherError> {
    let list = channels::list_channels(db, &TenantId::from(tenant)).await?;
    if json { to_json(&list) } else { Ok(render_channels(&list)) }
}

async fn require_channel(db: &Database, channel_id: &ChannelId) -> Result<Channel, TetherError> {
    channels::get_channel(db, channel_id)
        .await?
        .ok_or_else(|| TetherError::NotFound {
            entity: "channel",
            id: channel_id.to_string(),
        })
}

pub async fn events_command(
    db: &Database,
    channel: &str,
    limit: u32,
    json: bool,
) -> Result<String, TetherError> {
    let channel_id = ChannelId::from(channel);
    require_channel(db, &channel_id).await?;
    let stored = events::recent_for_channel(db, &channel_id, limit).await?;
    if json {
        let events: Vec<_> = stored
            .iter()
            .map(|s| serde_json::json!({"event": s.event, "diagnosis": classify_event(&s.event)}))
            .collect();
        to_json(&events)
    } else {
        Ok(render_events(&stored))
    }
}

pub async fn metrics_command(
    db: &Database,
    channel: &str,
    days: u32,
    json: bool,
) -> Result<String, TetherError> {
    let channel_id = ChannelId::from(channel);
    require_channel(db, &channel_id).await?;
    let window = MetricsWindow::last_days(days, Utc::now()).ok_or_else(|| {
        TetherError::Misconfigured(format!("a {days}-day metrics window is out of range"))
    })?;
    let events = events::channel_events_between(db, &channel_id, window.start, window.end).await?;
    let snapshot = aggregate(&events, window, DEFAULT_TOP_ERRORS);
    if json {
        to_json(&snapshot)
    } else {
        Ok(render_metrics(&channel_id, &snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::types::{PairingSettings, event_types};
    use tether_core::{ConnectionEvent, TransportConfig};

    async fn seeded() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        let channel = Channel::new(
            "wa-cli",
            "acme",
            "support line",
            TransportConfig::UnofficialPairing(PairingSettings::default()),
        );
        channels::create_channel(&db, &channel).await.unwrap();
        let now = Utc::now();
        let base = |kind: &str, secs: i64| {
            ConnectionEvent::new(channel.id.clone(), channel.tenant_id.clone(), kind)
                .at(now - chrono::Duration::seconds(secs))
        };
        for event in [
            base(event_types::CONNECTION_ATTEMPT, 120),
            base(event_types::CONNECTION_OPEN, 100),
            base(event_types::CONNECTION_CLOSE, 40)
                .with_status(401)
                .with_error("device_removed"),
        ] {
            events::insert_event(&db, &event, None).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn channels_lists_tenant_channels() {
        let db = seeded().await;
        let out = channels_command(&db, "acme", false).await.unwrap();
        assert!(out.contains("wa-cli"));
        assert!(out.contains("unofficial-pairing"));
        assert!(out.contains("uninitialized"));

        let out = channels_command(&db, "other", false).await.unwrap();
        assert_eq!(out, "no channels\n");
    }

    #[tokio::test]
    async fn events_render_with_diagnosis() {
        let db = seeded().await;
        let out = events_command(&db, "wa-cli", 10, false).await.unwrap();
        let first = out.lines().next().unwrap();
        assert!(first.contains("connection_close"));
        assert!(first.contains("critical"));
        assert_eq!(out.lines().count(), 3);

        let json = events_command(&db, "wa-cli", 1, true).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["diagnosis"]["kind"], "device_removed");
    }

    #[tokio::test]
    async fn metrics_summarize_window() {
        let db = seeded().await;
        let out = metrics_command(&db, "wa-cli", 30, false).await.unwrap();
        assert!(out.contains("success rate:  100.00%"));
        assert!(out.contains("avg duration:  60.00s"));
        assert!(out.contains("[401]"));
    }

    #[tokio::test]
    async fn oversized_window_is_an_error() {
        let db = seeded().await;
        let err = metrics_command(&db, "wa-cli", u32::MAX, false)
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Misconfigured(_)));
    }

    #[tokio::test]
    async fn unknown_channel_is_not_found() {
        let db = seeded().await;
        let err = metrics_command(&db, "missing", 30, false).await.unwrap_err();
        assert!(matches!(err, TetherError::NotFound { .. }));
    }
}
