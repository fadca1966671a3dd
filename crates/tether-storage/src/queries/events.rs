// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection event log: append, windowed reads, and retention purge.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use tether_core::types::{ChannelId, ConnectionEvent, Diagnosis, Severity, TenantId, format_timestamp};
use tether_core::TetherError;

use crate::database::{Database, conversion_err, map_tr_err, parse_ts};
use crate::models::StoredEvent;

const EVENT_COLUMNS: &str = "id, channel_id, tenant_id, timestamp, event_type, status_code, \
     error_message, event_data, severity, diagnosis";

fn row_to_stored(row: &Row<'_>) -> Result<StoredEvent, rusqlite::Error> {
    let timestamp: String = row.get(3)?;
    let event_data: String = row.get(7)?;
    let severity: Option<String> = row.get(8)?;

    let event = ConnectionEvent {
        id: Some(row.get(0)?),
        channel_id: ChannelId(row.get(1)?),
        tenant_id: TenantId(row.get(2)?),
        timestamp: parse_ts(3, &timestamp)?,
        event_type: row.get(4)?,
        status_code: row.get(5)?,
        error_message: row.get(6)?,
        event_data: serde_json::from_str(&event_data).map_err(|e| conversion_err(7, e))?,
    };
    Ok(StoredEvent {
        event,
        severity: severity
            .map(|s| Severity::from_str(&s))
            .transpose()
            .map_err(|e| conversion_err(8, e))?,
        diagnosis: row.get(9)?,
    })
}

/// Append an event with the classification computed at ingest. Returns the row id.
pub async fn insert_event(
    db: &Database,
    event: &ConnectionEvent,
    diagnosis: Option<&Diagnosis>,
) -> Result<i64, TetherError> {
    let event_data = serde_json::to_string(&event.event_data).map_err(|e| TetherError::Storage {
        source: Box::new(e),
    })?;
    let event = event.clone();
    let severity = diagnosis.map(|d| d.severity.to_string());
    let diagnosis = diagnosis.map(|d| d.diagnosis.clone());

    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO connection_events (channel_id, tenant_id, timestamp, event_type,
                     status_code, error_message, event_data, severity, diagnosis)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.channel_id.0,
                    event.tenant_id.0,
                    format_timestamp(&event.timestamp),
                    event.event_type,
                    event.status_code,
                    event.error_message,
                    event_data,
                    severity,
                    diagnosis,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent events of one channel, newest first.
pub async fn recent_for_channel(
    db: &Database,
    channel_id: &ChannelId,
    limit: u32,
) -> Result<Vec<StoredEvent>, TetherError> {
    let channel_id = channel_id.0.clone();
    db.connection()
        .call(move |conn| -> Result<Vec<StoredEvent>, rusqlite::Error> {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM connection_events WHERE channel_id = ?1
                 ORDER BY timestamp DESC, id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![channel_id, limit], row_to_stored)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Events across all of a tenant's channels since `since`, newest first.
pub async fn recent_for_tenant(
    db: &Database,
    tenant_id: &TenantId,
    since: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<StoredEvent>, TetherError> {
    let tenant_id = tenant_id.0.clone();
    let since = format_timestamp(&since);
    db.connection()
        .call(move |conn| -> Result<Vec<StoredEvent>, rusqlite::Error> {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM connection_events
                 WHERE tenant_id = ?1 AND timestamp >= ?2
                 ORDER BY timestamp DESC, id DESC LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![tenant_id, since, limit], row_to_stored)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// A channel's events within `[start, end]`, in chronological order.
pub async fn channel_events_between(
    db: &Database,
    channel_id: &ChannelId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<ConnectionEvent>, TetherError> {
    let channel_id = channel_id.0.clone();
    let start = format_timestamp(&start);
    let end = format_timestamp(&end);
    db.connection()
        .call(move |conn| -> Result<Vec<ConnectionEvent>, rusqlite::Error> {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM connection_events
                 WHERE channel_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                 ORDER BY timestamp ASC, id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![channel_id, start, end], |row| {
                row_to_stored(row).map(|stored| stored.event)
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// The newest event of a channel, if any.
pub async fn latest_for_channel(
    db: &Database,
    channel_id: &ChannelId,
) -> Result<Option<StoredEvent>, TetherError> {
    let mut events = recent_for_channel(db, channel_id, 1).await?;
    Ok(events.pop())
}

/// Delete events older than `cutoff`. Returns the number of rows removed.
pub async fn purge_before(db: &Database, cutoff: DateTime<Utc>) -> Result<usize, TetherError> {
    let cutoff = format_timestamp(&cutoff);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM connection_events WHERE timestamp < ?1",
                params![cutoff],
            )
        })
        .await
        .map_err(map_tr_err)
}
