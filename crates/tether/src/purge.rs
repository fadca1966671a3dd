// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event log retention.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tether_config::model::EventsConfig;
use tether_core::TetherError;
use tether_storage::Database;
use tether_storage::queries::events;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delete events older than `retention_days` before `now`.
pub async fn purge_expired(
    db: &Database,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<usize, TetherError> {
    let Some(cutoff) = chrono::Duration::try_days(i64::from(retention_days))
        .and_then(|span| now.checked_sub_signed(span))
    else {
        debug!(retention_days, "retention reaches past the calendar, nothing to purge");
        return Ok(0);
    };
    let removed = events::purge_before(db, cutoff).await?;
    if removed > 0 {
        info!(removed, %cutoff, "expired connection events purged");
    } else {
        debug!(%cutoff, "no connection events to purge");
    }
    Ok(removed)
}

/// Run the purge on `purge_interval_secs` until `cancel` fires.
pub fn spawn_purge_task(
    db: Arc<Database>,
    config: &EventsConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let retention_days = config.retention_days;
    let period = Duration::from_secs(config.purge_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = purge_expired(&db, retention_days, Utc::now()).await {
                        warn!(error = %e, "event purge failed");
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("event purge task shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{ChannelId, ConnectionEvent, TenantId};
    use tracing_test::traced_test;

    fn event(age_days: i64) -> ConnectionEvent {
        ConnectionEvent::new(ChannelId::from("c"), TenantId::from("t"), "connection_attempt")
            .at(Utc::now() - chrono::Duration::days(age_days))
    }

    #[tokio::test]
    #[traced_test]
    async fn purges_only_expired_events() {
        let db = Database::open_in_memory().await.unwrap();
        for age in [1, 10, 100, 200] {
            events::insert_event(&db, &event(age), None).await.unwrap();
        }

        let removed = purge_expired(&db, 90, Utc::now()).await.unwrap();
        assert_eq!(removed, 2);
        let left = events::recent_for_channel(&db, &ChannelId::from("c"), 10)
            .await
            .unwrap();
        assert_eq!(left.len(), 2);
        assert!(logs_contain("expired connection events purged"));
    }

    #[tokio::test]
    async fn unbounded_retention_purges_nothing() {
        let db = Database::open_in_memory().await.unwrap();
        events::insert_event(&db, &event(400), None).await.unwrap();
        assert_eq!(purge_expired(&db, u32::MAX, Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purge_task_stops_on_cancel() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let cancel = CancellationToken::new();
        let task = spawn_purge_task(db, &EventsConfig::default(), cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
