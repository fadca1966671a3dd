// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel CRUD and lifecycle updates.

use std::str::FromStr;

use chrono::Utc;
use rusqlite::{Row, params};
use tether_core::types::{Channel, ChannelId, ChannelStatus, TenantId, TransportKind, format_timestamp};
use tether_core::TetherError;

use crate::database::{Database, conversion_err, map_tr_err, parse_ts};

const CHANNEL_COLUMNS: &str = "id, tenant_id, name, transport_kind, config, status, retry_count, \
     last_error, active, created_at, updated_at";

fn row_to_channel(row: &Row<'_>) -> Result<Channel, rusqlite::Error> {
    let kind: String = row.get(3)?;
    let config: Option<String> = row.get(4)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(Channel {
        id: ChannelId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        name: row.get(2)?,
        transport_kind: TransportKind::from_str(&kind).map_err(|e| conversion_err(3, e))?,
        config: config
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| conversion_err(4, e))?,
        status: ChannelStatus::from_str(&status).map_err(|e| conversion_err(5, e))?,
        retry_count: row.get(6)?,
        last_error: row.get(7)?,
        active: row.get(8)?,
        created_at: parse_ts(9, &created_at)?,
        updated_at: parse_ts(10, &updated_at)?,
    })
}

/// Insert a new channel.
pub async fn create_channel(db: &Database, channel: &Channel) -> Result<(), TetherError> {
    channel.id.validate()?;
    let config = channel
        .config
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| TetherError::Storage {
            source: Box::new(e),
        })?;
    let channel = channel.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO channels (id, tenant_id, name, transport_kind, config, status,
                     retry_count, last_error, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    channel.id.0,
                    channel.tenant_id.0,
                    channel.name,
                    channel.transport_kind.to_string(),
                    config,
                    channel.status.to_string(),
                    channel.retry_count,
                    channel.last_error,
                    channel.active,
                    format_timestamp(&channel.created_at),
                    format_timestamp(&channel.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a channel by id.
pub async fn get_channel(db: &Database, id: &ChannelId) -> Result<Option<Channel>, TetherError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| -> Result<Option<Channel>, rusqlite::Error> {
            let sql = format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1");
            match conn.query_row(&sql, params![id], row_to_channel) {
                Ok(channel) => Ok(Some(channel)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List a tenant's channels (active and inactive), oldest first.
pub async fn list_channels(db: &Database, tenant: &TenantId) -> Result<Vec<Channel>, TetherError> {
    let tenant = tenant.0.clone();
    db.connection()
        .call(move |conn| -> Result<Vec<Channel>, rusqlite::Error> {
            let sql = format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels WHERE tenant_id = ?1 ORDER BY created_at, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![tenant], row_to_channel)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// List every active channel across tenants.
pub async fn list_active_channels(db: &Database) -> Result<Vec<Channel>, TetherError> {
    db.connection()
        .call(|conn| -> Result<Vec<Channel>, rusqlite::Error> {
            let sql = format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels WHERE active = 1 ORDER BY created_at, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_channel)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Persist a lifecycle transition.
///
/// Returns `NotFound` when the channel does not exist.
pub async fn update_status(
    db: &Database,
    id: &ChannelId,
    status: ChannelStatus,
    retry_count: u32,
    last_error: Option<&str>,
) -> Result<(), TetherError> {
    let key = id.0.clone();
    let last_error = last_error.map(str::to_string);
    let now = format_timestamp(&Utc::now());
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE channels SET status = ?1, retry_count = ?2, last_error = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![status.to_string(), retry_count, last_error, now, key],
            )
        })
        .await
        .map_err(map_tr_err)?;

    if changed == 0 {
        return Err(TetherError::NotFound {
            entity: "channel",
            id: id.0.clone(),
        });
    }
    Ok(())
}

/// Soft-delete a channel: inactive and disconnected. The row is kept for history.
pub async fn deactivate_channel(db: &Database, id: &ChannelId) -> Result<(), TetherError> {
    let key = id.0.clone();
    let now = format_timestamp(&Utc::now());
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE channels SET active = 0, status = 'disconnected', updated_at = ?1
                 WHERE id = ?2",
                params![now, key],
            )
        })
        .await
        .map_err(map_tr_err)?;

    if changed == 0 {
        return Err(TetherError::NotFound {
            entity: "channel",
            id: id.0.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tether_core::types::{CloudApiSettings, PairingSettings, TransportConfig};

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn pairing_channel(id: &str, tenant: &str) -> Channel {
        Channel::new(
            id,
            tenant,
            "Support line",
            TransportConfig::UnofficialPairing(PairingSettings::default()),
        )
    }

    #[tokio::test]
    async fn ids_that_would_alias_other_channels_are_refused() {
        let (db, _dir) = setup_db().await;
        let err = create_channel(&db, &pairing_channel("sales:eu", "tenant-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Misconfigured(_)));
        assert!(get_channel(&db, &ChannelId::from("sales:eu")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_and_get_channel_roundtrips() {
        let (db, _dir) = setup_db().await;
        let channel = Channel::new(
            "ch-api",
            "tenant-1",
            "Sales",
            TransportConfig::OfficialBusinessApi(CloudApiSettings {
                access_token: "EAAG".into(),
                phone_number_id: "10987".into(),
                business_account_id: None,
            }),
        );
        create_channel(&db, &channel).await.unwrap();

        let loaded = get_channel(&db, &channel.id).await.unwrap().unwrap();
        assert_eq!(loaded.tenant_id, TenantId::from("tenant-1"));
        assert_eq!(loaded.transport_kind, TransportKind::OfficialBusinessApi);
        assert_eq!(loaded.config, channel.config);
        assert_eq!(loaded.status, ChannelStatus::Uninitialized);
        assert!(loaded.active);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_channel_returns_none() {
        let (db, _dir) = setup_db().await;
        let missing = get_channel(&db, &ChannelId::from("nope")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn list_is_tenant_scoped() {
        let (db, _dir) = setup_db().await;
        create_channel(&db, &pairing_channel("a1", "tenant-a")).await.unwrap();
        create_channel(&db, &pairing_channel("a2", "tenant-a")).await.unwrap();
        create_channel(&db, &pairing_channel("b1", "tenant-b")).await.unwrap();

        let a = list_channels(&db, &TenantId::from("tenant-a")).await.unwrap();
        assert_eq!(a.len(), 2);
        assert!(a.iter().all(|c| c.tenant_id.as_str() == "tenant-a"));
    }

    #[tokio::test]
    async fn update_status_persists_retry_and_error() {
        let (db, _dir) = setup_db().await;
        let channel = pairing_channel("ch-1", "t");
        create_channel(&db, &channel).await.unwrap();

        update_status(
            &db,
            &channel.id,
            ChannelStatus::Disconnected,
            3,
            Some("bridge closed"),
        )
        .await
        .unwrap();

        let loaded = get_channel(&db, &channel.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ChannelStatus::Disconnected);
        assert_eq!(loaded.retry_count, 3);
        assert_eq!(loaded.last_error.as_deref(), Some("bridge closed"));
        assert!(loaded.updated_at >= channel.updated_at);
    }

    #[tokio::test]
    async fn update_status_of_unknown_channel_is_not_found() {
        let (db, _dir) = setup_db().await;
        let err = update_status(&db, &ChannelId::from("ghost"), ChannelStatus::Opening, 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::NotFound { entity: "channel", .. }));
    }

    #[tokio::test]
    async fn deactivate_hides_channel_from_active_list() {
        let (db, _dir) = setup_db().await;
        create_channel(&db, &pairing_channel("keep", "t")).await.unwrap();
        create_channel(&db, &pairing_channel("drop", "t")).await.unwrap();

        deactivate_channel(&db, &ChannelId::from("drop")).await.unwrap();

        let active = list_active_channels(&db).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id.as_str(), "keep");

        let dropped = get_channel(&db, &ChannelId::from("drop")).await.unwrap().unwrap();
        assert!(!dropped.active);
        assert_eq!(dropped.status, ChannelStatus::Disconnected);
    }
}
