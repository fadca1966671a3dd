// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel and event fixtures.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use tether_core::types::{CloudApiSettings, PairingSettings, event_types};
use tether_core::{Channel, ChannelId, ConnectionEvent, TenantId, TransportConfig};

pub fn pairing_channel(id: &str, tenant: &str) -> Channel {
    Channel::new(
        id,
        tenant,
        format!("{id} (pairing)"),
        TransportConfig::UnofficialPairing(PairingSettings::default()),
    )
}

pub fn cloud_channel(id: &str, tenant: &str) -> Channel {
    Channel::new(
        id,
        tenant,
        format!("{id} (business)"),
        TransportConfig::OfficialBusinessApi(CloudApiSettings {
            access_token: "test-token".into(),
            phone_number_id: "1098".into(),
            business_account_id: None,
        }),
    )
}

/// A fixed reference instant so timestamps in assertions are stable.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn event(channel: &str, tenant: &str, kind: &str, offset_secs: i64) -> ConnectionEvent {
    ConnectionEvent::new(ChannelId::from(channel), TenantId::from(tenant), kind)
        .at(t0() + Duration::seconds(offset_secs))
}

pub fn attempt(channel: &str, tenant: &str, offset_secs: i64) -> ConnectionEvent {
    event(channel, tenant, event_types::CONNECTION_ATTEMPT, offset_secs)
}

pub fn qr(channel: &str, tenant: &str, offset_secs: i64) -> ConnectionEvent {
    event(channel, tenant, event_types::QR_CODE_GENERATED, offset_secs)
        .with_data(json!({"qr": "2@fixture"}))
}

pub fn open(channel: &str, tenant: &str, offset_secs: i64) -> ConnectionEvent {
    event(channel, tenant, event_types::CONNECTION_OPEN, offset_secs)
}

pub fn close(
    channel: &str,
    tenant: &str,
    offset_secs: i64,
    status_code: u16,
    reason: &str,
) -> ConnectionEvent {
    event(channel, tenant, event_types::CONNECTION_CLOSE, offset_secs)
        .with_status(status_code)
        .with_error(reason)
        .with_data(json!({"connection": "close", "reason": reason}))
}

pub fn device_removed(channel: &str, tenant: &str, offset_secs: i64) -> ConnectionEvent {
    close(channel, tenant, offset_secs, 401, "device_removed")
}

pub fn failed(channel: &str, tenant: &str, offset_secs: i64, message: &str) -> ConnectionEvent {
    event(channel, tenant, event_types::CONNECTION_FAILED, offset_secs).with_error(message)
}
