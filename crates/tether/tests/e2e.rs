// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end lifecycle scenarios.
//!
//! Each test creates an isolated TestHarness with temp SQLite, an in-memory
//! credential store and mock transports. Tests are independent and
//! order-insensitive.

use std::time::Duration;

use chrono::Utc;
use tether_core::{ChannelStatus, CredentialStore, Severity};
use tether_diagnostics::classify_event;
use tether_metrics::{DEFAULT_TOP_ERRORS, MetricsWindow, aggregate};
use tether_storage::queries::events;
use tether_test_utils::fixtures::pairing_channel;
use tether_test_utils::TestHarness;

const WAIT: Duration = Duration::from_secs(3);

// ---- Pairing lifecycle: scan, connect, device removed ----

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pairing_lifecycle_ends_banned_after_device_removal() {
    let harness = TestHarness::builder()
        .with_init_delay(Duration::from_millis(200))
        .build()
        .await
        .unwrap();
    let channel = pairing_channel("wa-e2e", "acme");
    harness.add_channel(&channel).await.unwrap();
    harness
        .store
        .write(&channel.id, "creds", b"[\"noise-key\"]")
        .await
        .unwrap();
    assert_eq!(
        harness.channel(&channel.id).await.unwrap().status,
        ChannelStatus::Uninitialized
    );

    let registry = harness.registry.clone();
    let id = channel.id.clone();
    let connecting = tokio::spawn(async move { registry.connect(&id).await.map(|_| ()) });

    harness
        .wait_for_status(&channel.id, ChannelStatus::Opening, WAIT)
        .await
        .unwrap();
    connecting.await.unwrap().unwrap();
    harness
        .wait_for_status(&channel.id, ChannelStatus::QrPending, WAIT)
        .await
        .unwrap();

    let transport = harness.factory.latest(&channel.id).unwrap();
    transport.emit_open();
    harness
        .wait_for_status(&channel.id, ChannelStatus::Connected, WAIT)
        .await
        .unwrap();

    transport.emit_close(Some(401), Some("device_removed"));
    let banned = harness
        .wait_for_status(&channel.id, ChannelStatus::Banned, WAIT)
        .await
        .unwrap();
    assert!(banned.last_error.is_some());

    // attempt, qr, open, close
    harness.wait_for_events(&channel.id, 4, WAIT).await.unwrap();
    let stored = events::recent_for_channel(&harness.db, &channel.id, 10)
        .await
        .unwrap();
    let kinds: Vec<&str> = stored.iter().rev().map(|s| s.event.event_type.as_str()).collect();
    assert_eq!(
        kinds,
        [
            "connection_attempt",
            "qr_code_generated",
            "connection_open",
            "connection_close"
        ]
    );

    let severities: Vec<Option<Severity>> = stored.iter().rev().map(|s| s.severity).collect();
    assert_eq!(
        severities,
        [
            Some(Severity::Info),
            Some(Severity::Info),
            Some(Severity::Info),
            Some(Severity::Critical)
        ]
    );
    assert_eq!(
        classify_event(&stored[1].event).diagnosis,
        "Connected successfully"
    );
    assert_eq!(
        classify_event(&stored[2].event).diagnosis,
        "Awaiting QR code scan"
    );

    let window = MetricsWindow::last_days(1, Utc::now()).unwrap();
    let all = events::channel_events_between(&harness.db, &channel.id, window.start, window.end)
        .await
        .unwrap();
    let snapshot = aggregate(&all, window, DEFAULT_TOP_ERRORS);
    assert_eq!(snapshot.connection_attempts, 1);
    assert_eq!(snapshot.successful_connections, 1);
    assert_eq!(snapshot.failed_connections, 1);
    assert_eq!(snapshot.success_rate, 100.0);
    assert_eq!(snapshot.most_common_errors[0].status_code, Some(401));

    harness.shutdown().await;
}

// ---- Recovery: a banned channel can be reset and paired again ----

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn banned_channel_pairs_again_after_reset() {
    let harness = TestHarness::builder().build().await.unwrap();
    let channel = pairing_channel("wa-again", "acme");
    harness.add_channel(&channel).await.unwrap();

    harness.registry.connect(&channel.id).await.unwrap();
    let transport = harness.factory.latest(&channel.id).unwrap();
    transport.emit_open();
    harness
        .wait_for_status(&channel.id, ChannelStatus::Connected, WAIT)
        .await
        .unwrap();
    transport.emit_close(Some(401), None);
    harness
        .wait_for_status(&channel.id, ChannelStatus::Banned, WAIT)
        .await
        .unwrap();

    harness.registry.reset(&channel.id).await.unwrap();
    harness.registry.connect(&channel.id).await.unwrap();
    let stored = harness
        .wait_for_status(&channel.id, ChannelStatus::QrPending, WAIT)
        .await
        .unwrap();
    assert_eq!(stored.retry_count, 0);
    assert_eq!(harness.factory.created_count(), 2);

    harness.shutdown().await;
}

// ---- Tenant isolation across the event log ----

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tenants_only_see_their_own_events() {
    let harness = TestHarness::builder().build().await.unwrap();
    let ours = pairing_channel("wa-ours", "acme");
    let theirs = pairing_channel("wa-theirs", "globex");
    harness.add_channel(&ours).await.unwrap();
    harness.add_channel(&theirs).await.unwrap();

    harness.registry.connect(&ours.id).await.unwrap();
    harness.registry.connect(&theirs.id).await.unwrap();
    harness.wait_for_events(&ours.id, 2, WAIT).await.unwrap();
    harness.wait_for_events(&theirs.id, 2, WAIT).await.unwrap();

    let since = Utc::now() - chrono::Duration::hours(1);
    let acme = events::recent_for_tenant(&harness.db, &ours.tenant_id, since, 50)
        .await
        .unwrap();
    assert_eq!(acme.len(), 2);
    assert!(acme.iter().all(|s| s.event.channel_id == ours.id));

    harness.shutdown().await;
}
