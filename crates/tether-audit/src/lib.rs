// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session event recorder.
//!
//! Keeps an append-only forensic history per connection, separate from the
//! queryable connection event log, and mirrors it to durable storage on a
//! best-effort basis.

pub mod mirror;
pub mod record;
pub mod recorder;

pub use mirror::{JsonFileMirror, RecordMirror};
pub use record::{RecordEntry, SessionRecord};
pub use recorder::SessionRecorder;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tether_config::model::AuditConfig;
    use tether_core::ChannelId;
    use tracing_test::traced_test;

    use super::*;

    #[tokio::test]
    async fn file_mirror_tracks_every_append() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig {
            enabled: true,
            mirror_dir: Some(dir.path().display().to_string()),
            mirror_timeout_secs: 5,
            max_entries: 100,
        };
        let recorder = SessionRecorder::from_config(&config);
        let ch = ChannelId::from("ch/1");
        recorder.init(&ch, "tenant-1").await;
        recorder
            .append(&ch, "qr_code_generated", json!({"qr": "2@abc"}), None)
            .await;

        let snapshot = recorder.snapshot(&ch).await.unwrap();
        let path = JsonFileMirror::new(dir.path()).path_for(&snapshot);
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("ch_1_"));

        let on_disk: SessionRecord =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(on_disk, snapshot);
    }

    #[tokio::test]
    #[traced_test]
    async fn unavailable_mirror_does_not_break_recording() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let recorder = SessionRecorder::new(
            Some(Arc::new(JsonFileMirror::new(blocker.join("records")))),
            Duration::from_secs(2),
        );
        let ch = ChannelId::from("ch");
        recorder.init(&ch, "t").await;
        recorder
            .append(&ch, "connection_close", json!({"statusCode": 401}), None)
            .await;

        assert_eq!(recorder.snapshot(&ch).await.unwrap().entries.len(), 1);
        assert!(logs_contain("session record mirror failed"));
    }
}
