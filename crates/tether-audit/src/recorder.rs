// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory session recorder with an optional durable mirror.
//!
//! Recording never fails the caller: mirror errors and timeouts are logged.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tether_config::model::AuditConfig;
use tether_core::ChannelId;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::mirror::{JsonFileMirror, RecordMirror};
use crate::record::{ANONYMOUS_IDENTITY, SessionRecord};

type Slot = Arc<Mutex<SessionRecord>>;

/// Entries kept per record unless configured otherwise.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Keeps one [`SessionRecord`] per active channel.
pub struct SessionRecorder {
    records: DashMap<ChannelId, Slot>,
    mirror: Option<Arc<dyn RecordMirror>>,
    mirror_timeout: Duration,
    max_entries: usize,
    enabled: bool,
}

impl SessionRecorder {
    pub fn new(mirror: Option<Arc<dyn RecordMirror>>, mirror_timeout: Duration) -> Self {
        Self {
            records: DashMap::new(),
            mirror,
            mirror_timeout,
            max_entries: DEFAULT_MAX_ENTRIES,
            enabled: true,
        }
    }

    /// Keep at most `max_entries` entries per record, dropping the oldest.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Build from `[audit]`; a `mirror_dir` enables the JSON file mirror.
    pub fn from_config(config: &AuditConfig) -> Self {
        let mirror = config
            .mirror_dir
            .as_ref()
            .map(|dir| Arc::new(JsonFileMirror::new(dir)) as Arc<dyn RecordMirror>);
        Self {
            enabled: config.enabled,
            ..Self::new(mirror, Duration::from_secs(config.mirror_timeout_secs))
                .with_max_entries(config.max_entries)
        }
    }

    /// A recorder that keeps nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(None, Duration::from_secs(1))
        }
    }

    /// Start a fresh record for `channel_id`, replacing any previous one.
    pub async fn init(&self, channel_id: &ChannelId, identity: &str) {
        if !self.enabled {
            return;
        }
        let slot: Slot = Arc::new(Mutex::new(SessionRecord::new(channel_id.clone(), identity)));
        self.records.insert(channel_id.clone(), slot.clone());
        let record = slot.lock().await;
        self.mirror_record(&record).await;
        debug!(channel_id = %channel_id, identity, "session record started");
    }

    /// Append an entry, creating an anonymous record if none exists.
    pub async fn append(
        &self,
        channel_id: &ChannelId,
        event_type: &str,
        data: serde_json::Value,
        stack_trace: Option<String>,
    ) {
        if !self.enabled {
            return;
        }
        let slot = self
            .records
            .entry(channel_id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(SessionRecord::new(
                    channel_id.clone(),
                    ANONYMOUS_IDENTITY,
                )))
            })
            .clone();

        let mut record = slot.lock().await;
        record.push(event_type, data, stack_trace, self.max_entries);
        self.mirror_record(&record).await;
    }

    /// A consistent copy of the current record.
    pub async fn snapshot(&self, channel_id: &ChannelId) -> Option<SessionRecord> {
        let slot = self.records.get(channel_id).map(|s| s.clone())?;
        let record = slot.lock().await;
        Some(record.clone())
    }

    /// Channels with a live record.
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.records.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Flush and drop the record of `channel_id`, returning its final state.
    pub async fn finish(&self, channel_id: &ChannelId) -> Option<SessionRecord> {
        let (_, slot) = self.records.remove(channel_id)?;
        let record = slot.lock().await;
        self.mirror_record(&record).await;
        Some(record.clone())
    }

    async fn mirror_record(&self, record: &SessionRecord) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        match tokio::time::timeout(self.mirror_timeout, mirror.persist(record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                channel_id = %record.channel_id,
                mirror = mirror.name(),
                error = %e,
                "session record mirror failed"
            ),
            Err(_) => warn!(
                channel_id = %record.channel_id,
                mirror = mirror.name(),
                timeout_ms = self.mirror_timeout.as_millis() as u64,
                "session record mirror timed out"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use tether_core::TetherError;
    use tracing_test::traced_test;

    struct StallingMirror;

    #[async_trait]
    impl RecordMirror for StallingMirror {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn persist(&self, _record: &SessionRecord) -> Result<(), TetherError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn append_computes_elapsed_from_start() {
        let recorder = SessionRecorder::new(None, Duration::from_secs(1));
        let ch = ChannelId::from("ch-1");
        recorder.init(&ch, "tenant-1").await;
        recorder
            .append(&ch, "connection_attempt", json!({"attempt": 1}), None)
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        recorder
            .append(&ch, "connection_open", json!({}), None)
            .await;

        let record = recorder.snapshot(&ch).await.unwrap();
        assert_eq!(record.identity, "tenant-1");
        assert_eq!(record.entries.len(), 2);
        assert!(record.entries[1].elapsed_ms >= record.entries[0].elapsed_ms);
        assert!(record.entries[1].elapsed_ms >= 20);
        assert_eq!(record.entries[0].timestamp.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[tokio::test]
    async fn unknown_channel_is_initialized_lazily() {
        let recorder = SessionRecorder::new(None, Duration::from_secs(1));
        let ch = ChannelId::from("late");
        recorder
            .append(&ch, "connection_close", json!({"statusCode": 428}), Some("at reconnect".into()))
            .await;

        let record = recorder.snapshot(&ch).await.unwrap();
        assert_eq!(record.identity, ANONYMOUS_IDENTITY);
        assert_eq!(record.entries[0].stack_trace.as_deref(), Some("at reconnect"));
    }

    #[tokio::test]
    async fn init_replaces_previous_record() {
        let recorder = SessionRecorder::new(None, Duration::from_secs(1));
        let ch = ChannelId::from("ch");
        recorder.append(&ch, "a", json!(null), None).await;
        recorder.init(&ch, "fresh").await;
        let record = recorder.snapshot(&ch).await.unwrap();
        assert!(record.entries.is_empty());
        assert_eq!(record.identity, "fresh");
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_kept_in_order() {
        let recorder = Arc::new(SessionRecorder::new(None, Duration::from_secs(1)));
        let ch = ChannelId::from("busy");
        recorder.init(&ch, "t").await;

        let mut handles = Vec::new();
        for i in 0..50 {
            let recorder = recorder.clone();
            let ch = ch.clone();
            handles.push(tokio::spawn(async move {
                recorder.append(&ch, "connection_update", json!({"i": i}), None).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let record = recorder.snapshot(&ch).await.unwrap();
        assert_eq!(record.entries.len(), 50);
        assert!(record
            .entries
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    #[traced_test]
    async fn slow_mirror_times_out_without_failing_append() {
        let recorder = SessionRecorder::new(
            Some(Arc::new(StallingMirror)),
            Duration::from_millis(50),
        );
        let ch = ChannelId::from("ch");
        let started = std::time::Instant::now();
        recorder.append(&ch, "connection_open", json!({}), None).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(recorder.snapshot(&ch).await.unwrap().entries.len(), 1);
        assert!(logs_contain("session record mirror timed out"));
    }

    #[tokio::test]
    async fn long_lived_record_keeps_only_recent_entries() {
        let recorder = SessionRecorder::new(None, Duration::from_secs(1)).with_max_entries(3);
        let ch = ChannelId::from("chatty");
        recorder.init(&ch, "tenant-1").await;
        for i in 0..5 {
            recorder
                .append(&ch, "creds_update", json!({"i": i}), None)
                .await;
        }

        let record = recorder.snapshot(&ch).await.unwrap();
        let kept: Vec<i64> = record
            .entries
            .iter()
            .map(|e| e.data["i"].as_i64().unwrap())
            .collect();
        assert_eq!(kept, [2, 3, 4]);
        assert_eq!(record.dropped_entries, 2);
    }

    #[tokio::test]
    async fn finish_removes_record() {
        let recorder = SessionRecorder::new(None, Duration::from_secs(1));
        let ch = ChannelId::from("done");
        recorder.append(&ch, "connection_close", json!({}), None).await;
        assert_eq!(recorder.channels(), vec![ch.clone()]);

        let last = recorder.finish(&ch).await.unwrap();
        assert_eq!(last.entries.len(), 1);
        assert!(recorder.snapshot(&ch).await.is_none());
        assert!(recorder.channels().is_empty());
    }

    #[tokio::test]
    async fn disabled_recorder_keeps_nothing() {
        let recorder = SessionRecorder::disabled();
        let ch = ChannelId::from("ch");
        recorder.append(&ch, "connection_open", json!({}), None).await;
        assert!(recorder.snapshot(&ch).await.is_none());
    }
}
