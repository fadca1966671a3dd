// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable sinks for session records.

use std::path::PathBuf;

use async_trait::async_trait;
use tether_core::TetherError;

use crate::record::SessionRecord;

/// Best-effort destination for session records.
///
/// Called with the full record after every change. Failures are reported to
/// the recorder, which logs and drops them.
#[async_trait]
pub trait RecordMirror: Send + Sync {
    fn name(&self) -> &str;

    async fn persist(&self, record: &SessionRecord) -> Result<(), TetherError>;
}

/// Writes each record to `{dir}/{channel}_{start}.json`, replacing the file atomically.
pub struct JsonFileMirror {
    dir: PathBuf,
}

impl JsonFileMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file holding `record`.
    pub fn path_for(&self, record: &SessionRecord) -> PathBuf {
        let channel: String = record
            .channel_id
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let start = record.start_time.format("%Y%m%dT%H%M%S%3fZ");
        self.dir.join(format!("{channel}_{start}.json"))
    }
}

fn io_err(e: std::io::Error) -> TetherError {
    TetherError::Storage {
        source: Box::new(e),
    }
}

#[async_trait]
impl RecordMirror for JsonFileMirror {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn persist(&self, record: &SessionRecord) -> Result<(), TetherError> {
        let body = serde_json::to_vec_pretty(record).map_err(|e| TetherError::Storage {
            source: Box::new(e),
        })?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let path = self.path_for(record);
        let tmp = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        Ok(())
    }
}
