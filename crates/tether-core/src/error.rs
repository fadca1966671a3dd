// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tether connection core.

use thiserror::Error;

use crate::types::{ChannelId, ChannelStatus};

/// The primary error type used across all Tether traits and core operations.
#[derive(Debug, Error)]
pub enum TetherError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Relational storage errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Credential backend errors (file I/O, remote cache failure, corrupt record).
    #[error("credential store error: {message}")]
    Credential {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transport errors (HTTP failure, bridge socket closed, rejected send).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A transport handle could not be initialized.
    ///
    /// Carries the last known channel status so callers can report it to the tenant.
    #[error("channel {channel_id} failed to initialize (status: {status}): {message}")]
    Initialization {
        channel_id: ChannelId,
        status: ChannelStatus,
        message: String,
    },

    /// Programmer-facing misuse, such as a channel without a usable transport config.
    #[error("misconfigured: {0}")]
    Misconfigured(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A lifecycle transition that the channel state machine does not allow.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: ChannelStatus,
        to: ChannelStatus,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TetherError {
    /// Shorthand for a credential error without an underlying source.
    pub fn credential(message: impl Into<String>) -> Self {
        TetherError::Credential {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        TetherError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true for failures that are expected to clear on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TetherError::Storage { .. }
                | TetherError::Credential { .. }
                | TetherError::Transport { .. }
                | TetherError::Timeout { .. }
        )
    }
}

/// Runs `fut` with a deadline, mapping expiry to [`TetherError::Timeout`].
pub async fn with_timeout<T, F>(duration: std::time::Duration, fut: F) -> Result<T, TetherError>
where
    F: std::future::Future<Output = Result<T, TetherError>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(TetherError::Timeout { duration }),
    }
}
