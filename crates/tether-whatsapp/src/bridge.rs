// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairing bridge wire frames and the socket abstraction.
//!
//! The bridge speaks JSON text frames tagged by `type`. Credential values travel
//! as standard base64.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tether_core::TetherError;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Frames sent to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Start or resume a session with the stored credentials.
    Resume {
        creds: BTreeMap<String, String>,
        #[serde(rename = "phoneNumber", skip_serializing_if = "Option::is_none")]
        phone_number: Option<String>,
    },
    /// Send a text message.
    Send { id: String, to: String, text: String },
    /// End the session without logging the device out.
    Close,
}

/// Frames received from the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    Qr {
        qr: String,
    },
    Open {
        #[serde(default)]
        me: Option<String>,
    },
    Close {
        #[serde(rename = "statusCode", default)]
        status_code: Option<u16>,
        #[serde(default)]
        reason: Option<String>,
        #[serde(rename = "isDeviceRemoved", default)]
        is_device_removed: bool,
    },
    Creds {
        #[serde(default)]
        set: BTreeMap<String, String>,
        #[serde(default)]
        delete: Vec<String>,
    },
}

/// An open bridge session, as a pair of frame queues.
///
/// Dropping `outgoing` closes the socket. `incoming` ends when the socket does.
pub struct BridgeLink {
    pub outgoing: mpsc::UnboundedSender<OutboundFrame>,
    pub incoming: mpsc::UnboundedReceiver<InboundFrame>,
}

/// Opens bridge sessions.
#[async_trait]
pub trait BridgeConnector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<BridgeLink, TetherError>;
}

/// Connects to the bridge over a WebSocket.
pub struct WsBridgeConnector {
    connect_timeout: Duration,
}

impl WsBridgeConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl BridgeConnector for WsBridgeConnector {
    async fn connect(&self, url: &str) -> Result<BridgeLink, TetherError> {
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TetherError::Timeout {
                duration: self.connect_timeout,
            })?
            .map_err(|e| TetherError::Transport {
                message: format!("bridge connection to {url} failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        debug!(url, "pairing bridge connected");

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<InboundFrame>();

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "failed to encode bridge frame");
                        continue;
                    }
                };
                let closing = matches!(frame, OutboundFrame::Close);
                if let Err(e) = sink.send(Message::text(text)).await {
                    warn!(error = %e, "bridge write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "bridge read failed");
                        break;
                    }
                };
                match serde_json::from_str::<InboundFrame>(text.as_str()) {
                    Ok(frame) => {
                        if in_tx.send(frame).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!(error = %e, "ignoring malformed bridge frame"),
                }
            }
            let _ = in_tx.send(InboundFrame::Close {
                status_code: None,
                reason: Some("bridge socket closed".to_string()),
                is_device_removed: false,
            });
        });

        Ok(BridgeLink {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
