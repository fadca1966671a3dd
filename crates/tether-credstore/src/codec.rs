// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Binary-safe JSON encoding shared by every persistent backend.
//!
//! Values are wrapped as `{"type":"Buffer","data":"<base64>"}`. Older records
//! that carry `data` as an array of byte values are still readable.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tether_core::TetherError;

const BUFFER_TAG: &str = "Buffer";

#[derive(Deserialize)]
struct BufferDoc {
    #[serde(rename = "type")]
    kind: String,
    data: BufferData,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BufferData {
    Base64(String),
    Bytes(Vec<u8>),
}

/// Encode raw bytes into the stored JSON document.
pub fn encode(bytes: &[u8]) -> String {
    serde_json::json!({
        "type": BUFFER_TAG,
        "data": STANDARD.encode(bytes),
    })
    .to_string()
}

/// Decode a stored JSON document back into the exact bytes that were written.
pub fn decode(doc: &str) -> Result<Vec<u8>, TetherError> {
    let parsed: BufferDoc = serde_json::from_str(doc).map_err(|e| TetherError::Credential {
        message: "credential record is not a buffer document".into(),
        source: Some(Box::new(e)),
    })?;

    if parsed.kind != BUFFER_TAG {
        return Err(TetherError::credential(format!(
            "unexpected credential record type `{}`",
            parsed.kind
        )));
    }

    match parsed.data {
        BufferData::Base64(encoded) => STANDARD.decode(encoded).map_err(|e| TetherError::Credential {
            message: "credential record holds invalid base64".into(),
            source: Some(Box::new(e)),
        }),
        BufferData::Bytes(bytes) => Ok(bytes),
    }
}
