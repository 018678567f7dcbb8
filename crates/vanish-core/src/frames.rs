//! File-transfer wire frames
//!
//! Transfers run over a dedicated peer data channel. Text frames carry JSON
//! control messages; binary frames carry one encrypted chunk each, laid out
//! as a 12-byte random nonce followed by the AEAD ciphertext.

use serde::{Deserialize, Serialize};

/// Control frames bracketing a transfer's binary chunk frames
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ControlFrame {
    /// Sent before any binary data so the receiver can pre-allocate its
    /// assembly buffer sized exactly to `total_chunks`.
    FileStart {
        transfer_id: String,
        name: String,
        size: u64,
        total_chunks: u32,
        mime_type: String,
    },

    /// Terminal frame after the last chunk
    FileEnd { transfer_id: String },
}

impl ControlFrame {
    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
