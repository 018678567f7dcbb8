//! Signaling control-plane messages
//!
//! The relay and its clients exchange JSON over the signaling stream. The
//! relay never interprets the `data` payload of a `signal` message; it is an
//! opaque value produced and consumed by the peer endpoints.

use serde::{Deserialize, Serialize};

/// Messages sent by the relay over the signaling stream
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    /// Sent to a newly admitted participant only
    Init {
        connection_id: String,
        /// True iff this participant was the first to join the room
        initiator: bool,
        /// Whether file transfer is enabled for this session
        file_sharing_enabled: bool,
    },

    /// Both participants are present; the initiator may create an offer
    PeerReady,

    /// Opaque signaling payload relayed verbatim to the room.
    ///
    /// Receivers self-filter by `connection_id`; a missing or malformed
    /// payload is relayed as `data: null` rather than rejected.
    Signal {
        data: Option<serde_json::Value>,
        connection_id: String,
    },

    /// A participant left the room
    PeerLeft { connection_id: String },

    /// File transfer authorized (sent to the requester only)
    FileTransferAuthorized,

    /// File transfer rejected with a human-readable reason
    FileTransferError { error: String },

    /// Request-level rejection (failed subscribe, unknown message)
    Error { code: ErrorCode, message: String },
}

/// Operations a client sends to the relay
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room by its opaque token
    Subscribe { room_id: String },

    /// Relay an opaque signaling payload to the room
    SendSignal {
        #[serde(default)]
        data: Option<serde_json::Value>,
    },

    /// Ask the relay to authorize a file transfer before opening it
    InitiateFileTransfer { metadata: TransferMetadata },

    /// Leave the current room (also implicit on disconnect)
    Unsubscribe,
}

/// Declared transfer attributes checked by the relay's authorization gate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferMetadata {
    pub file_name: String,
    pub file_size: u64,
}

/// Error codes
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Room not found
    RoomNotFound,

    /// Room is full
    RoomFull,

    /// Operation requires an active subscription
    NotSubscribed,

    /// Already subscribed to a room
    AlreadySubscribed,

    /// Message could not be parsed
    InvalidMessage,

    /// Internal server error
    InternalError,
}

/// One ICE server descriptor, consumed opaquely from a TURN credential
/// provider and passed through to the peer transport configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl RelayMessage {
    /// Create an error message
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientMessage {
    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
