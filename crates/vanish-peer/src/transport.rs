//! Transport seams for the peer session
//!
//! The session state machine and the transfer protocol are written against
//! these traits so the underlying peer connection (browser WebRTC bindings,
//! a native stack, or a test double) stays pluggable.

use async_trait::async_trait;

use vanish_core::IceServer;

/// Errors reported by a peer transport
#[derive(Debug, Clone)]
pub enum TransportError {
    /// Offer/answer creation failed
    NegotiationFailed(String),
    /// Remote description was rejected
    InvalidDescription(String),
    /// Candidate could not be applied (often transient; callers log and move on)
    CandidateRejected(String),
    /// Transport is closed
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::NegotiationFailed(e) => write!(f, "Negotiation failed: {}", e),
            TransportError::InvalidDescription(e) => write!(f, "Invalid description: {}", e),
            TransportError::CandidateRejected(e) => write!(f, "Candidate rejected: {}", e),
            TransportError::Closed => write!(f, "Transport closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Events the transport reports back to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The peer connection is established; channels may be used
    Connected,
    /// The connection failed permanently
    Failed,
    /// The connection was closed
    Closed,
}

/// Driver for peer connection establishment.
///
/// Descriptions and candidates are carried as opaque strings/JSON; the
/// session never inspects their contents.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create a local offer description
    async fn create_offer(&self) -> Result<String, TransportError>;

    /// Create a local answer description (after a remote offer was set)
    async fn create_answer(&self) -> Result<String, TransportError>;

    /// Apply the remote peer's offer description
    async fn set_remote_offer(&self, sdp: &str) -> Result<(), TransportError>;

    /// Apply the remote peer's answer description
    async fn set_remote_answer(&self, sdp: &str) -> Result<(), TransportError>;

    /// Apply a remote ICE candidate.
    ///
    /// May be called before or after description exchange; implementations
    /// buffer early candidates themselves or reject them, in which case the
    /// session logs and swallows the failure.
    async fn add_ice_candidate(&self, candidate: serde_json::Value)
        -> Result<(), TransportError>;

    /// Tear down the connection and all channels
    async fn close(&self);
}

/// Errors from a peer data channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel is closed
    Closed,
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::Closed => write!(f, "Data channel closed"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// An established, ordered, reliable peer byte-stream channel.
///
/// Text frames carry JSON control messages; binary frames carry encrypted
/// chunks. `buffered_amount` exposes the transport's outstanding unsent
/// bytes so senders can apply backpressure.
#[async_trait]
pub trait DataChannel: Send + Sync {
    /// Whether the channel is currently open
    fn is_open(&self) -> bool;

    /// Bytes queued in the transport but not yet sent
    fn buffered_amount(&self) -> usize;

    /// Send a text frame
    async fn send_text(&self, text: String) -> Result<(), ChannelError>;

    /// Send a binary frame
    async fn send_binary(&self, data: Vec<u8>) -> Result<(), ChannelError>;

    /// Resolve once the buffered amount has drained to `low_water` or below.
    ///
    /// One-shot: each call registers a fresh notification.
    async fn drained(&self, low_water: usize);
}

/// Source of ICE server descriptors for transport configuration.
///
/// Credentials come from an external TURN provider and are passed through
/// opaquely; the peer never inspects them.
pub trait IceServerProvider: Send + Sync {
    fn generate_ice_servers(&self) -> Vec<IceServer>;
}

/// Fixed list of ICE servers, typically taken from the room-creation response
pub struct StaticIceServers {
    servers: Vec<IceServer>,
}

impl StaticIceServers {
    pub fn new(servers: Vec<IceServer>) -> Self {
        Self { servers }
    }
}

impl IceServerProvider for StaticIceServers {
    fn generate_ice_servers(&self) -> Vec<IceServer> {
        self.servers.clone()
    }
}
