//! Vanish Peer
//!
//! Client-side protocol machinery: the per-participant session state machine
//! that drives offer/answer/candidate exchange through the relay, and the
//! chunked, encrypted, backpressure-aware file-transfer protocol layered on
//! the resulting peer data channel.

pub mod session;
pub mod transfer;
pub mod transport;

pub use session::{PeerSession, SessionEvent, SessionState};
pub use transfer::receiver::{CompletedFile, FileReceiver, TransferPhase};
pub use transfer::sender::{FileSender, OutgoingFile, SendProgress};
pub use transport::{
    ChannelError, DataChannel, IceServerProvider, PeerTransport, StaticIceServers, TransportError,
    TransportEvent,
};
