//! Vanish Relay
//!
//! Signaling-and-capacity relay for anonymous two-party sessions. The relay
//! admits at most two participants per room, forwards opaque signaling
//! payloads between them, and never sees message or file content.
//!
//! # Protocol
//!
//! 1. A client requests a new room and shares the opaque token out of band
//! 2. Both clients subscribe; the first admitted is the initiator
//! 3. The relay forwards offer/answer/candidate payloads verbatim
//! 4. Peers establish a direct data channel; content never touches the relay
//! 5. Leaving (or the room TTL) tears the room down

pub mod relay;
pub mod room;
pub mod server;
pub mod store;

pub use relay::{SignalRelay, Subscription};
pub use room::RoomRegistry;
pub use server::RelayServer;
pub use store::{MemoryStore, RoomCounterStore};

/// Default WebSocket port
pub const DEFAULT_PORT: u16 = 8080;
