//! Vanish Core - Shared protocol types and chunk cryptography
//!
//! This crate contains the message definitions, wire frames, sizing constants,
//! and AEAD primitives used by both the relay and the peer endpoints. It has
//! no dependencies on networking code.

pub mod config;
pub mod crypto;
pub mod error;
pub mod frames;
pub mod messages;

pub use config::RelayConfig;
pub use crypto::SessionKey;
pub use error::*;
pub use frames::*;
pub use messages::*;

/// Plaintext chunk size in bytes (64 KiB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Suspend sending when the channel's buffered amount exceeds this (16 MiB)
pub const HIGH_WATER_MARK: usize = 16 * 1024 * 1024;

/// Resume sending once the buffered amount drops below this (8 MiB)
pub const LOW_WATER_MARK: usize = HIGH_WATER_MARK / 2;

/// Maximum file size accepted for transfer (24 MiB).
///
/// User-facing rejection messages phrase this as "24 MB"; the numeric
/// constant is the authoritative limit.
pub const MAX_FILE_SIZE: u64 = 24 * 1024 * 1024;

/// Label used in size-limit error messages
pub const MAX_FILE_SIZE_LABEL: &str = "24 MB";

/// Room existence key TTL in seconds (30 minutes)
pub const ROOM_TTL_SECS: u64 = 1800;

/// Participant counter key TTL in seconds (slight margin over the room TTL)
pub const COUNTER_TTL_SECS: u64 = 1860;

/// AEAD nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// Maximum participants admitted to a room
pub const MAX_ROOM_PARTICIPANTS: i64 = 2;

/// Number of chunks needed to carry `size` bytes
pub fn chunk_count(size: u64) -> u32 {
    size.div_ceil(CHUNK_SIZE as u64) as u32
}
