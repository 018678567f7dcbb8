//! Error types for the Vanish protocols

use thiserror::Error;

use crate::MAX_FILE_SIZE_LABEL;

/// Errors produced by the signaling relay.
///
/// These are terminal for the specific request only; the relay itself keeps
/// serving the room and every other room in the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("room not found")]
    RoomNotFound,

    /// Admission rejected after overshoot; the counter has already been
    /// rolled back when this is returned.
    #[error("room is full")]
    RoomFull,
}

/// Errors produced on the file-transfer path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("a transfer is already in progress")]
    TransferAlreadyInProgress,

    #[error("file too large: {size} bytes exceeds the {MAX_FILE_SIZE_LABEL} limit")]
    FileTooLarge { size: u64 },

    #[error("data channel is not open")]
    ChannelNotReady,

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("chunk decryption failed")]
    DecryptFailed,
}

/// Errors from the AEAD seal/open primitives
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    #[error("system entropy source unavailable")]
    RngUnavailable,

    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed (wrong key or tampered frame)")]
    DecryptFailed,

    #[error("frame too short: {0} bytes")]
    FrameTooShort(usize),
}

impl From<CryptoError> for TransferError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptFailed | CryptoError::FrameTooShort(_) => {
                TransferError::DecryptFailed
            }
            other => TransferError::TransferFailed(other.to_string()),
        }
    }
}
