//! Chunked, encrypted file transfer over the peer data channel
//!
//! The sender slices a payload into 64 KiB chunks, seals each independently,
//! and streams them in strict index order between `file-start` and `file-end`
//! control frames, pausing on transport backpressure. The receiver assigns
//! each arriving chunk its slot index before starting decryption, so
//! reassembly stays correct no matter what order the decrypt operations
//! complete in.

pub mod receiver;
pub mod sender;
