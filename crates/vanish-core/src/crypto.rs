//! Chunk cryptography and identifier generation
//!
//! Every chunk is sealed independently under the session key with a fresh
//! random 12-byte nonce. The nonce is prefixed to the ciphertext so frames
//! are self-contained.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};

use crate::error::CryptoError;
use crate::NONCE_LEN;

/// Length of the symmetric session key in bytes
pub const KEY_LEN: usize = 32;

/// Symmetric session key shared by exactly two peers.
///
/// The key itself is provisioned out of band (it never transits the relay);
/// this type only performs the per-frame seal/open work.
#[derive(Clone)]
pub struct SessionKey {
    key: [u8; KEY_LEN],
}

impl SessionKey {
    /// Wrap an existing 32-byte key
    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Generate a fresh random key
    pub fn generate() -> Result<Self, CryptoError> {
        let mut key = [0u8; KEY_LEN];
        getrandom::getrandom(&mut key).map_err(|_| CryptoError::RngUnavailable)?;
        Ok(Self { key })
    }

    /// Encrypt one plaintext slice into a self-contained frame.
    ///
    /// The frame is `nonce || ciphertext`. Nonces are drawn fresh from the
    /// system RNG for every call and must never repeat under the same key.
    pub fn seal_chunk(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut nonce_bytes).map_err(|_| CryptoError::RngUnavailable)?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CryptoError::EncryptFailed)?;

        let mut frame = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        frame.extend_from_slice(&nonce_bytes);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    /// Decrypt one frame produced by [`SessionKey::seal_chunk`].
    ///
    /// Authentication failure (tampered or foreign-key data) is reported as
    /// [`CryptoError::DecryptFailed`], never a panic.
    pub fn open_chunk(&self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if frame.len() < NONCE_LEN {
            return Err(CryptoError::FrameTooShort(frame.len()));
        }

        let (nonce_bytes, ciphertext) = frame.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log key material
        f.write_str("SessionKey(..)")
    }
}

/// Generate a relay-local connection identity (8 random bytes, hex)
pub fn generate_connection_id() -> String {
    random_hex_id(8)
}

/// Generate an opaque room token (16 random bytes, hex)
pub fn generate_room_token() -> String {
    random_hex_id(16)
}

/// Generate a transfer identifier (8 random bytes, hex)
pub fn generate_transfer_id() -> String {
    random_hex_id(8)
}

fn random_hex_id(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    getrandom::getrandom(&mut buf).expect("RNG failed - system entropy source unavailable");
    hex::encode(buf)
}
