//! Crypto Session - key agreement, PIN binding and the secure channel
//!
//! Provides X25519 key agreement split into directional secrets, PIN-bound
//! session keys with a confirmation hash, and ChaCha20Poly1305 records.

mod channel;
mod error;
mod keys;
mod pin;

pub use channel::*;
pub use error::*;
pub use keys::*;
pub use pin::*;

pub use pairing_protocol::{CONFIRMATION_HASH_SIZE, PUBLIC_KEY_SIZE};

/// Nonce size for ChaCha20Poly1305 (96 bits / 12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits / 16 bytes)
pub const TAG_SIZE: usize = 16;

/// Explicit message counter carried at the front of every sealed record
pub const COUNTER_SIZE: usize = 8;

/// Bytes a sealed record adds on top of the plaintext
pub const RECORD_OVERHEAD: usize = COUNTER_SIZE + TAG_SIZE;

/// Symmetric key size (256 bits / 32 bytes)
pub const KEY_SIZE: usize = 32;

/// HKDF info for splitting the X25519 output into directional secrets
pub(crate) const KX_INFO: &[u8] = b"secure-pairing/kx/v1";

/// HKDF info for binding a directional secret to the PIN
pub(crate) const PIN_INFO: &[u8] = b"secure-pairing/pin/v1";

/// Domain separation prefix for confirmation hashes
pub(crate) const CONFIRM_LABEL: &[u8] = b"secure-pairing/confirm/v1";
