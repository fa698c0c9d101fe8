//! Pairing Protocol - wire definitions for secure BLE pairing
//!
//! This crate contains the frame codec, the handshake state enum and the
//! pairing configuration shared by the crypto, transport and session crates.

mod config;
mod error;
mod frame;
mod session;

pub use config::*;
pub use error::*;
pub use frame::*;
pub use session::*;

/// Size of the little-endian length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Length prefix plus tag byte
pub const FRAME_HEADER_SIZE: usize = LENGTH_PREFIX_SIZE + 1;

/// Largest payload a single frame may declare
pub const MAX_FRAME_PAYLOAD: usize = 64 * 1024;

/// Public key size carried in key exchange frames (X25519)
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Confirmation hash size carried in confirmation frames (SHA-256)
pub const CONFIRMATION_HASH_SIZE: usize = 32;
