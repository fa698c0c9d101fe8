//! PIN-authenticated pairing over a BLE-style link
//!
//! [`Session`] is the synchronous handshake core: it consumes inbound bytes
//! and produces [`SessionEvent`]s, with no clock and no I/O. [`PairingDriver`]
//! runs a session over a [`pairing_transport::Link`], solicits the PIN through
//! a [`PinSource`] and enforces the handshake timeouts. A finished handshake
//! yields a [`SecureLink`] for encrypted application traffic.

mod driver;
mod error;
mod pin_source;
mod session;

pub use driver::*;
pub use error::*;
pub use pin_source::*;
pub use session::*;

pub use crypto_session::Pin;
pub use pairing_protocol::{PairingConfig, Role, SessionId, SessionState};

use crypto_session::RECORD_OVERHEAD;
use pairing_protocol::FRAME_HEADER_SIZE;
use pairing_transport::MAX_WRITE_SIZE;

/// Largest plaintext that fits in one link write once enveloped and sealed
pub const MAX_MESSAGE_SIZE: usize = MAX_WRITE_SIZE - 1 - FRAME_HEADER_SIZE - RECORD_OVERHEAD;
