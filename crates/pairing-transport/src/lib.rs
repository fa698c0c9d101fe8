//! Pairing Transport - the BLE link seam
//!
//! The platform Bluetooth stack is an external collaborator. It is reached
//! through the [`Link`] trait: one write characteristic towards the peer and
//! one notify characteristic from it, each carrying whole messages in order.

mod error;
mod link;
mod memory;

pub use error::*;
pub use link::*;
pub use memory::*;

/// Maximum ATT attribute value length, and so the largest single write
pub const MAX_WRITE_SIZE: usize = 512;
