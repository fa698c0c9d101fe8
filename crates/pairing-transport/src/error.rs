//! Transport error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Write too large: {size} bytes (max: {max})")]
    WriteTooLarge { size: usize, max: usize },

    #[error("Not connected")]
    NotConnected,
}

pub type TransportResult<T> = Result<T, TransportError>;
