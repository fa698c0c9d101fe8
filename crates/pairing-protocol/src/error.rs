//! Error types for the protocol

use thiserror::Error;

/// Protocol error
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Frame too short: {len} bytes (header is {min})")]
    FrameTooShort { len: usize, min: usize },

    #[error("Frame length mismatch: declared {declared} bytes, {available} available")]
    FrameLengthMismatch { declared: usize, available: usize },

    #[error("Unknown frame tag: {0}")]
    UnknownTag(u8),

    #[error("Unknown encrypt flag: {0}")]
    UnknownEncryptFlag(u8),

    #[error("Empty envelope")]
    EmptyEnvelope,

    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: crate::SessionState,
        to: crate::SessionState,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
