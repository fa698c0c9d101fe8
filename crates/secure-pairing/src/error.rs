//! Pairing error types

use crypto_session::CryptoError;
use pairing_protocol::{ProtocolError, SessionState, Tag};
use pairing_transport::TransportError;
use thiserror::Error;

/// Pairing error
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("Frame length mismatch: declared {declared} bytes, {available} available")]
    FrameLengthMismatch { declared: usize, available: usize },

    #[error("Malformed frame: {0}")]
    MalformedFrame(#[source] ProtocolError),

    #[error("Invalid peer key: {0}")]
    InvalidPeerKey(#[source] CryptoError),

    #[error("Confirmation mismatch: peer holds a different secret or PIN")]
    ConfirmationMismatch,

    #[error("Integrity check failed")]
    IntegrityFailure,

    #[error("Replayed message counter {counter}")]
    ReplayedMessage { counter: u64 },

    #[error("Handshake timed out in {state:?}")]
    HandshakeTimeout { state: SessionState },

    #[error("Transport disconnected")]
    TransportDisconnected,

    #[error("PIN entry aborted: {0}")]
    PinEntryAborted(String),

    #[error("Unexpected {tag:?} frame in {state:?}")]
    UnexpectedFrame { state: SessionState, tag: Tag },

    #[error("Too many unexpected frames ({count})")]
    TooManyUnexpectedFrames { count: u32 },

    #[error("PIN not expected in {state:?}")]
    PinNotExpected { state: SessionState },

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Session not established (state: {state:?})")]
    NotEstablished { state: SessionState },

    #[error("Session failed")]
    SessionFailed,

    #[error("Key material missing in {state:?}")]
    MissingKeyMaterial { state: SessionState },

    #[error("Protocol error: {0}")]
    Protocol(#[source] ProtocolError),

    #[error("Crypto error: {0}")]
    Crypto(#[source] CryptoError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl PairingError {
    /// Whether the session was destroyed by this error
    ///
    /// Non-fatal errors reject a single frame or call and leave the session
    /// in its current state.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::IntegrityFailure
                | Self::ReplayedMessage { .. }
                | Self::UnexpectedFrame { .. }
                | Self::PinNotExpected { .. }
                | Self::MessageTooLarge { .. }
                | Self::NotEstablished { .. }
        )
    }
}

impl From<ProtocolError> for PairingError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::FrameLengthMismatch {
                declared,
                available,
            } => Self::FrameLengthMismatch {
                declared,
                available,
            },
            ProtocolError::FrameTooShort { .. }
            | ProtocolError::UnknownTag(_)
            | ProtocolError::UnknownEncryptFlag(_)
            | ProtocolError::EmptyEnvelope => Self::MalformedFrame(err),
            other => Self::Protocol(other),
        }
    }
}

impl From<CryptoError> for PairingError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidPeerKey { .. } | CryptoError::LowOrderPeerKey => {
                Self::InvalidPeerKey(err)
            }
            CryptoError::InvalidConfirmationLength { .. } => Self::ConfirmationMismatch,
            CryptoError::IntegrityFailure => Self::IntegrityFailure,
            CryptoError::ReplayedMessage { counter } => Self::ReplayedMessage { counter },
            other => Self::Crypto(other),
        }
    }
}

/// Result type alias for pairing operations
pub type PairingResult<T> = Result<T, PairingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_errors_map_to_kinds() {
        let err: PairingError = ProtocolError::FrameLengthMismatch {
            declared: 10,
            available: 4,
        }
        .into();
        assert!(matches!(
            err,
            PairingError::FrameLengthMismatch {
                declared: 10,
                available: 4
            }
        ));

        let err: PairingError = ProtocolError::UnknownTag(7).into();
        assert!(matches!(err, PairingError::MalformedFrame(_)));
    }

    #[test]
    fn test_crypto_errors_map_to_kinds() {
        let err: PairingError = CryptoError::InvalidPeerKey {
            expected: 32,
            actual: 16,
        }
        .into();
        assert!(matches!(err, PairingError::InvalidPeerKey(_)));

        let err: PairingError = CryptoError::ReplayedMessage { counter: 4 }.into();
        assert!(matches!(err, PairingError::ReplayedMessage { counter: 4 }));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PairingError::ConfirmationMismatch.is_fatal());
        assert!(PairingError::TransportDisconnected.is_fatal());
        assert!(
            PairingError::HandshakeTimeout {
                state: SessionState::WaitingPeerKey
            }
            .is_fatal()
        );
        assert!(!PairingError::IntegrityFailure.is_fatal());
        assert!(!PairingError::ReplayedMessage { counter: 0 }.is_fatal());
    }
}
