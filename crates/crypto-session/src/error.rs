//! Crypto session error types

use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid peer key length: expected {expected}, got {actual}")]
    InvalidPeerKey { expected: usize, actual: usize },

    #[error("Peer key is a low-order point")]
    LowOrderPeerKey,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid PIN: {0}")]
    InvalidPin(String),

    #[error("Invalid confirmation hash length: expected {expected}, got {actual}")]
    InvalidConfirmationLength { expected: usize, actual: usize },

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Integrity check failed")]
    IntegrityFailure,

    #[error("Replayed message counter {counter}")]
    ReplayedMessage { counter: u64 },

    #[error("Nonce overflow: maximum message count exceeded")]
    NonceOverflow,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
