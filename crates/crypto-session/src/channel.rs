//! Authenticated record channel with ChaCha20Poly1305

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use pairing_protocol::Role;

use crate::{
    COUNTER_SIZE, CryptoError, CryptoResult, NONCE_SIZE, RECORD_OVERHEAD, SessionKeys,
};

/// Nonce prefix for traffic sent by the central
const CENTRAL_PREFIX: u32 = 0x0000_0000;

/// Nonce prefix for traffic sent by the peripheral
const PERIPHERAL_PREFIX: u32 = 0xFFFF_FFFF;

fn send_prefix(role: Role) -> u32 {
    match role {
        Role::Central => CENTRAL_PREFIX,
        Role::Peripheral => PERIPHERAL_PREFIX,
    }
}

/// Established secure channel
///
/// Record format: `[8 bytes counter LE][ciphertext][16-byte auth tag]`.
/// The counter is sent in the clear so a lost write does not desynchronize
/// the peers; it is authenticated through the nonce.
pub struct SecureChannel {
    /// Cipher keyed by our encrypt key
    sealer: ChaCha20Poly1305,
    /// Cipher keyed by our decrypt key
    opener: ChaCha20Poly1305,
    role: Role,
    /// Message counter for nonce generation (send)
    send_counter: u64,
    /// Highest counter accepted so far (receive)
    recv_highest: Option<u64>,
}

impl SecureChannel {
    pub fn new(keys: &SessionKeys, role: Role) -> CryptoResult<Self> {
        let sealer = ChaCha20Poly1305::new_from_slice(keys.encrypt_key())
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        let opener = ChaCha20Poly1305::new_from_slice(keys.decrypt_key())
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            sealer,
            opener,
            role,
            send_counter: 0,
            recv_highest: None,
        })
    }

    /// Nonce format: [4 bytes direction prefix][8 bytes counter]
    fn nonce(prefix: u32, counter: u64) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[0..4].copy_from_slice(&prefix.to_le_bytes());
        nonce[4..12].copy_from_slice(&counter.to_le_bytes());
        nonce
    }

    /// Encrypt and authenticate one message
    pub fn seal(&mut self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        if self.send_counter == u64::MAX {
            return Err(CryptoError::NonceOverflow);
        }

        let counter = self.send_counter;
        let nonce_bytes = Self::nonce(send_prefix(self.role), counter);

        let ciphertext = self
            .sealer
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        self.send_counter += 1;

        let mut record = Vec::with_capacity(COUNTER_SIZE + ciphertext.len());
        record.extend_from_slice(&counter.to_le_bytes());
        record.extend_from_slice(&ciphertext);
        Ok(record)
    }

    /// Verify and decrypt one record
    ///
    /// Authentication is checked before the replay window, so any tampering
    /// reports [`CryptoError::IntegrityFailure`].
    pub fn open(&mut self, record: &[u8]) -> CryptoResult<Vec<u8>> {
        if record.len() < RECORD_OVERHEAD {
            return Err(CryptoError::IntegrityFailure);
        }

        let (counter_bytes, ciphertext) = record.split_at(COUNTER_SIZE);
        let mut raw = [0u8; COUNTER_SIZE];
        raw.copy_from_slice(counter_bytes);
        let counter = u64::from_le_bytes(raw);

        let nonce_bytes = Self::nonce(send_prefix(self.role.peer()), counter);

        let plaintext = self
            .opener
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::IntegrityFailure)?;

        if self.recv_highest.is_some_and(|highest| counter <= highest) {
            return Err(CryptoError::ReplayedMessage { counter });
        }
        self.recv_highest = Some(counter);

        Ok(plaintext)
    }

    /// Get the current send counter (for debugging/stats)
    pub fn send_count(&self) -> u64 {
        self.send_counter
    }

    /// Highest counter accepted from the peer
    pub fn recv_highest(&self) -> Option<u64> {
        self.recv_highest
    }
}
