//! PIN binding and confirmation hashes

use hkdf::Hkdf;
use pairing_protocol::{MAX_PIN_DIGITS, MIN_PIN_DIGITS};
use rand::Rng;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{
    CONFIRM_LABEL, CONFIRMATION_HASH_SIZE, CryptoError, CryptoResult, DirectionalSecrets, KEY_SIZE,
    PIN_INFO,
};

/// Out-of-band PIN shown by the peripheral and typed by the operator
#[derive(Clone)]
pub struct Pin(Zeroizing<String>);

impl Pin {
    /// Validate an operator-supplied PIN
    pub fn new(value: impl Into<String>) -> CryptoResult<Self> {
        let value = Zeroizing::new(value.into());

        if !(MIN_PIN_DIGITS..=MAX_PIN_DIGITS).contains(&value.len()) {
            return Err(CryptoError::InvalidPin(format!(
                "expected {} to {} digits, got {}",
                MIN_PIN_DIGITS,
                MAX_PIN_DIGITS,
                value.len()
            )));
        }

        if !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CryptoError::InvalidPin("only digits are allowed".into()));
        }

        Ok(Self(value))
    }

    /// Generate a uniformly random PIN with the given number of digits
    pub fn generate(digits: usize) -> CryptoResult<Self> {
        let mut rng = OsRng;
        let value: String = (0..digits)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        Self::new(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pin(..)")
    }
}

/// Final PIN-bound keys for one session
pub struct SessionKeys {
    encrypt: Zeroizing<[u8; KEY_SIZE]>,
    decrypt: Zeroizing<[u8; KEY_SIZE]>,
}

impl SessionKeys {
    pub fn encrypt_key(&self) -> &[u8; KEY_SIZE] {
        &self.encrypt
    }

    pub fn decrypt_key(&self) -> &[u8; KEY_SIZE] {
        &self.decrypt
    }

    /// Hash we send to prove we hold the same secret and PIN
    pub fn local_confirmation(&self) -> ConfirmationHash {
        ConfirmationHash::of(&self.decrypt)
    }

    /// Hash the peer must send: its decrypt key is our encrypt key
    pub fn expected_peer_confirmation(&self) -> ConfirmationHash {
        ConfirmationHash::of(&self.encrypt)
    }
}

/// Bind both directional secrets to the PIN
pub fn derive_session_keys(secrets: &DirectionalSecrets, pin: &Pin) -> CryptoResult<SessionKeys> {
    Ok(SessionKeys {
        encrypt: bind_pin(secrets.tx(), pin)?,
        decrypt: bind_pin(secrets.rx(), pin)?,
    })
}

fn bind_pin(secret: &[u8; KEY_SIZE], pin: &Pin) -> CryptoResult<Zeroizing<[u8; KEY_SIZE]>> {
    let hk = Hkdf::<Sha256>::new(Some(pin.as_str().as_bytes()), secret);
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(PIN_INFO, &mut key[..])
        .map_err(|_| CryptoError::KeyDerivation("HKDF expansion failed".into()))?;
    Ok(key)
}

/// SHA-256 over a session key, exchanged in confirmation frames
#[derive(Clone)]
pub struct ConfirmationHash([u8; CONFIRMATION_HASH_SIZE]);

impl ConfirmationHash {
    pub fn of(key: &[u8; KEY_SIZE]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(CONFIRM_LABEL);
        hasher.update(key);
        Self(hasher.finalize().into())
    }

    /// Parse a hash received from the peer
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let hash = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidConfirmationLength {
                expected: CONFIRMATION_HASH_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(hash))
    }

    pub fn as_bytes(&self) -> &[u8; CONFIRMATION_HASH_SIZE] {
        &self.0
    }

    /// Constant-time comparison
    pub fn matches(&self, other: &ConfirmationHash) -> bool {
        self.0[..].ct_eq(&other.0[..]).into()
    }
}

impl std::fmt::Debug for ConfirmationHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConfirmationHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}
