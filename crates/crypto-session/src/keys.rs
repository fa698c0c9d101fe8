//! Ephemeral X25519 key agreement with directional secret split

use hkdf::Hkdf;
use pairing_protocol::Role;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::{CryptoError, CryptoResult, KEY_SIZE, KX_INFO, PUBLIC_KEY_SIZE};

/// Key pair for one pairing attempt
///
/// The private half is consumed by [`KeyPair::agree`] and zeroized on drop.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new ephemeral key pair
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    /// Build a key pair from fixed secret bytes (regression vectors only)
    pub fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the public key bytes
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Perform Diffie-Hellman with the peer and split the result by direction
    ///
    /// The peer key must be exactly [`PUBLIC_KEY_SIZE`] bytes and must not be
    /// a low-order point.
    pub fn agree(self, role: Role, peer_public: &[u8]) -> CryptoResult<DirectionalSecrets> {
        let peer: [u8; PUBLIC_KEY_SIZE] =
            peer_public
                .try_into()
                .map_err(|_| CryptoError::InvalidPeerKey {
                    expected: PUBLIC_KEY_SIZE,
                    actual: peer_public.len(),
                })?;

        let shared = self.secret.diffie_hellman(&PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(CryptoError::LowOrderPeerKey);
        }

        let ours = self.public_key_bytes();
        let (peripheral_pk, central_pk) = match role {
            Role::Central => (peer, ours),
            Role::Peripheral => (ours, peer),
        };

        let mut salt = [0u8; 2 * PUBLIC_KEY_SIZE];
        salt[..PUBLIC_KEY_SIZE].copy_from_slice(&peripheral_pk);
        salt[PUBLIC_KEY_SIZE..].copy_from_slice(&central_pk);

        let hk = Hkdf::<Sha256>::new(Some(&salt), shared.as_bytes());
        let mut okm = Zeroizing::new([0u8; 2 * KEY_SIZE]);
        hk.expand(KX_INFO, &mut okm[..])
            .map_err(|_| CryptoError::KeyDerivation("HKDF expansion failed".into()))?;

        // okm = central->peripheral || peripheral->central
        let mut to_peripheral = Zeroizing::new([0u8; KEY_SIZE]);
        let mut to_central = Zeroizing::new([0u8; KEY_SIZE]);
        to_peripheral.copy_from_slice(&okm[..KEY_SIZE]);
        to_central.copy_from_slice(&okm[KEY_SIZE..]);

        Ok(match role {
            Role::Central => DirectionalSecrets {
                rx: to_central,
                tx: to_peripheral,
            },
            Role::Peripheral => DirectionalSecrets {
                rx: to_peripheral,
                tx: to_central,
            },
        })
    }
}

/// Raw directional secrets from key agreement
///
/// One side's `tx` equals the other side's `rx`.
pub struct DirectionalSecrets {
    rx: Zeroizing<[u8; KEY_SIZE]>,
    tx: Zeroizing<[u8; KEY_SIZE]>,
}

impl DirectionalSecrets {
    /// Secret for traffic we receive
    pub fn rx(&self) -> &[u8; KEY_SIZE] {
        &self.rx
    }

    /// Secret for traffic we send
    pub fn tx(&self) -> &[u8; KEY_SIZE] {
        &self.tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_secrets_mirror() {
        let central = KeyPair::generate();
        let peripheral = KeyPair::generate();

        let central_public = central.public_key_bytes();
        let peripheral_public = peripheral.public_key_bytes();

        let a = central.agree(Role::Central, &peripheral_public).unwrap();
        let b = peripheral.agree(Role::Peripheral, &central_public).unwrap();

        assert_eq!(a.tx(), b.rx());
        assert_eq!(a.rx(), b.tx());
        assert_ne!(a.rx(), a.tx());
    }

    #[test]
    fn test_fresh_keys_per_pair() {
        assert_ne!(
            KeyPair::generate().public_key_bytes(),
            KeyPair::generate().public_key_bytes()
        );
    }

    #[test]
    fn test_wrong_length_peer_key() {
        let result = KeyPair::generate().agree(Role::Central, &[7u8; 16]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidPeerKey {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_low_order_peer_key() {
        let result = KeyPair::generate().agree(Role::Peripheral, &[0u8; 32]);
        assert!(matches!(result, Err(CryptoError::LowOrderPeerKey)));
    }

    #[test]
    fn test_fixed_secret_public_key() {
        let secret: [u8; 32] = core::array::from_fn(|i| i as u8);
        let pair = KeyPair::from_secret_bytes(secret);
        assert_eq!(
            hex::encode(pair.public_key_bytes()),
            "8f40c5adb68f25624ae5b214ea767a6ec94d829d3d7b5e1ad1ba6f3e2138285f"
        );
    }
}
