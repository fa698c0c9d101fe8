//! Pairing configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, ProtocolResult};

/// Shortest PIN accepted from an operator
pub const MIN_PIN_DIGITS: usize = 4;

/// Longest PIN accepted from an operator
pub const MAX_PIN_DIGITS: usize = 12;

/// Longest timeout accepted for any handshake phase
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Pairing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Seconds to wait for each handshake frame from the peer
    pub handshake_timeout_secs: u64,
    /// Seconds the operator has to enter the PIN
    pub pin_entry_timeout_secs: u64,
    /// Digits in a PIN generated by the peripheral
    pub pin_digits: usize,
    /// Out-of-state frames tolerated before the handshake is aborted
    pub max_unexpected_frames: u32,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: 30,
            pin_entry_timeout_secs: 120,
            pin_digits: 6,
            max_unexpected_frames: 3,
        }
    }
}

impl PairingConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn pin_entry_timeout(&self) -> Duration {
        Duration::from_secs(self.pin_entry_timeout_secs)
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> ProtocolResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> ProtocolResult<()> {
        check_timeout("handshake_timeout_secs", self.handshake_timeout_secs)?;
        check_timeout("pin_entry_timeout_secs", self.pin_entry_timeout_secs)?;

        if self.max_unexpected_frames == 0 {
            return Err(ProtocolError::InvalidConfig(
                "max_unexpected_frames must be non-zero".to_string(),
            ));
        }

        if !(MIN_PIN_DIGITS..=MAX_PIN_DIGITS).contains(&self.pin_digits) {
            return Err(ProtocolError::InvalidConfig(format!(
                "pin_digits must be between {} and {}, got {}",
                MIN_PIN_DIGITS, MAX_PIN_DIGITS, self.pin_digits
            )));
        }

        Ok(())
    }
}

fn check_timeout(name: &str, secs: u64) -> ProtocolResult<()> {
    if !(1..=MAX_TIMEOUT_SECS).contains(&secs) {
        return Err(ProtocolError::InvalidConfig(format!(
            "{} must be between 1 and {}, got {}",
            name, MAX_TIMEOUT_SECS, secs
        )));
    }
    Ok(())
}
