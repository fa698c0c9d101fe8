//! Handshake states and roles

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ProtocolError, ProtocolResult};

/// Identifier for one pairing attempt, used to correlate logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Which end of the BLE link we are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Companion app: replies to the peer key and asks the operator for the PIN
    Central,
    /// Device: sends the first key and displays the PIN
    Peripheral,
}

impl Role {
    pub fn peer(self) -> Self {
        match self {
            Self::Central => Self::Peripheral,
            Self::Peripheral => Self::Central,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Central => f.write_str("central"),
            Self::Peripheral => f.write_str("peripheral"),
        }
    }
}

/// Session state
///
/// States only move forward along the handshake, or drop to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, transport not yet connected
    Idle,
    /// Connected, waiting for the peer's public key
    WaitingPeerKey,
    /// Public keys exchanged, PIN not yet applied
    KeyExchanged,
    /// Confirmation pending from the peer
    WaitingConfirmation,
    /// Both sides proved the same secret and PIN
    Secure,
    /// Terminal failure; a new session is required
    Failed,
}

impl SessionState {
    /// Whether `self -> next` is an allowed edge
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Failed, _) => false,
            (_, Failed) => true,
            (Idle, WaitingPeerKey)
            | (WaitingPeerKey, KeyExchanged)
            | (KeyExchanged, WaitingConfirmation)
            | (WaitingConfirmation, Secure) => true,
            _ => false,
        }
    }

    /// Validate a transition, returning the new state
    pub fn transition(self, next: SessionState) -> ProtocolResult<SessionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ProtocolError::InvalidStateTransition {
                from: self,
                to: next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        let mut state = SessionState::Idle;
        for next in [
            SessionState::WaitingPeerKey,
            SessionState::KeyExchanged,
            SessionState::WaitingConfirmation,
            SessionState::Secure,
        ] {
            state = state.transition(next).unwrap();
        }
        assert_eq!(state, SessionState::Secure);
    }

    #[test]
    fn test_no_backward_or_skipping_edges() {
        assert!(!SessionState::Secure.can_transition_to(SessionState::WaitingPeerKey));
        assert!(!SessionState::KeyExchanged.can_transition_to(SessionState::WaitingPeerKey));
        assert!(!SessionState::WaitingPeerKey.can_transition_to(SessionState::Secure));
        assert!(SessionState::Idle.transition(SessionState::Secure).is_err());
    }

    #[test]
    fn test_failed_is_terminal() {
        assert!(SessionState::Secure.can_transition_to(SessionState::Failed));
        assert!(SessionState::Idle.can_transition_to(SessionState::Failed));
        assert!(!SessionState::Failed.can_transition_to(SessionState::Idle));
        assert!(!SessionState::Failed.can_transition_to(SessionState::Failed));
    }
}
