//! Handshake state machine
//!
//! The session owns every piece of key material for one pairing attempt and
//! is driven purely by calls: inbound link bytes, the operator's PIN, and the
//! driver's timer and disconnect notifications. It never performs I/O; the
//! returned [`SessionEvent`]s tell the caller what to write and what to show.

use std::time::Duration;

use bytes::Bytes;
use crypto_session::{
    ConfirmationHash, DirectionalSecrets, KeyPair, Pin, RECORD_OVERHEAD, SecureChannel,
    SessionKeys, derive_session_keys,
};
use pairing_protocol::{
    Envelope, Frame, MAX_FRAME_PAYLOAD, PUBLIC_KEY_SIZE, PairingConfig, Role, SessionId,
    SessionState, Tag, encode_frame,
};
use tracing::{debug, info, warn};

use crate::{PairingError, PairingResult};

/// What the session asks its driver to do
#[derive(Debug)]
pub enum SessionEvent {
    /// Write these bytes to the link
    Transmit(Bytes),
    /// Ask the operator for the PIN shown on the peripheral
    PinRequired,
    /// Show this PIN to the operator
    DisplayPin(Pin),
    /// Both sides confirmed; application data may flow
    Established,
    /// Decrypted application message
    Message(Bytes),
}

/// Builder for [`Session`]
pub struct SessionBuilder {
    role: Role,
    config: PairingConfig,
    keypair: Option<KeyPair>,
    pin: Option<Pin>,
}

impl SessionBuilder {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            config: PairingConfig::default(),
            keypair: None,
            pin: None,
        }
    }

    pub fn config(mut self, config: PairingConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this key pair instead of a freshly generated one
    pub fn keypair(mut self, keypair: KeyPair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    /// Peripheral only: display this PIN instead of generating one
    pub fn pin(mut self, pin: Pin) -> Self {
        self.pin = Some(pin);
        self
    }

    pub fn build(self) -> PairingResult<Session> {
        self.config.validate()?;

        let (keypair, pin) = match self.role {
            // The central's key pair is generated when the peer key arrives
            Role::Central => {
                if self.pin.is_some() {
                    debug!("Ignoring preset PIN on the central; it is entered by the operator");
                }
                (self.keypair, None)
            }
            Role::Peripheral => {
                let pin = match self.pin {
                    Some(pin) => pin,
                    None => Pin::generate(self.config.pin_digits)?,
                };
                (Some(self.keypair.unwrap_or_else(KeyPair::generate)), Some(pin))
            }
        };

        let session = Session {
            id: SessionId::new(),
            role: self.role,
            config: self.config,
            state: SessionState::Idle,
            keypair,
            peer_public: None,
            secrets: None,
            pin,
            keys: None,
            expected_confirmation: None,
            channel: None,
            unexpected_frames: 0,
        };

        debug!(session = %session.id, role = %session.role, "Session created");
        Ok(session)
    }
}

/// One pairing attempt, from connect to secure channel or failure
pub struct Session {
    id: SessionId,
    role: Role,
    config: PairingConfig,
    state: SessionState,
    /// Consumed by the key agreement
    keypair: Option<KeyPair>,
    peer_public: Option<[u8; PUBLIC_KEY_SIZE]>,
    /// Central only: held while the operator types the PIN
    secrets: Option<DirectionalSecrets>,
    /// Peripheral only: the PIN on display
    pin: Option<Pin>,
    /// PIN-bound keys awaiting confirmation
    keys: Option<SessionKeys>,
    expected_confirmation: Option<ConfirmationHash>,
    channel: Option<SecureChannel>,
    unexpected_frames: u32,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    /// The peer's public key, once exchanged
    pub fn peer_public_key(&self) -> Option<&[u8; PUBLIC_KEY_SIZE]> {
        self.peer_public.as_ref()
    }

    /// Out-of-state frames dropped so far
    pub fn unexpected_frames(&self) -> u32 {
        self.unexpected_frames
    }

    /// Whether any secret, PIN or derived key is still held
    pub fn holds_key_material(&self) -> bool {
        self.keypair.is_some()
            || self.peer_public.is_some()
            || self.secrets.is_some()
            || self.pin.is_some()
            || self.keys.is_some()
            || self.expected_confirmation.is_some()
            || self.channel.is_some()
    }

    /// How long the driver may wait for progress in the current state
    ///
    /// The peripheral's confirmation wait spans the operator typing the PIN
    /// on the central, so it also includes the PIN entry allowance.
    pub fn phase_timeout(&self) -> Option<Duration> {
        let handshake = self.config.handshake_timeout();
        let pin_entry = self.config.pin_entry_timeout();

        match (self.role, self.state) {
            (_, SessionState::WaitingPeerKey) => Some(handshake),
            (Role::Central, SessionState::KeyExchanged) => Some(pin_entry),
            (Role::Central, SessionState::WaitingConfirmation) => Some(handshake),
            (Role::Peripheral, SessionState::WaitingConfirmation) => {
                Some(handshake.saturating_add(pin_entry))
            }
            _ => None,
        }
    }

    /// The transport is connected; start the handshake
    pub fn connect(&mut self) -> PairingResult<Vec<SessionEvent>> {
        self.guard(Self::on_connect)
    }

    /// Process one complete message from the link
    ///
    /// Before the channel is secure the message is a bare frame; afterwards
    /// it is an application envelope.
    pub fn receive(&mut self, data: &[u8]) -> PairingResult<Vec<SessionEvent>> {
        self.guard(|session| session.on_receive(data))
    }

    /// Central: the operator entered the PIN
    pub fn provide_pin(&mut self, pin: Pin) -> PairingResult<Vec<SessionEvent>> {
        self.guard(|session| session.on_pin(pin))
    }

    /// Encrypt an application message into an envelope ready for the link
    pub fn seal(&mut self, plaintext: &[u8]) -> PairingResult<Bytes> {
        self.guard(|session| session.on_seal(plaintext))
    }

    /// Central: the operator cancelled the PIN prompt
    pub fn abort_pin(&mut self, reason: impl Into<String>) -> PairingError {
        self.abort(PairingError::PinEntryAborted(reason.into()))
    }

    /// The link dropped
    pub fn disconnect(&mut self) -> PairingError {
        self.abort(PairingError::TransportDisconnected)
    }

    /// The current phase timed out
    ///
    /// A secure session has nothing left to expire and is left untouched.
    pub fn expire(&mut self) -> PairingResult<()> {
        match self.state {
            SessionState::Secure => Ok(()),
            SessionState::Failed => Err(PairingError::SessionFailed),
            state => Err(self.abort(PairingError::HandshakeTimeout { state })),
        }
    }

    /// Fail the session with `err`, wiping all key material
    pub fn abort(&mut self, err: PairingError) -> PairingError {
        self.fail(&err);
        err
    }

    /// Run an operation, failing the session on any fatal error
    fn guard<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> PairingResult<T>,
    ) -> PairingResult<T> {
        if self.state == SessionState::Failed {
            return Err(PairingError::SessionFailed);
        }

        let result = op(self);
        if let Err(err) = &result {
            if err.is_fatal() {
                self.fail(err);
            }
        }
        result
    }

    fn fail(&mut self, reason: &PairingError) {
        let Ok(failed) = self.state.transition(SessionState::Failed) else {
            return;
        };

        warn!(
            session = %self.id,
            role = %self.role,
            state = ?self.state,
            error = %reason,
            "Pairing failed"
        );

        self.state = failed;
        self.keypair = None;
        self.peer_public = None;
        self.secrets = None;
        self.pin = None;
        self.keys = None;
        self.expected_confirmation = None;
        self.channel = None;
    }

    fn advance(&mut self, next: SessionState) -> PairingResult<()> {
        self.state = self.state.transition(next)?;
        debug!(session = %self.id, state = ?self.state, "State changed");
        Ok(())
    }

    fn missing(&self) -> PairingError {
        PairingError::MissingKeyMaterial { state: self.state }
    }

    fn on_connect(&mut self) -> PairingResult<Vec<SessionEvent>> {
        self.advance(SessionState::WaitingPeerKey)?;

        match self.role {
            Role::Central => {
                info!(session = %self.id, "Waiting for peripheral key");
                Ok(Vec::new())
            }
            Role::Peripheral => {
                let public = self
                    .keypair
                    .as_ref()
                    .map(KeyPair::public_key_bytes)
                    .ok_or_else(|| self.missing())?;
                let pin = self.pin.clone().ok_or_else(|| self.missing())?;
                let frame = encode_frame(Tag::KeyExchange, &public)?;

                info!(session = %self.id, "Sent public key, displaying PIN");
                Ok(vec![SessionEvent::DisplayPin(pin), SessionEvent::Transmit(frame)])
            }
        }
    }

    fn on_receive(&mut self, data: &[u8]) -> PairingResult<Vec<SessionEvent>> {
        if self.state == SessionState::Secure {
            return self.on_envelope(data);
        }

        let frame = Frame::decode(data)?;

        match (self.role, self.state, frame.tag) {
            (Role::Central, SessionState::WaitingPeerKey, Tag::KeyExchange) => {
                self.on_peripheral_key(&frame.payload)
            }
            (Role::Peripheral, SessionState::WaitingPeerKey, Tag::KeyExchange) => {
                self.on_central_key(&frame.payload)
            }
            (_, SessionState::WaitingConfirmation, Tag::Confirmation) => {
                self.on_confirmation(&frame.payload)
            }
            (_, state, tag) => self.on_unexpected(state, tag),
        }
    }

    /// Central: reply with our key and ask for the PIN
    fn on_peripheral_key(&mut self, peer_public: &[u8]) -> PairingResult<Vec<SessionEvent>> {
        let keypair = self.keypair.take().unwrap_or_else(KeyPair::generate);
        let public = keypair.public_key_bytes();

        let secrets = keypair.agree(Role::Central, peer_public)?;
        self.secrets = Some(secrets);
        self.peer_public = peer_public.try_into().ok();

        let reply = encode_frame(Tag::KeyExchange, &public)?;
        self.advance(SessionState::KeyExchanged)?;

        info!(session = %self.id, "Keys exchanged, waiting for PIN entry");
        Ok(vec![SessionEvent::Transmit(reply), SessionEvent::PinRequired])
    }

    /// Peripheral: bind our displayed PIN and wait for the central to confirm
    fn on_central_key(&mut self, peer_public: &[u8]) -> PairingResult<Vec<SessionEvent>> {
        let keypair = self.keypair.take().ok_or_else(|| self.missing())?;
        let secrets = keypair.agree(Role::Peripheral, peer_public)?;
        self.peer_public = peer_public.try_into().ok();
        self.advance(SessionState::KeyExchanged)?;

        let pin = self.pin.take().ok_or_else(|| self.missing())?;
        self.bind_pin(&secrets, &pin)?;
        self.advance(SessionState::WaitingConfirmation)?;

        info!(session = %self.id, "Keys exchanged, waiting for confirmation");
        Ok(Vec::new())
    }

    fn on_pin(&mut self, pin: Pin) -> PairingResult<Vec<SessionEvent>> {
        if self.role != Role::Central || self.state != SessionState::KeyExchanged {
            return Err(PairingError::PinNotExpected { state: self.state });
        }

        let secrets = self.secrets.take().ok_or_else(|| self.missing())?;
        self.bind_pin(&secrets, &pin)?;

        let confirmation = self
            .keys
            .as_ref()
            .map(SessionKeys::local_confirmation)
            .ok_or_else(|| self.missing())?;
        let frame = encode_frame(Tag::Confirmation, confirmation.as_bytes())?;
        self.advance(SessionState::WaitingConfirmation)?;

        info!(session = %self.id, "PIN applied, sent confirmation");
        Ok(vec![SessionEvent::Transmit(frame)])
    }

    fn bind_pin(&mut self, secrets: &DirectionalSecrets, pin: &Pin) -> PairingResult<()> {
        let keys = derive_session_keys(secrets, pin)?;
        self.expected_confirmation = Some(keys.expected_peer_confirmation());
        self.keys = Some(keys);
        Ok(())
    }

    fn on_confirmation(&mut self, payload: &[u8]) -> PairingResult<Vec<SessionEvent>> {
        let received = ConfirmationHash::from_slice(payload)?;
        let expected = self
            .expected_confirmation
            .take()
            .ok_or_else(|| self.missing())?;

        if !expected.matches(&received) {
            return Err(PairingError::ConfirmationMismatch);
        }

        let keys = self.keys.take().ok_or_else(|| self.missing())?;
        let mut events = Vec::with_capacity(2);

        // The central confirmed first; the peripheral answers with its own
        if self.role == Role::Peripheral {
            let frame = encode_frame(Tag::Confirmation, keys.local_confirmation().as_bytes())?;
            events.push(SessionEvent::Transmit(frame));
        }

        self.channel = Some(SecureChannel::new(&keys, self.role)?);
        self.advance(SessionState::Secure)?;
        events.push(SessionEvent::Established);

        info!(session = %self.id, role = %self.role, "Secure channel established");
        Ok(events)
    }

    fn on_unexpected(&mut self, state: SessionState, tag: Tag) -> PairingResult<Vec<SessionEvent>> {
        self.unexpected_frames += 1;
        let count = self.unexpected_frames;

        warn!(
            session = %self.id,
            state = ?state,
            tag = ?tag,
            count,
            "Dropping unexpected frame"
        );

        if count >= self.config.max_unexpected_frames {
            return Err(PairingError::TooManyUnexpectedFrames { count });
        }
        Err(PairingError::UnexpectedFrame { state, tag })
    }

    /// Secure: one application envelope from the peer
    ///
    /// Anything that does not authenticate is reported as an integrity
    /// failure and leaves the channel intact.
    fn on_envelope(&mut self, data: &[u8]) -> PairingResult<Vec<SessionEvent>> {
        let envelope = Envelope::decode(data).map_err(|err| {
            debug!(session = %self.id, error = %err, "Malformed application envelope");
            PairingError::IntegrityFailure
        })?;

        if !envelope.encrypted {
            warn!(session = %self.id, "Rejecting plaintext application frame");
            return Err(PairingError::IntegrityFailure);
        }

        if envelope.frame.tag != Tag::Application {
            return Err(PairingError::UnexpectedFrame {
                state: self.state,
                tag: envelope.frame.tag,
            });
        }

        let state = self.state;
        let channel = self
            .channel
            .as_mut()
            .ok_or(PairingError::MissingKeyMaterial { state })?;
        let plaintext = channel.open(&envelope.frame.payload)?;

        Ok(vec![SessionEvent::Message(Bytes::from(plaintext))])
    }

    fn on_seal(&mut self, plaintext: &[u8]) -> PairingResult<Bytes> {
        let state = self.state;
        if state != SessionState::Secure {
            return Err(PairingError::NotEstablished { state });
        }

        let max = MAX_FRAME_PAYLOAD - RECORD_OVERHEAD;
        if plaintext.len() > max {
            return Err(PairingError::MessageTooLarge {
                size: plaintext.len(),
                max,
            });
        }

        let channel = self
            .channel
            .as_mut()
            .ok_or(PairingError::MissingKeyMaterial { state })?;
        let record = channel.seal(plaintext)?;

        Ok(Envelope::encrypted(record).encode()?)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("unexpected_frames", &self.unexpected_frames)
            .finish_non_exhaustive()
    }
}
