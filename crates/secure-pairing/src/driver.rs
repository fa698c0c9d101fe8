//! Async driver running a session over a link
//!
//! The driver is the only place that knows about time and I/O: it writes what
//! the session transmits, feeds it link messages in arrival order, solicits
//! the PIN and turns elapsed phase deadlines into [`Session::expire`].

use std::collections::VecDeque;

use bytes::Bytes;
use crypto_session::Pin;
use pairing_protocol::SessionState;
use pairing_transport::{Link, LinkEvent};
use tokio::time::{Instant, sleep_until};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{MAX_MESSAGE_SIZE, PairingError, PairingResult, PinSource, Session, SessionEvent};

/// Callback receiving the PIN the peripheral should display
pub type PinDisplay = Box<dyn Fn(&Pin) + Send + Sync>;

/// Runs one pairing handshake to completion
pub struct PairingDriver<L: Link, P: PinSource> {
    session: Session,
    link: L,
    pin_source: P,
    on_pin: Option<PinDisplay>,
}

impl<L: Link, P: PinSource> PairingDriver<L, P> {
    pub fn new(session: Session, link: L, pin_source: P) -> Self {
        Self {
            session,
            link,
            pin_source,
            on_pin: None,
        }
    }

    /// Show the peripheral's PIN through `display`
    pub fn on_pin(mut self, display: impl Fn(&Pin) + Send + Sync + 'static) -> Self {
        self.on_pin = Some(Box::new(display));
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run the handshake until the channel is secure
    ///
    /// On failure the link is closed and the session's keys are gone; a new
    /// attempt needs a new session.
    pub async fn run(mut self) -> PairingResult<SecureLink<L>> {
        let span = info_span!(
            "pairing",
            session = %self.session.id(),
            role = %self.session.role()
        );

        let result = self.handshake().instrument(span).await;
        match result {
            Ok(()) => Ok(SecureLink {
                session: self.session,
                link: self.link,
            }),
            Err(err) => {
                self.link.close();
                Err(err)
            }
        }
    }

    async fn handshake(&mut self) -> PairingResult<()> {
        let mut backlog = VecDeque::new();

        let events = self.session.connect()?;
        self.dispatch(events, &mut backlog).await?;

        let mut phase = self.session.state();
        let mut deadline = self.phase_deadline();

        while self.session.state() != SessionState::Secure {
            if self.session.state() != phase {
                phase = self.session.state();
                deadline = self.phase_deadline();
            }

            let data = match backlog.pop_front() {
                Some(data) => data,
                None => tokio::select! {
                    event = self.link.recv() => match event {
                        LinkEvent::Data(data) => data,
                        LinkEvent::Disconnected => return Err(self.session.disconnect()),
                    },
                    _ = sleep_until(deadline) => {
                        self.session.expire()?;
                        continue;
                    }
                },
            };

            match self.session.receive(&data) {
                Ok(events) => self.dispatch(events, &mut backlog).await?,
                Err(err) if !err.is_fatal() => {
                    debug!(error = %err, "Dropped frame during handshake");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    fn phase_deadline(&self) -> Instant {
        let timeout = self
            .session
            .phase_timeout()
            .unwrap_or_else(|| self.session.config().handshake_timeout());
        Instant::now() + timeout
    }

    async fn dispatch(
        &mut self,
        events: Vec<SessionEvent>,
        backlog: &mut VecDeque<Bytes>,
    ) -> PairingResult<()> {
        let mut queue = VecDeque::from(events);

        while let Some(event) = queue.pop_front() {
            match event {
                SessionEvent::Transmit(data) => {
                    if let Err(err) = self.link.send(data).await {
                        return Err(self.session.abort(err.into()));
                    }
                }
                SessionEvent::PinRequired => {
                    let pin = self.await_pin(backlog).await?;
                    queue.extend(self.session.provide_pin(pin)?);
                }
                SessionEvent::DisplayPin(pin) => match &self.on_pin {
                    Some(display) => display(&pin),
                    None => info!("PIN ready for display"),
                },
                SessionEvent::Established => info!("Pairing complete"),
                SessionEvent::Message(data) => {
                    debug!(len = data.len(), "Ignoring message during handshake");
                }
            }
        }

        Ok(())
    }

    /// Wait for the operator while still watching the link
    ///
    /// Frames that arrive meanwhile are queued for after the PIN is applied,
    /// up to one more than the unexpected-frame limit. Leaving early for any
    /// reason drops the pending prompt.
    async fn await_pin(&mut self, backlog: &mut VecDeque<Bytes>) -> PairingResult<Pin> {
        let deadline = self.phase_deadline();
        info!("Waiting for PIN entry");

        let prompt = self.pin_source.request_pin();
        tokio::pin!(prompt);

        loop {
            tokio::select! {
                result = &mut prompt => {
                    return result.map_err(|err| self.session.abort_pin(err.to_string()));
                }
                event = self.link.recv() => match event {
                    LinkEvent::Data(data) => {
                        if backlog.len() > self.session.config().max_unexpected_frames as usize {
                            let count = u32::try_from(backlog.len() + 1).unwrap_or(u32::MAX);
                            warn!(count, "Peer flooding during PIN entry");
                            return Err(self
                                .session
                                .abort(PairingError::TooManyUnexpectedFrames { count }));
                        }
                        debug!(len = data.len(), "Buffering frame until PIN is entered");
                        backlog.push_back(data);
                    }
                    LinkEvent::Disconnected => {
                        warn!("Link dropped during PIN entry, cancelling prompt");
                        return Err(self.session.disconnect());
                    }
                },
                _ = sleep_until(deadline) => {
                    warn!("PIN entry timed out");
                    self.session.expire()?;
                }
            }
        }
    }
}

/// Established channel: application data in both directions
pub struct SecureLink<L: Link> {
    session: Session,
    link: L,
}

impl<L: Link> SecureLink<L> {
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Encrypt and write one message
    pub async fn send(&mut self, plaintext: &[u8]) -> PairingResult<()> {
        if plaintext.len() > MAX_MESSAGE_SIZE {
            return Err(PairingError::MessageTooLarge {
                size: plaintext.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let data = self.session.seal(plaintext)?;
        if let Err(err) = self.link.send(data).await {
            return Err(self.session.abort(err.into()));
        }
        Ok(())
    }

    /// Wait for the next authentic message
    ///
    /// Frames that fail authentication or replay checks are logged and
    /// dropped; the channel stays up.
    pub async fn recv(&mut self) -> PairingResult<Bytes> {
        loop {
            let data = match self.link.recv().await {
                LinkEvent::Data(data) => data,
                LinkEvent::Disconnected => return Err(self.session.disconnect()),
            };

            match self.session.receive(&data) {
                Ok(events) => {
                    for event in events {
                        if let SessionEvent::Message(message) = event {
                            return Ok(message);
                        }
                    }
                }
                Err(err) if !err.is_fatal() => {
                    warn!(session = %self.session.id(), error = %err, "Dropping application frame");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Close the link and discard the session keys
    pub fn close(&mut self) {
        self.link.close();
        if self.session.state() != SessionState::Failed {
            self.session.disconnect();
        }
    }
}
