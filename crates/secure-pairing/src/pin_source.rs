//! Where the central's PIN comes from

use crypto_session::{CryptoError, Pin};
use thiserror::Error;
use tokio::sync::oneshot;

/// Why a PIN request did not produce a PIN
#[derive(Debug, Error)]
pub enum PinError {
    #[error("PIN entry cancelled")]
    Cancelled,

    #[error("Invalid PIN: {0}")]
    Invalid(#[from] CryptoError),

    #[error("PIN prompt failed: {0}")]
    Prompt(String),
}

/// Asks the operator for the PIN shown on the peripheral
///
/// The driver drops the returned future when the link disconnects or the
/// prompt times out, so implementations must tolerate cancellation.
pub trait PinSource: Send {
    fn request_pin(&mut self) -> impl Future<Output = Result<Pin, PinError>> + Send;
}

/// Answers the first request with a preset PIN
pub struct FixedPin(Option<Pin>);

impl FixedPin {
    pub fn new(pin: Pin) -> Self {
        Self(Some(pin))
    }
}

impl PinSource for FixedPin {
    async fn request_pin(&mut self) -> Result<Pin, PinError> {
        self.0.take().ok_or(PinError::Cancelled)
    }
}

/// For the peripheral, which displays its PIN and never asks for one
pub struct NoPin;

impl PinSource for NoPin {
    async fn request_pin(&mut self) -> Result<Pin, PinError> {
        Err(PinError::Cancelled)
    }
}

/// PIN delivered from elsewhere in the program, e.g. a UI task
pub struct ChannelPinSource {
    rx: Option<oneshot::Receiver<Pin>>,
}

/// Sending half of a [`ChannelPinSource`]
pub struct PinSender(oneshot::Sender<Pin>);

impl PinSender {
    /// Deliver the PIN; returns it back if the prompt is gone
    pub fn send(self, pin: Pin) -> Result<(), Pin> {
        self.0.send(pin)
    }

    /// Whether the driver stopped waiting for the PIN
    pub fn is_cancelled(&self) -> bool {
        self.0.is_closed()
    }
}

impl ChannelPinSource {
    pub fn new() -> (PinSender, Self) {
        let (tx, rx) = oneshot::channel();
        (PinSender(tx), Self { rx: Some(rx) })
    }
}

impl PinSource for ChannelPinSource {
    async fn request_pin(&mut self) -> Result<Pin, PinError> {
        let rx = self.rx.as_mut().ok_or(PinError::Cancelled)?;
        let result = rx.await.map_err(|_| PinError::Cancelled);
        self.rx = None;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_pin_answers_once() {
        let mut source = FixedPin::new(Pin::new("1234").unwrap());
        assert_eq!(source.request_pin().await.unwrap().as_str(), "1234");
        assert!(matches!(
            source.request_pin().await,
            Err(PinError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_channel_pin_delivered() {
        let (sender, mut source) = ChannelPinSource::new();
        sender.send(Pin::new("987654").unwrap()).unwrap();
        assert_eq!(source.request_pin().await.unwrap().as_str(), "987654");
    }

    #[tokio::test]
    async fn test_dropped_sender_cancels() {
        let (sender, mut source) = ChannelPinSource::new();
        drop(sender);
        assert!(matches!(
            source.request_pin().await,
            Err(PinError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_sender_sees_dropped_prompt() {
        let (sender, source) = ChannelPinSource::new();
        drop(source);
        assert!(sender.is_cancelled());
    }
}
