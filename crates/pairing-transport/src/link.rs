//! Link trait abstraction

use bytes::Bytes;

use crate::TransportResult;

/// Something the link delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One complete message from the peer
    Data(Bytes),
    /// The peer or the stack closed the connection
    Disconnected,
}

/// Ordered, message-oriented link to a single peer
///
/// Implemented by platform BLE bindings: `send` writes the peer's write
/// characteristic, `recv` yields notifications in arrival order.
pub trait Link: Send {
    /// Write one message to the peer
    fn send(&mut self, data: Bytes) -> impl Future<Output = TransportResult<()>> + Send;

    /// Wait for the next message or the disconnect
    ///
    /// Must be cancel safe: dropping the future loses no message.
    fn recv(&mut self) -> impl Future<Output = LinkEvent> + Send;

    /// Close the connection; the peer observes [`LinkEvent::Disconnected`]
    fn close(&mut self);

    /// Whether the link is still usable for writes
    fn is_connected(&self) -> bool;
}
