//! In-process link pair over tokio channels

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{Link, LinkEvent, MAX_WRITE_SIZE, TransportError, TransportResult};

/// Default queue depth for each direction
const DEFAULT_CAPACITY: usize = 64;

/// One end of an in-memory link
///
/// Used by tests and the CLI demo in place of a BLE connection. Messages are
/// delivered whole and in order, and writes above [`MAX_WRITE_SIZE`] are
/// rejected the same way a BLE stack would reject them.
pub struct MemoryLink {
    name: &'static str,
    tx: Option<mpsc::Sender<Bytes>>,
    rx: mpsc::Receiver<Bytes>,
}

impl MemoryLink {
    /// Create a connected pair with the default capacity
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a connected pair; `capacity` bounds each direction's queue
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);

        (
            Self {
                name: "central",
                tx: Some(a_tx),
                rx: a_rx,
            },
            Self {
                name: "peripheral",
                tx: Some(b_tx),
                rx: b_rx,
            },
        )
    }
}

impl Link for MemoryLink {
    async fn send(&mut self, data: Bytes) -> TransportResult<()> {
        if data.len() > MAX_WRITE_SIZE {
            return Err(TransportError::WriteTooLarge {
                size: data.len(),
                max: MAX_WRITE_SIZE,
            });
        }

        let tx = self.tx.as_ref().ok_or(TransportError::NotConnected)?;

        trace!(link = self.name, len = data.len(), "Writing message");

        tx.send(data)
            .await
            .map_err(|_| TransportError::ConnectionClosed("peer dropped the link".to_string()))
    }

    async fn recv(&mut self) -> LinkEvent {
        match self.rx.recv().await {
            Some(data) => LinkEvent::Data(data),
            None => {
                debug!(link = self.name, "Link disconnected");
                LinkEvent::Disconnected
            }
        }
    }

    fn close(&mut self) {
        if self.tx.take().is_some() {
            debug!(link = self.name, "Closing link");
        }
        self.rx.close();
    }

    fn is_connected(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (mut a, mut b) = MemoryLink::pair();

        for i in 0..10u8 {
            a.send(Bytes::from(vec![i])).await.unwrap();
        }

        for i in 0..10u8 {
            assert_eq!(b.recv().await, LinkEvent::Data(Bytes::from(vec![i])));
        }
    }

    #[tokio::test]
    async fn test_close_is_observed_by_peer() {
        let (mut a, mut b) = MemoryLink::pair();

        a.send(Bytes::from_static(b"last")).await.unwrap();
        a.close();

        assert!(!a.is_connected());
        assert_eq!(b.recv().await, LinkEvent::Data(Bytes::from_static(b"last")));
        assert_eq!(b.recv().await, LinkEvent::Disconnected);
        assert!(b.send(Bytes::from_static(b"late")).await.is_err());
    }

    #[tokio::test]
    async fn test_drop_is_observed_by_peer() {
        let (a, mut b) = MemoryLink::pair();
        drop(a);
        assert_eq!(b.recv().await, LinkEvent::Disconnected);
        assert!(!b.is_connected());
    }

    #[tokio::test]
    async fn test_oversized_write_rejected() {
        let (mut a, _b) = MemoryLink::pair();
        let result = a.send(Bytes::from(vec![0u8; MAX_WRITE_SIZE + 1])).await;
        assert!(matches!(
            result,
            Err(TransportError::WriteTooLarge { size: 513, max: 512 })
        ));
    }
}
