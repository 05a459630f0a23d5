//! Control-channel transport
//!
//! The state machine never touches a socket. It writes text frames into a
//! [`Connection`] and reads [`TransportEvent`]s from a channel; [`websocket`] bridges
//! those channels to a real gateway and [`memory`] to an in-process peer.
//!
//! ```text
//!   ClientActor ── Connection::send ──► outbound queue ──► writer task ──► socket
//!        ▲                                                                   │
//!        └──────── TransportEvent ◄──────── reader task ◄────────────────────┘
//! ```

pub mod keepalive;
pub mod memory;
pub mod transaction;
pub mod websocket;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{GatewayError, GatewayResult};

pub use keepalive::Keepalive;
pub use transaction::{TransactionKind, TransactionTracker};

/// Frames queued for the writer side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A serialized request
    Text(String),
    /// Close the channel
    Close,
}

/// Events produced by the reader side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame
    Frame(String),
    /// The channel is gone; no further frames will arrive
    Closed {
        /// Close reason or error text
        reason: String,
    },
}

/// Sending half of an established control channel
#[derive(Debug, Clone)]
pub struct Connection {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    closed: Arc<AtomicBool>,
}

impl Connection {
    /// Wrap an outbound queue
    pub fn new(outbound: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            outbound,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue one text frame
    ///
    /// Fails with [`GatewayError::NotConnected`] once the channel is closed.
    pub fn send(&self, frame: String) -> GatewayResult<()> {
        if self.is_closed() {
            return Err(GatewayError::NotConnected);
        }
        self.outbound.send(OutboundFrame::Text(frame)).map_err(|_| {
            self.closed.store(true, Ordering::SeqCst);
            GatewayError::NotConnected
        })
    }

    /// Ask the writer to close the channel; idempotent
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.outbound.send(OutboundFrame::Close);
        }
    }

    /// Whether the channel was closed by either side
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.outbound.is_closed()
    }
}

/// Both halves of an established control channel
#[derive(Debug)]
pub struct TransportChannels {
    /// Sending half
    pub connection: Connection,
    /// Inbound frames and the final close
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_after_close_is_not_connected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = Connection::new(tx);

        connection.send("{}".into()).unwrap();
        connection.close();
        connection.close();

        assert_eq!(connection.send("{}".into()), Err(GatewayError::NotConnected));
        assert_eq!(rx.try_recv().unwrap(), OutboundFrame::Text("{}".into()));
        assert_eq!(rx.try_recv().unwrap(), OutboundFrame::Close);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_writer_is_not_connected() {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::new(tx);
        drop(rx);

        assert!(connection.is_closed());
        assert_eq!(connection.send("{}".into()), Err(GatewayError::NotConnected));
    }
}
